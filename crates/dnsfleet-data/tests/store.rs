use std::future::Future;

use anyhow::{Context, Result};
use dnsfleet_core::{
    Entity, EntityKind, EntityStore, NewSyncLog, NodeStatus, NodeStore, StoreError, SyncAction,
    SyncLogFilter, SyncLogStore, SyncLogType, SyncStatus,
};
use dnsfleet_data::{INTERRUPTED, PgStore};
use dnsfleet_test_support::fixtures::{address, domain_rule, domain_set, new_node};
use dnsfleet_test_support::postgres::start_postgres;

async fn with_store<F, Fut>(test: F) -> Result<()>
where
    F: FnOnce(PgStore) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let database = match start_postgres() {
        Ok(database) => database,
        Err(err) => {
            eprintln!("skipping postgres store tests: {err:#}");
            return Ok(());
        }
    };
    let store = PgStore::connect(database.url(), 4)
        .await
        .context("failed to initialise store")?;
    let result = test(store.clone()).await;
    store.pool().close().await;
    drop(database);
    result
}

fn pending(node_id: i64) -> NewSyncLog {
    NewSyncLog {
        node_id,
        action: SyncAction::Add,
        log_type: SyncLogType::Address,
        content: "address /a.com/1.1.1.1".into(),
        target_key: Some("a.com".into()),
    }
}

#[tokio::test]
async fn nodes_round_trip_and_update_status() -> Result<()> {
    with_store(|store| async move {
        let created = store.create_node(new_node("edge-1")).await?;
        assert_eq!(created.status, NodeStatus::Unknown);
        store
            .update_node_status(created.id, NodeStatus::Online)
            .await?;
        let found = store.find_node(created.id).await?.context("node missing")?;
        assert_eq!(found.status, NodeStatus::Online);
        assert_eq!(found.port, 22);

        let second = store.create_node(new_node("edge-2")).await?;
        let subset = store.nodes_by_ids(&[second.id, 999]).await?;
        assert_eq!(subset.len(), 1);
        store.delete_node(second.id).await?;
        assert!(matches!(
            store.delete_node(second.id).await,
            Err(StoreError::NotFound { record: "node", .. })
        ));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn entities_enforce_keys_and_ordering() -> Result<()> {
    with_store(|store| async move {
        let saved = store.save_entity(address("a.com", "1.1.1.1")).await?;
        assert!(saved.id().is_some());
        assert!(matches!(
            store.save_entity(address("A.COM", "2.2.2.2")).await,
            Err(StoreError::Conflict { .. })
        ));

        let found = store
            .find_by_key(EntityKind::Address, "a.com")
            .await?
            .context("address missing")?;
        assert_eq!(found, saved);

        store.save_entity(domain_rule("b.com", "cn", 9)).await?;
        store.save_entity(domain_rule("c.com", "cn", 1)).await?;
        let keys: Vec<String> = store
            .list_enabled(EntityKind::DomainRule)
            .await?
            .iter()
            .map(Entity::natural_key)
            .collect();
        assert_eq!(keys, vec!["c.com", "b.com"]);

        let Entity::DomainSet(mut set) = store.save_entity(domain_set("gfw", &["x.com"])).await?
        else {
            anyhow::bail!("unexpected kind");
        };
        set.name = "other".into();
        assert!(matches!(
            store.save_entity(Entity::DomainSet(set)).await,
            Err(StoreError::ImmutableField { field: "name", .. })
        ));

        let id = saved.id().context("id missing")?;
        let removed = store.delete_entity(EntityKind::Address, id).await?;
        assert_eq!(removed.natural_key(), "a.com");
        assert!(store.find_entity(EntityKind::Address, id).await?.is_none());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn sync_log_lifecycle_is_guarded() -> Result<()> {
    with_store(|store| async move {
        let log = store.create_log(pending(1)).await?;
        assert_eq!(log.status, SyncStatus::Pending);
        assert!(matches!(
            store.reopen_log(log.id).await,
            Err(StoreError::InvalidTransition { .. })
        ));
        store
            .finish_log(log.id, SyncStatus::Failed, Some("refused".into()))
            .await?;
        assert!(matches!(
            store.finish_log(log.id, SyncStatus::Success, None).await,
            Err(StoreError::InvalidTransition { .. })
        ));
        let reopened = store.reopen_log(log.id).await?;
        assert_eq!(reopened.error, None);

        let other = store.create_log(pending(2)).await?;
        assert_eq!(store.recover_interrupted().await?, 2);
        let recovered = store.find_log(other.id).await?.context("log missing")?;
        assert_eq!(recovered.error.as_deref(), Some(INTERRUPTED));

        let stats = store.log_stats().await?;
        assert_eq!((stats.failed, stats.total), (2, 2));

        let filtered = store
            .list_logs(&SyncLogFilter {
                node_id: Some(2),
                ..SyncLogFilter::default()
            })
            .await?;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, other.id);
        Ok(())
    })
    .await
}
