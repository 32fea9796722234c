use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dnsfleet_config::SyncSettings;
use dnsfleet_core::{
    Entity, EntityStore, NodeSelector, NodeStore, NotificationKind, SyncLogStore, SyncStatus,
};
use dnsfleet_events::EventBus;
use dnsfleet_sync::{
    CancelFlag, EntityChange, NodeResult, SyncContext, SyncEngine, SyncError, SyncReport,
    SyncRequest, cancellation,
};
use dnsfleet_telemetry::Metrics;
use dnsfleet_test_support::fixtures::{
    CONFIG_PATH, address, address_on, domain_rule, domain_set, new_node, server,
};
use dnsfleet_test_support::{FakeRemote, MemoryStore, RecordingNotifier, RemoteFault};

const SET_FILE: &str = "/etc/smartdns/gfwlist.conf";

struct Fleet {
    store: Arc<MemoryStore>,
    remote: FakeRemote,
    notifier: Arc<RecordingNotifier>,
    metrics: Metrics,
    engine: SyncEngine,
}

impl Fleet {
    fn new(nodes: i64) -> Result<Self> {
        Self::with_settings(nodes, SyncSettings::default())
    }

    fn with_settings(nodes: i64, settings: SyncSettings) -> Result<Self> {
        let store = Arc::new(MemoryStore::with_nodes(nodes));
        let remote = FakeRemote::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let metrics = Metrics::new()?;
        let ctx = SyncContext::new(
            store.clone(),
            Arc::new(remote.clone()),
            notifier.clone(),
            EventBus::new(),
            metrics.clone(),
            settings,
        );
        Ok(Self {
            store,
            remote,
            notifier,
            metrics,
            engine: SyncEngine::new(ctx),
        })
    }

    async fn apply(&self, entity: Entity) -> Result<(Entity, SyncReport)> {
        let saved = self.store.save_entity(entity).await?;
        let report = self.sync(EntityChange::upsert(saved.clone())).await?;
        Ok((saved, report))
    }

    async fn sync(&self, change: EntityChange) -> Result<SyncReport> {
        Ok(self
            .engine
            .execute(&SyncRequest::Entity(change), &CancelFlag::never())
            .await?)
    }

    async fn retry(&self, log_id: i64) -> Result<SyncReport, SyncError> {
        self.engine
            .execute(&SyncRequest::Retry { log_id }, &CancelFlag::never())
            .await
    }

    fn config(&self, node_id: i64) -> String {
        self.remote.file(node_id, CONFIG_PATH).unwrap_or_default()
    }
}

#[tokio::test]
async fn unreachable_node_does_not_affect_its_peers() -> Result<()> {
    let fleet = Fleet::new(3)?;
    fleet.remote.inject(2, RemoteFault::Connect);

    let (_, report) = fleet.apply(address("a.com", "1.1.1.1")).await?;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!((report.succeeded(), report.failed()), (2, 1));
    let failed = report.outcome(2).context("node 2 outcome")?;
    assert!(failed.error().is_some_and(|e| e.contains("connection error")));
    for node_id in [1, 3] {
        assert!(fleet.config(node_id).contains("address /a.com/1.1.1.1"));
    }
    assert!(fleet.remote.writes(2).is_empty());

    let logs = fleet.store.all_logs();
    assert_eq!(logs.len(), 3);
    let node_two = logs.iter().find(|log| log.node_id == 2).context("log")?;
    assert_eq!(node_two.status, SyncStatus::Failed);
    assert!(node_two.error.as_deref().is_some_and(|e| e.starts_with("connect:")));
    assert_eq!(fleet.notifier.kinds_for(2), vec![NotificationKind::Failure]);
    assert_eq!(fleet.notifier.kinds_for(1), vec![NotificationKind::Success]);
    assert_eq!(fleet.metrics.sync_attempts("address", "failed"), 1);
    assert_eq!(fleet.remote.leaked_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_backup_still_writes() -> Result<()> {
    let fleet = Fleet::new(1)?;
    fleet.remote.put_file(1, CONFIG_PATH, "bind :53\n");
    fleet.remote.inject(1, RemoteFault::Backup);

    let (_, report) = fleet.apply(address("a.com", "1.1.1.1")).await?;

    let outcome = report.outcome(1).context("outcome")?;
    let NodeResult::Succeeded { warnings } = &outcome.result else {
        bail!("expected success, got {:?}", outcome.result);
    };
    assert!(warnings[0].starts_with("backup skipped:"));
    assert!(fleet.config(1).contains("address /a.com/1.1.1.1"));
    assert_eq!(
        fleet.notifier.kinds_for(1),
        vec![NotificationKind::Warning, NotificationKind::Success]
    );
    assert_eq!(fleet.metrics.snapshot().backup_failures_total, 1);
    Ok(())
}

#[tokio::test]
async fn upsert_replaces_the_existing_directive() -> Result<()> {
    let fleet = Fleet::new(1)?;
    fleet
        .remote
        .put_file(1, CONFIG_PATH, "cache-size 4096\naddress /a.com/2.2.2.2\nlog-level info\n");

    fleet.apply(address("a.com", "1.1.1.1")).await?;

    let config = fleet.config(1);
    let lines: Vec<&str> = config.lines().filter(|l| l.contains("/a.com/")).collect();
    assert_eq!(lines, vec!["address /a.com/1.1.1.1"]);
    assert!(config.contains("cache-size 4096"));
    assert!(config.contains("log-level info"));
    assert_eq!(fleet.remote.backups(1).len(), 1);
    Ok(())
}

#[tokio::test]
async fn empty_selectors_include_nodes_added_later() -> Result<()> {
    let fleet = Fleet::new(2)?;
    let late = fleet.store.create_node(new_node("late")).await?;

    let Entity::Address(mut mapping) = address("a.com", "1.1.1.1") else {
        bail!("fixture kind");
    };
    mapping.nodes = NodeSelector::from("[]");
    let (_, report) = fleet.apply(Entity::Address(mapping)).await?;

    assert_eq!(report.succeeded(), 3);
    assert!(fleet.config(late.id).contains("address /a.com/1.1.1.1"));
    Ok(())
}

#[tokio::test]
async fn explicit_selectors_only_touch_listed_nodes() -> Result<()> {
    let fleet = Fleet::new(3)?;
    let (_, report) = fleet.apply(address_on("a.com", "1.1.1.1", &[1, 3, 99])).await?;

    let ids: Vec<i64> = report.outcomes.iter().map(|o| o.node_id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert!(fleet.remote.writes(2).is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_selector_fails_before_any_node() -> Result<()> {
    let fleet = Fleet::new(2)?;
    let Entity::Address(mut mapping) = address("a.com", "1.1.1.1") else {
        bail!("fixture kind");
    };
    mapping.nodes = NodeSelector::from("1, 2");
    let result = fleet
        .engine
        .execute(
            &SyncRequest::Entity(EntityChange::upsert(Entity::Address(mapping))),
            &CancelFlag::never(),
        )
        .await;

    assert!(matches!(result, Err(SyncError::Selector { .. })));
    assert!(fleet.store.all_logs().is_empty());
    assert_eq!(fleet.remote.sessions_opened(), 0);
    Ok(())
}

#[tokio::test]
async fn domain_set_writes_list_file_then_declaration() -> Result<()> {
    let fleet = Fleet::new(2)?;
    fleet
        .apply(domain_set("gfwlist", &["google.com", "youtube.com"]))
        .await?;

    for node_id in [1, 2] {
        let list = fleet.remote.file(node_id, SET_FILE).context("set file")?;
        assert_eq!(list, "google.com\nyoutube.com\n");
        assert!(
            fleet
                .config(node_id)
                .contains("domain-set -name gfwlist -file /etc/smartdns/gfwlist.conf")
        );
        let writes: Vec<String> = fleet
            .remote
            .writes(node_id)
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        assert_eq!(writes, vec![SET_FILE, CONFIG_PATH]);
    }
    Ok(())
}

#[tokio::test]
async fn removing_a_domain_set_deletes_both_files() -> Result<()> {
    let fleet = Fleet::new(1)?;
    let (saved, _) = fleet.apply(domain_set("gfwlist", &["google.com"])).await?;

    let report = fleet.sync(EntityChange::remove(saved)).await?;

    assert_eq!(report.succeeded(), 1);
    assert!(fleet.remote.file(1, SET_FILE).is_none());
    assert!(!fleet.config(1).contains("domain-set"));
    Ok(())
}

#[tokio::test]
async fn retargeting_removes_from_dropped_nodes() -> Result<()> {
    let fleet = Fleet::new(3)?;
    let (saved, _) = fleet.apply(address_on("a.com", "1.1.1.1", &[1, 2])).await?;

    let Entity::Address(mut mapping) = saved.clone() else {
        bail!("stored kind");
    };
    mapping.nodes = NodeSelector::nodes([2, 3]);
    let updated = fleet.store.save_entity(Entity::Address(mapping)).await?;
    let report = fleet
        .sync(EntityChange::upsert(updated).retargeted_from(saved.selector().clone()))
        .await?;

    assert_eq!(report.outcomes.len(), 3);
    assert!(!fleet.config(1).contains("a.com"));
    assert!(fleet.config(2).contains("address /a.com/1.1.1.1"));
    assert!(fleet.config(3).contains("address /a.com/1.1.1.1"));
    Ok(())
}

#[tokio::test]
async fn disabling_an_entity_removes_it() -> Result<()> {
    let fleet = Fleet::new(1)?;
    let (saved, _) = fleet.apply(address("a.com", "1.1.1.1")).await?;
    let Entity::Address(mut mapping) = saved else {
        bail!("stored kind");
    };
    mapping.enabled = false;
    let disabled = fleet.store.save_entity(Entity::Address(mapping)).await?;

    fleet.sync(EntityChange::upsert(disabled)).await?;

    assert!(!fleet.config(1).contains("a.com"));
    let logs = fleet.store.all_logs();
    assert_eq!(logs.last().map(|l| l.action.as_str()), Some("delete"));
    Ok(())
}

#[tokio::test]
async fn retry_replays_the_current_entity_state() -> Result<()> {
    let fleet = Fleet::new(2)?;
    fleet.remote.inject(2, RemoteFault::Connect);
    let (saved, report) = fleet.apply(address("a.com", "1.1.1.1")).await?;
    let log_id = report
        .outcome(2)
        .and_then(|o| o.log_id)
        .context("failed log")?;

    let Entity::Address(mut mapping) = saved else {
        bail!("stored kind");
    };
    mapping.set_ip("3.3.3.3");
    fleet.store.save_entity(Entity::Address(mapping)).await?;
    fleet.remote.heal(2);

    let retried = fleet.retry(log_id).await?;

    assert_eq!(retried.outcomes.len(), 1);
    assert_eq!(retried.outcomes[0].log_id, Some(log_id));
    assert!(retried.outcomes[0].succeeded());
    assert!(fleet.config(2).contains("address /a.com/3.3.3.3"));
    let log = fleet.store.find_log(log_id).await?.context("log")?;
    assert_eq!((log.status, log.error), (SyncStatus::Success, None));
    assert_eq!(fleet.store.all_logs().len(), 2);
    Ok(())
}

#[tokio::test]
async fn retry_never_resurrects_a_deleted_entity() -> Result<()> {
    let fleet = Fleet::new(1)?;
    fleet
        .remote
        .put_file(1, CONFIG_PATH, "address /a.com/1.1.1.1\n");
    fleet.remote.inject(1, RemoteFault::Write);
    let (saved, report) = fleet.apply(address("a.com", "1.1.1.1")).await?;
    let log_id = report
        .outcome(1)
        .and_then(|o| o.log_id)
        .context("failed log")?;
    assert_eq!(report.failed(), 1);

    let id = saved.id().context("id")?;
    fleet.store.delete_entity(saved.kind(), id).await?;
    fleet.remote.heal(1);

    let retried = fleet.retry(log_id).await?;

    assert!(retried.outcomes[0].succeeded());
    assert!(!fleet.config(1).contains("a.com"));
    Ok(())
}

#[tokio::test]
async fn retry_requires_an_existing_failed_entry() -> Result<()> {
    let fleet = Fleet::new(1)?;
    let (_, report) = fleet.apply(address("a.com", "1.1.1.1")).await?;
    let log_id = report.outcomes[0].log_id.context("log")?;

    assert!(matches!(
        fleet.retry(log_id).await,
        Err(SyncError::NotRetryable {
            status: SyncStatus::Success,
            ..
        })
    ));
    assert!(matches!(
        fleet.retry(404).await,
        Err(SyncError::LogNotFound { log_id: 404 })
    ));
    Ok(())
}

#[tokio::test]
async fn retry_for_a_removed_node_fails_the_entry() -> Result<()> {
    let fleet = Fleet::new(2)?;
    fleet.remote.inject(2, RemoteFault::Connect);
    let (_, report) = fleet.apply(address("a.com", "1.1.1.1")).await?;
    let log_id = report.outcome(2).and_then(|o| o.log_id).context("log")?;
    fleet.store.delete_node(2).await?;

    let retried = fleet.retry(log_id).await?;

    assert_eq!(
        retried.outcomes[0].error(),
        Some("node 2 no longer exists")
    );
    let log = fleet.store.find_log(log_id).await?.context("log")?;
    assert_eq!(log.status, SyncStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn retry_that_cannot_be_planned_leaves_the_entry_retryable() -> Result<()> {
    let fleet = Fleet::new(2)?;
    fleet.remote.inject(2, RemoteFault::Connect);
    let (_, report) = fleet.apply(address("a.com", "1.1.1.1")).await?;
    let log_id = report.outcome(2).and_then(|o| o.log_id).context("log")?;
    fleet.remote.heal(2);

    fleet.store.fail_operation("find_by_key");
    assert!(matches!(
        fleet.retry(log_id).await,
        Err(SyncError::Store {
            operation: "find_by_key",
            ..
        })
    ));
    let log = fleet.store.find_log(log_id).await?.context("log")?;
    assert_eq!(log.status, SyncStatus::Failed);

    fleet.store.heal();
    let retried = fleet.retry(log_id).await?;
    assert!(retried.outcomes[0].succeeded());
    let log = fleet.store.find_log(log_id).await?.context("log")?;
    assert_eq!(log.status, SyncStatus::Success);
    Ok(())
}

#[tokio::test]
async fn resync_rebuilds_from_every_targeting_entity() -> Result<()> {
    let fleet = Fleet::new(2)?;
    fleet.store.save_entity(server("8.8.8.8")).await?;
    fleet.store.save_entity(address("a.com", "1.1.1.1")).await?;
    fleet.store.save_entity(address_on("b.com", "2.2.2.2", &[2])).await?;
    fleet
        .store
        .save_entity(domain_set("gfwlist", &["google.com"]))
        .await?;
    fleet
        .store
        .save_entity(domain_rule("domain-set:gfwlist", "overseas", 1))
        .await?;
    fleet.remote.put_file(1, CONFIG_PATH, "bind :53\n");

    let report = fleet
        .engine
        .execute(&SyncRequest::Resync { node_id: 1 }, &CancelFlag::never())
        .await?;

    assert_eq!(report.succeeded(), 1);
    let config = fleet.config(1);
    for expected in [
        "bind :53",
        "server 8.8.8.8",
        "address /a.com/1.1.1.1",
        "domain-set -name gfwlist -file /etc/smartdns/gfwlist.conf",
        "domain-rules /domain-set:gfwlist/ -nameserver overseas",
    ] {
        assert!(config.contains(expected), "missing {expected:?} in:\n{config}");
    }
    assert!(!config.contains("b.com"));
    assert!(fleet.remote.file(1, SET_FILE).is_some());
    assert_eq!(
        fleet.store.all_logs()[0].log_type.as_str(),
        "full_sync"
    );

    let missing = fleet
        .engine
        .execute(&SyncRequest::Resync { node_id: 9 }, &CancelFlag::never())
        .await;
    assert!(matches!(missing, Err(SyncError::NodeNotFound { node_id: 9 })));
    Ok(())
}

#[tokio::test]
async fn concurrent_sessions_stay_within_the_limit() -> Result<()> {
    let settings = SyncSettings {
        max_concurrent_sessions: 2,
        ..SyncSettings::default()
    };
    let fleet = Fleet::with_settings(6, settings)?;
    for node_id in 1..=6 {
        fleet
            .remote
            .set_latency(node_id, Duration::from_millis(30));
    }

    let (_, report) = fleet.apply(address("a.com", "1.1.1.1")).await?;

    assert_eq!(report.succeeded(), 6);
    assert!(fleet.remote.peak_sessions() <= 2);
    assert_eq!(fleet.remote.sessions_opened(), 6);
    assert_eq!(fleet.remote.open_sessions(), 0);
    assert_eq!(fleet.remote.leaked_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn hanging_connect_times_out() -> Result<()> {
    let settings = SyncSettings {
        connect_timeout_secs: 1,
        ..SyncSettings::default()
    };
    let fleet = Fleet::with_settings(2, settings)?;
    fleet.remote.inject(1, RemoteFault::ConnectHang);

    let (_, report) = fleet.apply(address("a.com", "1.1.1.1")).await?;

    let error = report.outcome(1).and_then(|o| o.error()).context("error")?;
    assert_eq!(error, "connect: connect timed out after 1s");
    assert!(report.outcome(2).is_some_and(|o| o.succeeded()));
    Ok(())
}

#[tokio::test]
async fn cancellation_skips_nodes_that_have_not_started() -> Result<()> {
    let settings = SyncSettings {
        max_concurrent_sessions: 1,
        ..SyncSettings::default()
    };
    let fleet = Arc::new(Fleet::with_settings(3, settings)?);
    for node_id in 1..=3 {
        fleet
            .remote
            .set_latency(node_id, Duration::from_millis(300));
    }
    let saved = fleet.store.save_entity(address("a.com", "1.1.1.1")).await?;
    let (handle, flag) = cancellation();

    let running = {
        let fleet = Arc::clone(&fleet);
        tokio::spawn(async move {
            fleet
                .engine
                .execute(&SyncRequest::Entity(EntityChange::upsert(saved)), &flag)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();
    let report = running.await??;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.cancelled(), 2);
    assert_eq!(fleet.store.all_logs().len(), 1);
    Ok(())
}

#[tokio::test]
async fn changes_to_one_node_never_interleave() -> Result<()> {
    let fleet = Fleet::new(1)?;
    fleet.remote.set_latency(1, Duration::from_millis(50));
    let first = fleet.store.save_entity(address("a.com", "1.1.1.1")).await?;
    let second = fleet.store.save_entity(address("b.com", "2.2.2.2")).await?;

    let (left, right) = tokio::join!(
        fleet.sync(EntityChange::upsert(first)),
        fleet.sync(EntityChange::upsert(second)),
    );
    assert_eq!(left?.succeeded() + right?.succeeded(), 2);

    let config = fleet.config(1);
    assert!(config.contains("address /a.com/1.1.1.1"));
    assert!(config.contains("address /b.com/2.2.2.2"));
    Ok(())
}
