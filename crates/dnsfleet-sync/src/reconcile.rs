//! Desired configuration of one node, computed from the store.

use dnsfleet_core::{Entity, EntityKind, EntityStore, NodeId};
use tracing::warn;

use crate::error::{SyncError, SyncResult};

/// Every enabled entity whose target set contains `node_id`, grouped in
/// full-merge order.
///
/// Entities with malformed selectors are skipped with a warning so one bad
/// row cannot block a resync of the whole node.
///
/// # Errors
///
/// Returns [`SyncError::Store`] when an entity listing fails.
pub async fn desired_for_node<S>(store: &S, node_id: NodeId) -> SyncResult<Vec<Entity>>
where
    S: EntityStore + ?Sized,
{
    let mut desired = Vec::new();
    for kind in EntityKind::ALL {
        let entities = store
            .list_enabled(kind)
            .await
            .map_err(SyncError::store("list_enabled"))?;
        for entity in entities {
            match entity.selector().parse() {
                Ok(target) if target.contains(node_id) => desired.push(entity),
                Ok(_) => {}
                Err(err) => warn!(
                    node_id,
                    entity = %entity.describe(),
                    error = %err,
                    "skipping entity with malformed node selector"
                ),
            }
        }
    }
    Ok(desired)
}

/// Whether `entity` should currently be present on `node_id`.
pub(crate) fn targets(entity: &Entity, node_id: NodeId) -> bool {
    entity.enabled()
        && entity
            .selector()
            .parse()
            .is_ok_and(|target| target.contains(node_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnsfleet_core::{NodeSelector, SelectorTarget};
    use dnsfleet_test_support::MemoryStore;
    use dnsfleet_test_support::fixtures::{address, address_on, domain_rule, server};

    #[tokio::test]
    async fn desired_set_follows_selectors_and_order() -> anyhow::Result<()> {
        let store = MemoryStore::with_nodes(2);
        store.save_entity(domain_rule("r.com", "cn", 1)).await?;
        store.save_entity(address_on("only-two.com", "2.2.2.2", &[2])).await?;
        store.save_entity(address("all.com", "1.1.1.1")).await?;
        store.save_entity(server("8.8.8.8")).await?;

        let keys: Vec<String> = desired_for_node(&store, 1)
            .await?
            .iter()
            .map(Entity::natural_key)
            .collect();
        assert_eq!(keys, vec!["8.8.8.8", "all.com", "r.com"]);

        let on_two = desired_for_node(&store, 2).await?;
        assert_eq!(on_two.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_entities_are_not_desired() -> anyhow::Result<()> {
        let store = MemoryStore::with_nodes(1);
        let Entity::Address(mut mapping) = address("off.com", "1.1.1.1") else {
            anyhow::bail!("fixture kind");
        };
        mapping.enabled = false;
        store.save_entity(Entity::Address(mapping)).await?;
        assert!(desired_for_node(&store, 1).await?.is_empty());
        Ok(())
    }

    #[test]
    fn targets_requires_enabled_and_membership() {
        let entity = address_on("a.com", "1.1.1.1", &[1]);
        assert!(targets(&entity, 1));
        assert!(!targets(&entity, 2));

        let Entity::Address(mut mapping) = address("b.com", "1.1.1.1") else {
            unreachable!("fixture kind");
        };
        mapping.nodes = NodeSelector::from("not json");
        assert!(!targets(&Entity::Address(mapping), 1));
        assert_eq!(
            NodeSelector::all().parse().ok(),
            Some(SelectorTarget::All)
        );
    }
}
