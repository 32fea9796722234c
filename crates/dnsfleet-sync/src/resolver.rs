//! Turns stored node selectors into concrete target sets.

use dnsfleet_core::{Node, NodeSelector, NodeStore, SelectorTarget};

use crate::error::{SyncError, SyncResult};

/// Resolve `selector` against the nodes that exist right now.
///
/// An empty selector (or `[]`) means every node, including nodes registered
/// after the entity was stored. Ids that no longer exist are dropped.
///
/// # Errors
///
/// Returns [`SyncError::Selector`] for malformed selectors and
/// [`SyncError::Store`] when the node lookup fails.
pub async fn resolve_targets<S>(store: &S, selector: &NodeSelector) -> SyncResult<Vec<Node>>
where
    S: NodeStore + ?Sized,
{
    match selector.parse()? {
        SelectorTarget::All => store
            .list_nodes()
            .await
            .map_err(SyncError::store("list_nodes")),
        SelectorTarget::Nodes(ids) => store
            .nodes_by_ids(&ids)
            .await
            .map_err(SyncError::store("nodes_by_ids")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnsfleet_test_support::MemoryStore;
    use dnsfleet_test_support::fixtures::new_node;

    #[tokio::test]
    async fn empty_selectors_track_current_fleet() -> anyhow::Result<()> {
        let store = MemoryStore::with_nodes(2);
        for raw in ["", "[]", "  "] {
            let nodes = resolve_targets(&store, &NodeSelector::from(raw)).await?;
            assert_eq!(nodes.len(), 2, "selector {raw:?}");
        }
        store.create_node(new_node("late")).await?;
        let nodes = resolve_targets(&store, &NodeSelector::all()).await?;
        assert_eq!(nodes.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn explicit_ids_skip_missing_nodes() -> anyhow::Result<()> {
        let store = MemoryStore::with_nodes(3);
        let nodes = resolve_targets(&store, &NodeSelector::from("[3, 1, 42]")).await?;
        let ids: Vec<_> = nodes.iter().map(|node| node.id).collect();
        assert_eq!(ids, vec![1, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_selector_fails_fast() {
        let store = MemoryStore::with_nodes(1);
        let result = resolve_targets(&store, &NodeSelector::from("1,2")).await;
        assert!(matches!(result, Err(SyncError::Selector { .. })));
    }
}
