//! Per-node serialisation of read-merge-write sequences.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use dnsfleet_core::NodeId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per node, created on first use.
#[derive(Clone, Default)]
pub struct NodeLocks {
    locks: Arc<Mutex<HashMap<NodeId, Arc<AsyncMutex<()>>>>>,
}

impl NodeLocks {
    /// Empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other sequence holds `node_id`.
    pub async fn acquire(&self, node_id: NodeId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(node_id).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_node_is_serialised() {
        let locks = NodeLocks::new();
        let guard = locks.acquire(1).await;
        let contender = tokio::time::timeout(Duration::from_millis(50), locks.acquire(1)).await;
        assert!(contender.is_err());
        drop(guard);
        let reacquired = tokio::time::timeout(Duration::from_millis(50), locks.acquire(1)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn different_nodes_do_not_block() {
        let locks = NodeLocks::new();
        let _first = locks.acquire(1).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(2)).await;
        assert!(second.is_ok());
    }
}
