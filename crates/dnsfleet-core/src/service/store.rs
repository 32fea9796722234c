use async_trait::async_trait;
use dnsfleet_events::NodeStatus;

use crate::error::StoreResult;
use crate::model::{
    Entity, EntityId, EntityKind, NewNode, NewSyncLog, Node, NodeId, SyncLog, SyncLogFilter,
    SyncLogId, SyncStats, SyncStatus,
};

/// Node inventory.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Every registered node, ordered by id.
    async fn list_nodes(&self) -> StoreResult<Vec<Node>>;

    /// Nodes among `ids` that still exist, ordered by id.
    async fn nodes_by_ids(&self, ids: &[NodeId]) -> StoreResult<Vec<Node>>;

    /// Look up one node.
    async fn find_node(&self, id: NodeId) -> StoreResult<Option<Node>>;

    /// Register a node.
    async fn create_node(&self, node: NewNode) -> StoreResult<Node>;

    /// Remove a node; audit entries are kept.
    async fn delete_node(&self, id: NodeId) -> StoreResult<()>;

    /// Persist the last observed status.
    async fn update_node_status(&self, id: NodeId, status: NodeStatus) -> StoreResult<()>;
}

/// Managed entity persistence.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Every stored entity of `kind`, in write order.
    async fn list_entities(&self, kind: EntityKind) -> StoreResult<Vec<Entity>>;

    /// Enabled entities of `kind` in write order: rules by ascending priority
    /// then id, everything else by id.
    async fn list_enabled(&self, kind: EntityKind) -> StoreResult<Vec<Entity>>;

    /// Look up an entity by id.
    async fn find_entity(&self, kind: EntityKind, id: EntityId) -> StoreResult<Option<Entity>>;

    /// Look up an entity by its natural key.
    async fn find_by_key(&self, kind: EntityKind, key: &str) -> StoreResult<Option<Entity>>;

    /// Insert (no id) or update (with id) an entity, returning the stored form.
    ///
    /// Rejects invalid entities, natural-key conflicts and domain set renames.
    async fn save_entity(&self, entity: Entity) -> StoreResult<Entity>;

    /// Delete an entity, returning what was removed.
    async fn delete_entity(&self, kind: EntityKind, id: EntityId) -> StoreResult<Entity>;
}

/// Sync audit log persistence.
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    /// Open a `pending` entry.
    async fn create_log(&self, log: NewSyncLog) -> StoreResult<SyncLog>;

    /// Move a `pending` entry to a terminal status.
    async fn finish_log(
        &self,
        id: SyncLogId,
        status: SyncStatus,
        error: Option<String>,
    ) -> StoreResult<SyncLog>;

    /// Move a `failed` entry back to `pending` for a retry.
    async fn reopen_log(&self, id: SyncLogId) -> StoreResult<SyncLog>;

    /// Look up one entry.
    async fn find_log(&self, id: SyncLogId) -> StoreResult<Option<SyncLog>>;

    /// Entries matching `filter`, newest first.
    async fn list_logs(&self, filter: &SyncLogFilter) -> StoreResult<Vec<SyncLog>>;

    /// Counts by status.
    async fn log_stats(&self) -> StoreResult<SyncStats>;

    /// Fail every entry left `pending` by a previous process; returns the count.
    async fn recover_interrupted(&self) -> StoreResult<u64>;
}

/// Everything the sync engine needs from persistence.
pub trait Store: NodeStore + EntityStore + SyncLogStore {}

impl<T> Store for T where T: NodeStore + EntityStore + SyncLogStore {}
