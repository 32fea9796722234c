//! In-memory [`Store`](dnsfleet_core::Store) with the same rules as the
//! Postgres implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use dnsfleet_core::{
    Entity, EntityId, EntityKind, EntityStore, NewNode, NewSyncLog, Node, NodeId, NodeStatus,
    NodeStore, StoreError, StoreResult, SyncLog, SyncLogFilter, SyncLogId, SyncLogStore,
    SyncStats, SyncStatus,
};

/// Error text recorded on logs failed by [`SyncLogStore::recover_interrupted`].
pub const INTERRUPTED: &str = "interrupted";

#[derive(Default)]
struct State {
    nodes: BTreeMap<NodeId, Node>,
    entities: BTreeMap<EntityId, Entity>,
    logs: BTreeMap<SyncLogId, SyncLog>,
    failing: BTreeSet<&'static str>,
    next_node: NodeId,
    next_entity: EntityId,
    next_log: SyncLogId,
}

/// Thread-safe store backed by ordered maps.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with nodes `1..=count`.
    #[must_use]
    pub fn with_nodes(count: i64) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for id in 1..=count {
                state.nodes.insert(id, crate::fixtures::node(id));
            }
            state.next_node = count;
        }
        store
    }

    /// Snapshot of every audit entry, oldest first.
    #[must_use]
    pub fn all_logs(&self) -> Vec<SyncLog> {
        self.lock().logs.values().cloned().collect()
    }

    /// Insert a log row verbatim (for recovery tests).
    pub fn insert_log(&self, log: SyncLog) {
        let mut state = self.lock();
        state.next_log = state.next_log.max(log.id);
        state.logs.insert(log.id, log);
    }

    /// Make every later call of the store method `operation` fail with a
    /// backend error until [`MemoryStore::heal`] is called.
    pub fn fail_operation(&self, operation: &'static str) {
        self.lock().failing.insert(operation);
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        self.lock().failing.clear();
    }

    fn check(&self, operation: &'static str) -> StoreResult<()> {
        if self.lock().failing.contains(operation) {
            return Err(StoreError::backend(operation, "injected backend failure"));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn list_nodes(&self) -> StoreResult<Vec<Node>> {
        self.check("list_nodes")?;
        Ok(self.lock().nodes.values().cloned().collect())
    }

    async fn nodes_by_ids(&self, ids: &[NodeId]) -> StoreResult<Vec<Node>> {
        self.check("nodes_by_ids")?;
        let state = self.lock();
        Ok(state
            .nodes
            .values()
            .filter(|node| ids.contains(&node.id))
            .cloned()
            .collect())
    }

    async fn find_node(&self, id: NodeId) -> StoreResult<Option<Node>> {
        self.check("find_node")?;
        Ok(self.lock().nodes.get(&id).cloned())
    }

    async fn create_node(&self, node: NewNode) -> StoreResult<Node> {
        self.check("create_node")?;
        let mut state = self.lock();
        state.next_node += 1;
        let created = Node {
            id: state.next_node,
            name: node.name,
            host: node.host,
            port: node.port,
            username: node.username,
            credentials: node.credentials,
            jump_host: node.jump_host,
            config_path: node.config_path,
            status: NodeStatus::Unknown,
            updated_at: Utc::now(),
        };
        state.nodes.insert(created.id, created.clone());
        Ok(created)
    }

    async fn delete_node(&self, id: NodeId) -> StoreResult<()> {
        self.check("delete_node")?;
        self.lock()
            .nodes
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { record: "node", id })
    }

    async fn update_node_status(&self, id: NodeId, status: NodeStatus) -> StoreResult<()> {
        self.check("update_node_status")?;
        let mut state = self.lock();
        let node = state
            .nodes
            .get_mut(&id)
            .ok_or(StoreError::NotFound { record: "node", id })?;
        node.status = status;
        node.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn list_entities(&self, kind: EntityKind) -> StoreResult<Vec<Entity>> {
        self.check("list_entities")?;
        Ok(self
            .lock()
            .entities
            .values()
            .filter(|entity| entity.kind() == kind)
            .cloned()
            .collect())
    }

    async fn list_enabled(&self, kind: EntityKind) -> StoreResult<Vec<Entity>> {
        self.check("list_enabled")?;
        let mut entities: Vec<Entity> = self
            .lock()
            .entities
            .values()
            .filter(|entity| entity.kind() == kind && entity.enabled())
            .cloned()
            .collect();
        entities.sort_by_key(|entity| (entity.priority(), entity.id()));
        Ok(entities)
    }

    async fn find_entity(&self, kind: EntityKind, id: EntityId) -> StoreResult<Option<Entity>> {
        self.check("find_entity")?;
        Ok(self
            .lock()
            .entities
            .get(&id)
            .filter(|entity| entity.kind() == kind)
            .cloned())
    }

    async fn find_by_key(&self, kind: EntityKind, key: &str) -> StoreResult<Option<Entity>> {
        self.check("find_by_key")?;
        Ok(self
            .lock()
            .entities
            .values()
            .find(|entity| entity.kind() == kind && entity.natural_key() == key)
            .cloned())
    }

    async fn save_entity(&self, mut entity: Entity) -> StoreResult<Entity> {
        self.check("save_entity")?;
        entity
            .validate()
            .map_err(|source| StoreError::Rejected { source })?;
        let kind = entity.kind();
        let key = entity.natural_key();
        let mut state = self.lock();

        if let Some(id) = entity.id() {
            let existing = state
                .entities
                .get(&id)
                .filter(|stored| stored.kind() == kind)
                .ok_or(StoreError::NotFound {
                    record: "entity",
                    id,
                })?;
            if kind == EntityKind::DomainSet && existing.natural_key() != key {
                return Err(StoreError::ImmutableField {
                    kind,
                    field: "name",
                });
            }
        }

        let conflict = state.entities.values().any(|stored| {
            stored.kind() == kind && stored.natural_key() == key && stored.id() != entity.id()
        });
        if conflict {
            return Err(StoreError::Conflict { kind, key });
        }

        let id = match entity.id() {
            Some(id) => id,
            None => {
                state.next_entity += 1;
                state.next_entity
            }
        };
        entity.set_id(id);
        state.entities.insert(id, entity.clone());
        Ok(entity)
    }

    async fn delete_entity(&self, kind: EntityKind, id: EntityId) -> StoreResult<Entity> {
        self.check("delete_entity")?;
        let mut state = self.lock();
        if state.entities.get(&id).is_none_or(|entity| entity.kind() != kind) {
            return Err(StoreError::NotFound {
                record: "entity",
                id,
            });
        }
        state.entities.remove(&id).ok_or(StoreError::NotFound {
            record: "entity",
            id,
        })
    }
}

#[async_trait]
impl SyncLogStore for MemoryStore {
    async fn create_log(&self, log: NewSyncLog) -> StoreResult<SyncLog> {
        self.check("create_log")?;
        let mut state = self.lock();
        state.next_log += 1;
        let now = Utc::now();
        let created = SyncLog {
            id: state.next_log,
            node_id: log.node_id,
            action: log.action,
            log_type: log.log_type,
            content: log.content,
            target_key: log.target_key,
            status: SyncStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };
        state.logs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn finish_log(
        &self,
        id: SyncLogId,
        status: SyncStatus,
        error: Option<String>,
    ) -> StoreResult<SyncLog> {
        self.check("finish_log")?;
        let mut state = self.lock();
        let log = state.logs.get_mut(&id).ok_or(StoreError::NotFound {
            record: "sync_log",
            id,
        })?;
        if !status.is_terminal() || !log.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                log_id: id,
                from: log.status,
                to: status,
            });
        }
        log.status = status;
        log.error = error;
        log.updated_at = Utc::now();
        Ok(log.clone())
    }

    async fn reopen_log(&self, id: SyncLogId) -> StoreResult<SyncLog> {
        self.check("reopen_log")?;
        let mut state = self.lock();
        let log = state.logs.get_mut(&id).ok_or(StoreError::NotFound {
            record: "sync_log",
            id,
        })?;
        if log.status != SyncStatus::Failed {
            return Err(StoreError::InvalidTransition {
                log_id: id,
                from: log.status,
                to: SyncStatus::Pending,
            });
        }
        log.status = SyncStatus::Pending;
        log.error = None;
        log.updated_at = Utc::now();
        Ok(log.clone())
    }

    async fn find_log(&self, id: SyncLogId) -> StoreResult<Option<SyncLog>> {
        self.check("find_log")?;
        Ok(self.lock().logs.get(&id).cloned())
    }

    async fn list_logs(&self, filter: &SyncLogFilter) -> StoreResult<Vec<SyncLog>> {
        self.check("list_logs")?;
        let state = self.lock();
        let limit = usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX);
        let offset = usize::try_from(filter.offset).unwrap_or(usize::MAX);
        Ok(state
            .logs
            .values()
            .rev()
            .filter(|log| filter.matches(log))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn log_stats(&self) -> StoreResult<SyncStats> {
        self.check("log_stats")?;
        let mut stats = SyncStats::default();
        for log in self.lock().logs.values() {
            stats.record(log.status);
        }
        Ok(stats)
    }

    async fn recover_interrupted(&self) -> StoreResult<u64> {
        self.check("recover_interrupted")?;
        let mut state = self.lock();
        let now = Utc::now();
        let mut recovered = 0;
        for log in state
            .logs
            .values_mut()
            .filter(|log| log.status == SyncStatus::Pending)
        {
            log.status = SyncStatus::Failed;
            log.error = Some(INTERRUPTED.to_string());
            log.updated_at = now;
            recovered += 1;
        }
        Ok(recovered)
    }
}
