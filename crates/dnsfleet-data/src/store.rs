//! PostgreSQL implementation of the store traits.

use async_trait::async_trait;
use dnsfleet_core::{
    Entity, EntityId, EntityKind, EntityStore, NewNode, NewSyncLog, Node, NodeId, NodeStatus,
    NodeStore, StoreError, StoreResult, SyncLog, SyncLogFilter, SyncLogId, SyncLogStore,
    SyncLogType, SyncStats, SyncStatus,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::error::{DataError, Result, map_query_err};
use crate::rows::{EntityColumns, EntityRow, NodeRow, SyncLogRow, parse_status};

/// Error text recorded on attempts abandoned by a previous process.
pub const INTERRUPTED: &str = "interrupted";

macro_rules! node_columns {
    () => {
        "id, name, host, port, username, credentials, jump_host, config_path, status, updated_at"
    };
}

macro_rules! log_columns {
    () => {
        "id, node_id, action, log_type, content, target_key, status, error, created_at, updated_at"
    };
}

const LIST_NODES: &str = concat!("SELECT ", node_columns!(), " FROM dnsfleet.nodes ORDER BY id");
const NODES_BY_IDS: &str = concat!(
    "SELECT ",
    node_columns!(),
    " FROM dnsfleet.nodes WHERE id = ANY($1) ORDER BY id"
);
const FIND_NODE: &str = concat!("SELECT ", node_columns!(), " FROM dnsfleet.nodes WHERE id = $1");
const CREATE_NODE: &str = concat!(
    "INSERT INTO dnsfleet.nodes ",
    "(name, host, port, username, credentials, jump_host, config_path) ",
    "VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING ",
    node_columns!()
);

const FIND_LOG: &str = concat!(
    "SELECT ",
    log_columns!(),
    " FROM dnsfleet.config_sync_logs WHERE id = $1"
);
const CREATE_LOG: &str = concat!(
    "INSERT INTO dnsfleet.config_sync_logs ",
    "(node_id, action, log_type, content, target_key) ",
    "VALUES ($1, $2, $3, $4, $5) RETURNING ",
    log_columns!()
);
const TRANSITION_LOG: &str = concat!(
    "UPDATE dnsfleet.config_sync_logs ",
    "SET status = $3, error = $4, updated_at = now() ",
    "WHERE id = $1 AND status = $2 RETURNING ",
    log_columns!()
);
const LIST_LOGS: &str = concat!(
    "SELECT ",
    log_columns!(),
    " FROM dnsfleet.config_sync_logs ",
    "WHERE ($1::BIGINT IS NULL OR node_id = $1) ",
    "AND ($2::TEXT IS NULL OR status = $2) ",
    "AND ($3::TEXT IS NULL OR log_type = $3) ",
    "ORDER BY id DESC LIMIT $4 OFFSET $5"
);

/// Database-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `database_url` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_query_err("connect"))?;
        Self::new(pool).await
    }

    /// Wrap an existing pool, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        info!("dnsfleet schema migrations applied");
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_log(&self, id: SyncLogId) -> Result<Option<SyncLog>> {
        sqlx::query_as::<_, SyncLogRow>(FIND_LOG)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err("find_log"))?
            .map(SyncLog::try_from)
            .transpose()
    }

    async fn transition(
        &self,
        id: SyncLogId,
        from: SyncStatus,
        to: SyncStatus,
        error: Option<String>,
        operation: &'static str,
    ) -> StoreResult<SyncLog> {
        let updated = sqlx::query_as::<_, SyncLogRow>(TRANSITION_LOG)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(error)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err(operation))?;
        if let Some(row) = updated {
            return Ok(SyncLog::try_from(row)?);
        }
        match self.fetch_log(id).await? {
            Some(current) => Err(StoreError::InvalidTransition {
                log_id: id,
                from: current.status,
                to,
            }),
            None => Err(StoreError::NotFound {
                record: "sync_log",
                id,
            }),
        }
    }
}

fn conflict_or(
    kind: EntityKind,
    key: &str,
    operation: &'static str,
) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |source| {
        let unique = source
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());
        if unique {
            StoreError::Conflict {
                kind,
                key: key.to_string(),
            }
        } else {
            map_query_err(operation)(source).into()
        }
    }
}

fn entities<I>(rows: I) -> StoreResult<Vec<Entity>>
where
    I: IntoIterator<Item = EntityRow>,
{
    rows.into_iter()
        .map(|row| Entity::try_from(row).map_err(StoreError::from))
        .collect()
}

fn nodes<I>(rows: I) -> StoreResult<Vec<Node>>
where
    I: IntoIterator<Item = NodeRow>,
{
    rows.into_iter()
        .map(|row| Node::try_from(row).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl NodeStore for PgStore {
    async fn list_nodes(&self) -> StoreResult<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(LIST_NODES)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_err("list_nodes"))
            .map_err(StoreError::from)?;
        nodes(rows)
    }

    async fn nodes_by_ids(&self, ids: &[NodeId]) -> StoreResult<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(NODES_BY_IDS)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_err("nodes_by_ids"))
            .map_err(StoreError::from)?;
        nodes(rows)
    }

    async fn find_node(&self, id: NodeId) -> StoreResult<Option<Node>> {
        let row = sqlx::query_as::<_, NodeRow>(FIND_NODE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err("find_node"))
            .map_err(StoreError::from)?;
        Ok(row.map(Node::try_from).transpose()?)
    }

    async fn create_node(&self, node: NewNode) -> StoreResult<Node> {
        let config_path = node
            .config_path
            .as_ref()
            .map(|path| path.display().to_string());
        let row = sqlx::query_as::<_, NodeRow>(CREATE_NODE)
            .bind(&node.name)
            .bind(&node.host)
            .bind(i32::from(node.port))
            .bind(&node.username)
            .bind(Json(&node.credentials))
            .bind(node.jump_host.as_deref())
            .bind(config_path)
            .fetch_one(&self.pool)
            .await
            .map_err(map_query_err("create_node"))
            .map_err(StoreError::from)?;
        Ok(Node::try_from(row)?)
    }

    async fn delete_node(&self, id: NodeId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM dnsfleet.nodes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_query_err("delete_node"))
            .map_err(StoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { record: "node", id });
        }
        Ok(())
    }

    async fn update_node_status(&self, id: NodeId, status: NodeStatus) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE dnsfleet.nodes SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_query_err("update_node_status"))
                .map_err(StoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { record: "node", id });
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn list_entities(&self, kind: EntityKind) -> StoreResult<Vec<Entity>> {
        let rows = sqlx::query_as::<_, EntityRow>(
            "SELECT id, kind, payload FROM dnsfleet.entities WHERE kind = $1 ORDER BY id",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err("list_entities"))
        .map_err(StoreError::from)?;
        entities(rows)
    }

    async fn list_enabled(&self, kind: EntityKind) -> StoreResult<Vec<Entity>> {
        let rows = sqlx::query_as::<_, EntityRow>(
            "SELECT id, kind, payload FROM dnsfleet.entities \
             WHERE kind = $1 AND enabled \
             ORDER BY priority, id",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err("list_enabled"))
        .map_err(StoreError::from)?;
        entities(rows)
    }

    async fn find_entity(&self, kind: EntityKind, id: EntityId) -> StoreResult<Option<Entity>> {
        let row = sqlx::query_as::<_, EntityRow>(
            "SELECT id, kind, payload FROM dnsfleet.entities WHERE kind = $1 AND id = $2",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_query_err("find_entity"))
        .map_err(StoreError::from)?;
        Ok(row.map(Entity::try_from).transpose()?)
    }

    async fn find_by_key(&self, kind: EntityKind, key: &str) -> StoreResult<Option<Entity>> {
        let row = sqlx::query_as::<_, EntityRow>(
            "SELECT id, kind, payload FROM dnsfleet.entities WHERE kind = $1 AND natural_key = $2",
        )
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_query_err("find_by_key"))
        .map_err(StoreError::from)?;
        Ok(row.map(Entity::try_from).transpose()?)
    }

    async fn save_entity(&self, mut entity: Entity) -> StoreResult<Entity> {
        entity
            .validate()
            .map_err(|source| StoreError::Rejected { source })?;
        let kind = entity.kind();
        let columns = EntityColumns::of(&entity)?;

        let id = if let Some(id) = entity.id() {
            let stored_key: Option<String> = sqlx::query_scalar(
                "SELECT natural_key FROM dnsfleet.entities WHERE kind = $1 AND id = $2",
            )
            .bind(columns.kind)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err("save_entity"))
            .map_err(StoreError::from)?;
            let stored_key = stored_key.ok_or(StoreError::NotFound {
                record: "entity",
                id,
            })?;
            if kind == EntityKind::DomainSet && stored_key != columns.natural_key {
                return Err(StoreError::ImmutableField {
                    kind,
                    field: "name",
                });
            }
            sqlx::query(
                "UPDATE dnsfleet.entities \
                 SET natural_key = $2, enabled = $3, selector = $4, priority = $5, \
                     payload = $6, updated_at = now() \
                 WHERE id = $1",
            )
            .bind(id)
            .bind(&columns.natural_key)
            .bind(columns.enabled)
            .bind(&columns.selector)
            .bind(columns.priority)
            .bind(&columns.payload)
            .execute(&self.pool)
            .await
            .map_err(conflict_or(kind, &columns.natural_key, "save_entity"))?;
            id
        } else {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO dnsfleet.entities \
                 (kind, natural_key, enabled, selector, priority, payload) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING id",
            )
            .bind(columns.kind)
            .bind(&columns.natural_key)
            .bind(columns.enabled)
            .bind(&columns.selector)
            .bind(columns.priority)
            .bind(&columns.payload)
            .fetch_one(&self.pool)
            .await
            .map_err(conflict_or(kind, &columns.natural_key, "save_entity"))?
        };
        entity.set_id(id);
        Ok(entity)
    }

    async fn delete_entity(&self, kind: EntityKind, id: EntityId) -> StoreResult<Entity> {
        let row = sqlx::query_as::<_, EntityRow>(
            "DELETE FROM dnsfleet.entities WHERE kind = $1 AND id = $2 \
             RETURNING id, kind, payload",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_query_err("delete_entity"))
        .map_err(StoreError::from)?;
        let row = row.ok_or(StoreError::NotFound {
            record: "entity",
            id,
        })?;
        Ok(Entity::try_from(row)?)
    }
}

#[async_trait]
impl SyncLogStore for PgStore {
    async fn create_log(&self, log: NewSyncLog) -> StoreResult<SyncLog> {
        let row = sqlx::query_as::<_, SyncLogRow>(CREATE_LOG)
            .bind(log.node_id)
            .bind(log.action.as_str())
            .bind(log.log_type.as_str())
            .bind(&log.content)
            .bind(log.target_key.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(map_query_err("create_log"))
            .map_err(StoreError::from)?;
        Ok(SyncLog::try_from(row)?)
    }

    async fn finish_log(
        &self,
        id: SyncLogId,
        status: SyncStatus,
        error: Option<String>,
    ) -> StoreResult<SyncLog> {
        if !status.is_terminal() {
            let current = self.fetch_log(id).await?.ok_or(StoreError::NotFound {
                record: "sync_log",
                id,
            })?;
            return Err(StoreError::InvalidTransition {
                log_id: id,
                from: current.status,
                to: status,
            });
        }
        self.transition(id, SyncStatus::Pending, status, error, "finish_log")
            .await
    }

    async fn reopen_log(&self, id: SyncLogId) -> StoreResult<SyncLog> {
        self.transition(id, SyncStatus::Failed, SyncStatus::Pending, None, "reopen_log")
            .await
    }

    async fn find_log(&self, id: SyncLogId) -> StoreResult<Option<SyncLog>> {
        Ok(self.fetch_log(id).await?)
    }

    async fn list_logs(&self, filter: &SyncLogFilter) -> StoreResult<Vec<SyncLog>> {
        let rows = sqlx::query_as::<_, SyncLogRow>(LIST_LOGS)
            .bind(filter.node_id)
            .bind(filter.status.map(SyncStatus::as_str))
            .bind(filter.log_type.map(SyncLogType::as_str))
            .bind(i64::from(filter.effective_limit()))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_err("list_logs"))
            .map_err(StoreError::from)?;
        rows.into_iter()
            .map(|row| SyncLog::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn log_stats(&self) -> StoreResult<SyncStats> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM dnsfleet.config_sync_logs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err("log_stats"))
        .map_err(StoreError::from)?;

        let mut stats = SyncStats::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(map_query_err("log_stats"))
                .map_err(StoreError::from)?;
            let count: i64 = row
                .try_get("count")
                .map_err(map_query_err("log_stats"))
                .map_err(StoreError::from)?;
            let count = u64::try_from(count).unwrap_or_default();
            match parse_status(&status)? {
                SyncStatus::Pending => stats.pending += count,
                SyncStatus::Success => stats.success += count,
                SyncStatus::Failed => stats.failed += count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    async fn recover_interrupted(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE dnsfleet.config_sync_logs \
             SET status = 'failed', error = $1, updated_at = now() \
             WHERE status = 'pending'",
        )
        .bind(INTERRUPTED)
        .execute(&self.pool)
        .await
        .map_err(map_query_err("recover_interrupted"))
        .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }
}
