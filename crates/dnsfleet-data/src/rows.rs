//! Row projections and their mapping onto the domain model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dnsfleet_core::{
    Entity, EntityKind, Node, NodeCredentials, NodeStatus, SyncAction, SyncLog, SyncLogType,
    SyncStatus,
};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::error::{DataError, Result};

/// Raw projection of `dnsfleet.nodes`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct NodeRow {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) host: String,
    pub(crate) port: i32,
    pub(crate) username: String,
    pub(crate) credentials: Json<NodeCredentials>,
    pub(crate) jump_host: Option<String>,
    pub(crate) config_path: Option<String>,
    pub(crate) status: String,
    pub(crate) updated_at: DateTime<Utc>,
}

impl TryFrom<NodeRow> for Node {
    type Error = DataError;

    fn try_from(row: NodeRow) -> Result<Self> {
        let port = u16::try_from(row.port).map_err(|_| DataError::InvalidColumn {
            column: "port",
            value: row.port.to_string(),
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            host: row.host,
            port,
            username: row.username,
            credentials: row.credentials.0,
            jump_host: row.jump_host,
            config_path: row.config_path.map(PathBuf::from),
            status: NodeStatus::from_label(&row.status),
            updated_at: row.updated_at,
        })
    }
}

/// Raw projection of `dnsfleet.entities`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct EntityRow {
    pub(crate) id: i64,
    pub(crate) kind: String,
    pub(crate) payload: serde_json::Value,
}

impl TryFrom<EntityRow> for Entity {
    type Error = DataError;

    fn try_from(row: EntityRow) -> Result<Self> {
        let kind = EntityKind::from_label(&row.kind).ok_or(DataError::InvalidColumn {
            column: "kind",
            value: row.kind.clone(),
        })?;
        let mut entity: Self =
            serde_json::from_value(row.payload).map_err(|source| DataError::Payload {
                operation: "decode_entity",
                source,
            })?;
        if entity.kind() != kind {
            return Err(DataError::InvalidColumn {
                column: "payload",
                value: row.kind,
            });
        }
        entity.set_id(row.id);
        Ok(entity)
    }
}

/// Columns written for an entity.
pub(crate) struct EntityColumns {
    pub(crate) kind: &'static str,
    pub(crate) natural_key: String,
    pub(crate) enabled: bool,
    pub(crate) selector: String,
    pub(crate) priority: i32,
    pub(crate) payload: serde_json::Value,
}

impl EntityColumns {
    pub(crate) fn of(entity: &Entity) -> Result<Self> {
        let payload = serde_json::to_value(entity).map_err(|source| DataError::Payload {
            operation: "encode_entity",
            source,
        })?;
        Ok(Self {
            kind: entity.kind().as_str(),
            natural_key: entity.natural_key(),
            enabled: entity.enabled(),
            selector: entity.selector().as_str().to_string(),
            priority: entity.priority(),
            payload,
        })
    }
}

/// Raw projection of `dnsfleet.config_sync_logs`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct SyncLogRow {
    pub(crate) id: i64,
    pub(crate) node_id: i64,
    pub(crate) action: String,
    pub(crate) log_type: String,
    pub(crate) content: String,
    pub(crate) target_key: Option<String>,
    pub(crate) status: String,
    pub(crate) error: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

pub(crate) fn parse_status(value: &str) -> Result<SyncStatus> {
    SyncStatus::from_label(value).ok_or_else(|| DataError::InvalidColumn {
        column: "status",
        value: value.to_string(),
    })
}

impl TryFrom<SyncLogRow> for SyncLog {
    type Error = DataError;

    fn try_from(row: SyncLogRow) -> Result<Self> {
        let action = SyncAction::from_label(&row.action).ok_or(DataError::InvalidColumn {
            column: "action",
            value: row.action.clone(),
        })?;
        let log_type = SyncLogType::from_label(&row.log_type).ok_or(DataError::InvalidColumn {
            column: "log_type",
            value: row.log_type.clone(),
        })?;
        Ok(Self {
            id: row.id,
            node_id: row.node_id,
            action,
            log_type,
            content: row.content,
            target_key: row.target_key,
            status: parse_status(&row.status)?,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
