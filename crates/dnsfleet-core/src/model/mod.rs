//! Domain types for nodes, managed entities and the sync audit log.

mod entity;
mod node;
mod sync_log;

pub use entity::{
    AddressMapping, AddressTarget, DOMAIN_SET_PREFIX, DnsServer, DomainRule, DomainSet,
    DomainSetItem, Entity, EntityId, EntityKind, NameserverRule, RuleTarget, ServerType,
    domain_key,
};
pub use node::{NewNode, Node, NodeCredentials, NodeId};
pub use sync_log::{
    NewSyncLog, SyncAction, SyncLog, SyncLogFilter, SyncLogId, SyncLogType, SyncStats,
    SyncStatus,
};
