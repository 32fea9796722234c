//! Domain model and collaborator traits shared by the dnsfleet crates.
//!
//! The model covers managed resolver nodes, the five managed entity kinds
//! and the per-node sync audit log. Persistence, remote execution and
//! notification delivery are expressed as traits so the engine can be wired
//! against Postgres and SSH in production and in-memory fakes in tests.
#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod model;
pub mod selector;
pub mod service;

pub use dnsfleet_events::{NodeStatus, NotificationKind};
pub use error::{EntityError, SelectorError, SessionError, SessionResult, StoreError, StoreResult};
pub use model::{
    AddressMapping, AddressTarget, DOMAIN_SET_PREFIX, DnsServer, DomainRule, DomainSet,
    DomainSetItem, Entity, EntityId, EntityKind, NameserverRule, NewNode, NewSyncLog, Node,
    NodeCredentials, NodeId, RuleTarget, ServerType, SyncAction, SyncLog, SyncLogFilter,
    SyncLogId, SyncLogType, SyncStats, SyncStatus, domain_key,
};
pub use selector::{NodeSelector, SelectorTarget};
pub use service::{
    CommandOutput, EntityStore, NodeStore, Notification, Notifier, RemoteSession,
    SessionFactory, Store, SyncLogStore,
};
