//! Collaborator traits implemented by persistence, transport and
//! notification adapters.

mod notify;
mod remote;
mod store;

pub use notify::{Notification, Notifier};
pub use remote::{CommandOutput, RemoteSession, SessionFactory};
pub use store::{EntityStore, NodeStore, Store, SyncLogStore};
