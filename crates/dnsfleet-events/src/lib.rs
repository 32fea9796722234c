//! Event bus for the dnsfleet control plane.
//!
//! The bus provides a typed event enum, sequential identifiers, and replay of
//! recent events for subscribers that reconnect. Internally it uses
//! `tokio::broadcast` with a bounded buffer; when the channel overflows the
//! oldest events are dropped.
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
pub mod payloads;
pub mod routing;

pub use error::{EventBusError, EventBusResult};
pub use payloads::{
    DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId, NodeStatus, NotificationKind,
};
pub use routing::{EventBus, EventStream};
