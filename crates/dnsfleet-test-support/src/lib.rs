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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (builders and env probes), memory.rs (in-memory store),
//! remote.rs (scriptable sessions), notify.rs (recording notifier),
//! postgres.rs (disposable databases).

pub mod fixtures;
pub mod memory;
pub mod notify;
pub mod postgres;
pub mod remote;

pub use memory::MemoryStore;
pub use notify::RecordingNotifier;
pub use remote::{FakeRemote, RemoteFault};
