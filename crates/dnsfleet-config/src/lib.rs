//! Runtime settings for the synchronisation engine.
//!
//! Settings are resolved from built-in defaults, an optional JSON file, and
//! `DNSFLEET_*` environment overrides, then validated as a whole.
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

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_FILE_ENV, load_from_env, load_with};
pub use model::{BackupPolicy, SyncSettings};
