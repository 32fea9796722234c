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
#![allow(clippy::module_name_repetitions, clippy::redundant_pub_crate)]

//! Operator binary for a dnsfleet control plane.
//!
//! Layout:
//! - `bootstrap.rs`: settings, logging, store and transport wiring
//! - `cli.rs`: argument parsing and command dispatch
//! - `commands/`: command handlers grouped by concern
//! - `output.rs`: table and JSON renderers
//! - `error.rs`: application errors and exit codes

pub(crate) mod bootstrap;
pub(crate) mod cli;
pub(crate) mod commands;
pub(crate) mod error;
pub(crate) mod output;

pub use cli::run;
pub use error::{AppError, AppResult};
