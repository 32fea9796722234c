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

//! PostgreSQL persistence for dnsfleet: embedded migrations and the
//! [`PgStore`] implementation of the core store traits.

pub mod error;
mod rows;
pub mod store;

pub use error::{DataError, Result as DataResult};
pub use store::{INTERRUPTED, PgStore};
