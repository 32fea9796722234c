//! Remote session adapters.
//!
//! [`SshSessionFactory`] drives the system `ssh` client; every remote
//! operation is a short child process that is killed when its deadline
//! expires. [`LocalSessionFactory`] implements the same contract against a
//! directory on the control plane host.
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
pub mod local;
mod process;
pub mod ssh;

pub use error::{TransportError, TransportResult};
pub use local::{LocalSession, LocalSessionFactory};
pub use process::shell_quote;
pub use ssh::{SshOptions, SshSession, SshSessionFactory};
