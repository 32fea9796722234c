use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SessionResult;
use crate::model::Node;

/// Captured result of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub status: Option<i32>,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }
}

/// One short-lived connection to a node.
///
/// Sessions are owned by a single operation and closed on every exit path.
#[async_trait]
pub trait RemoteSession: Send {
    /// Read a file; a missing file is reported as `SessionError::NotFound`.
    async fn read_file(&mut self, path: &Path) -> SessionResult<String>;

    /// Replace a file atomically (temporary path, then rename).
    async fn write_file(&mut self, path: &Path, contents: &str) -> SessionResult<()>;

    /// Remove a file if it exists.
    async fn remove_file(&mut self, path: &Path) -> SessionResult<()>;

    /// Run a command, killing it when `timeout` expires.
    async fn execute(&mut self, command: &str, timeout: Duration) -> SessionResult<CommandOutput>;

    /// Copy `path` to a timestamped sibling and return the copy's path.
    async fn create_backup(&mut self, path: &Path) -> SessionResult<PathBuf>;

    /// Release the connection.
    async fn close(&mut self) -> SessionResult<()>;
}

/// Opens sessions to nodes.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Establish a session within `timeout`.
    async fn open(&self, node: &Node, timeout: Duration) -> SessionResult<Box<dyn RemoteSession>>;
}
