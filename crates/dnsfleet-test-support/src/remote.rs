//! Scriptable [`SessionFactory`] with per-node in-memory filesystems.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dnsfleet_core::{
    CommandOutput, Node, NodeId, RemoteSession, SessionError, SessionFactory, SessionResult,
};

/// Failure to inject for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteFault {
    /// Opening a session fails immediately.
    Connect,
    /// Opening a session never completes.
    ConnectHang,
    /// Reading any file fails.
    Read,
    /// Writing any file fails.
    Write,
    /// Creating a backup fails.
    Backup,
    /// Removing a file fails.
    Remove,
    /// Commands exit with status 1.
    Execute,
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<(NodeId, PathBuf), String>,
    faults: HashMap<NodeId, HashSet<RemoteFault>>,
    latency: HashMap<NodeId, Duration>,
    outputs: HashMap<NodeId, CommandOutput>,
    commands: Vec<(NodeId, String)>,
    writes: Vec<(NodeId, PathBuf)>,
    backups: Vec<(NodeId, PathBuf)>,
    open: usize,
    peak: usize,
    opened: usize,
    leaked: usize,
}

/// Fake transport shared between a test and the engine under test.
#[derive(Clone, Default)]
pub struct FakeRemote {
    inner: Arc<Mutex<Inner>>,
}

impl FakeRemote {
    /// Empty fleet with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Seed a file on `node_id`.
    pub fn put_file(&self, node_id: NodeId, path: impl Into<PathBuf>, contents: &str) {
        self.lock()
            .files
            .insert((node_id, path.into()), contents.to_string());
    }

    /// Current contents of a file on `node_id`.
    #[must_use]
    pub fn file(&self, node_id: NodeId, path: impl AsRef<Path>) -> Option<String> {
        self.lock()
            .files
            .get(&(node_id, path.as_ref().to_path_buf()))
            .cloned()
    }

    /// Inject `fault` for every later operation on `node_id`.
    pub fn inject(&self, node_id: NodeId, fault: RemoteFault) {
        self.lock().faults.entry(node_id).or_default().insert(fault);
    }

    /// Remove every injected fault for `node_id`.
    pub fn heal(&self, node_id: NodeId) {
        self.lock().faults.remove(&node_id);
    }

    /// Delay every read on `node_id` by `latency`.
    pub fn set_latency(&self, node_id: NodeId, latency: Duration) {
        self.lock().latency.insert(node_id, latency);
    }

    /// Output returned by commands executed on `node_id`.
    pub fn set_command_output(&self, node_id: NodeId, output: CommandOutput) {
        self.lock().outputs.insert(node_id, output);
    }

    /// Commands executed on `node_id`, in order.
    #[must_use]
    pub fn commands(&self, node_id: NodeId) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .filter(|(id, _)| *id == node_id)
            .map(|(_, command)| command.clone())
            .collect()
    }

    /// Paths written on `node_id`, in order.
    #[must_use]
    pub fn writes(&self, node_id: NodeId) -> Vec<PathBuf> {
        self.lock()
            .writes
            .iter()
            .filter(|(id, _)| *id == node_id)
            .map(|(_, path)| path.clone())
            .collect()
    }

    /// Backups created on `node_id`.
    #[must_use]
    pub fn backups(&self, node_id: NodeId) -> Vec<PathBuf> {
        self.lock()
            .backups
            .iter()
            .filter(|(id, _)| *id == node_id)
            .map(|(_, path)| path.clone())
            .collect()
    }

    /// Sessions currently open.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.lock().open
    }

    /// Highest number of simultaneously open sessions observed.
    #[must_use]
    pub fn peak_sessions(&self) -> usize {
        self.lock().peak
    }

    /// Total sessions opened.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.lock().opened
    }

    /// Sessions dropped without `close`.
    #[must_use]
    pub fn leaked_sessions(&self) -> usize {
        self.lock().leaked
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl SessionFactory for FakeRemote {
    async fn open(&self, node: &Node, _timeout: Duration) -> SessionResult<Box<dyn RemoteSession>> {
        let faults = self.lock().faults.get(&node.id).cloned().unwrap_or_default();
        if faults.contains(&RemoteFault::ConnectHang) {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        if faults.contains(&RemoteFault::Connect) {
            return Err(SessionError::Connect {
                node_id: node.id,
                message: "connection refused".into(),
            });
        }
        {
            let mut inner = self.lock();
            inner.open += 1;
            inner.opened += 1;
            inner.peak = inner.peak.max(inner.open);
        }
        let session: Box<dyn RemoteSession> = Box::new(FakeSession {
            node_id: node.id,
            inner: Arc::clone(&self.inner),
            closed: false,
        });
        Ok(session)
    }
}

struct FakeSession {
    node_id: NodeId,
    inner: Arc<Mutex<Inner>>,
    closed: bool,
}

impl FakeSession {
    fn faulted(&self, fault: RemoteFault) -> bool {
        lock(&self.inner)
            .faults
            .get(&self.node_id)
            .is_some_and(|faults| faults.contains(&fault))
    }

    fn io_error(operation: &'static str, path: &Path) -> SessionError {
        SessionError::Io {
            operation,
            path: path.to_path_buf(),
            message: "injected failure".into(),
        }
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn read_file(&mut self, path: &Path) -> SessionResult<String> {
        let latency = lock(&self.inner).latency.get(&self.node_id).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.faulted(RemoteFault::Read) {
            return Err(Self::io_error("read_file", path));
        }
        lock(&self.inner)
            .files
            .get(&(self.node_id, path.to_path_buf()))
            .cloned()
            .ok_or_else(|| SessionError::NotFound {
                path: path.to_path_buf(),
            })
    }

    async fn write_file(&mut self, path: &Path, contents: &str) -> SessionResult<()> {
        if self.faulted(RemoteFault::Write) {
            return Err(Self::io_error("write_file", path));
        }
        let mut inner = lock(&self.inner);
        inner
            .files
            .insert((self.node_id, path.to_path_buf()), contents.to_string());
        inner.writes.push((self.node_id, path.to_path_buf()));
        Ok(())
    }

    async fn remove_file(&mut self, path: &Path) -> SessionResult<()> {
        if self.faulted(RemoteFault::Remove) {
            return Err(Self::io_error("remove_file", path));
        }
        lock(&self.inner)
            .files
            .remove(&(self.node_id, path.to_path_buf()));
        Ok(())
    }

    async fn execute(&mut self, command: &str, _timeout: Duration) -> SessionResult<CommandOutput> {
        let failing = self.faulted(RemoteFault::Execute);
        let mut inner = lock(&self.inner);
        inner.commands.push((self.node_id, command.to_string()));
        if failing {
            return Ok(CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: "injected failure".into(),
            });
        }
        Ok(inner
            .outputs
            .get(&self.node_id)
            .cloned()
            .unwrap_or(CommandOutput {
                status: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }))
    }

    async fn create_backup(&mut self, path: &Path) -> SessionResult<PathBuf> {
        if self.faulted(RemoteFault::Backup) {
            return Err(Self::io_error("create_backup", path));
        }
        let mut inner = lock(&self.inner);
        let contents = inner
            .files
            .get(&(self.node_id, path.to_path_buf()))
            .cloned()
            .ok_or_else(|| SessionError::NotFound {
                path: path.to_path_buf(),
            })?;
        let count = inner.backups.len();
        let backup = PathBuf::from(format!("{}.bak.{count}", path.display()));
        inner.files.insert((self.node_id, backup.clone()), contents);
        inner.backups.push((self.node_id, backup.clone()));
        Ok(backup)
    }

    async fn close(&mut self) -> SessionResult<()> {
        if !self.closed {
            self.closed = true;
            let mut inner = lock(&self.inner);
            inner.open = inner.open.saturating_sub(1);
        }
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.closed {
            let mut inner = lock(&self.inner);
            inner.open = inner.open.saturating_sub(1);
            inner.leaked += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::node;

    #[tokio::test]
    async fn files_are_per_node() -> anyhow::Result<()> {
        let remote = FakeRemote::new();
        remote.put_file(1, "/etc/a.conf", "one");
        let mut first = remote.open(&node(1), Duration::from_secs(1)).await?;
        let mut second = remote.open(&node(2), Duration::from_secs(1)).await?;
        assert_eq!(first.read_file(Path::new("/etc/a.conf")).await?, "one");
        assert!(second.read_file(Path::new("/etc/a.conf")).await.is_err());
        assert_eq!(remote.peak_sessions(), 2);
        first.close().await?;
        second.close().await?;
        assert_eq!(remote.open_sessions(), 0);
        assert_eq!(remote.leaked_sessions(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn injected_faults_apply_until_healed() -> anyhow::Result<()> {
        let remote = FakeRemote::new();
        remote.inject(3, RemoteFault::Connect);
        assert!(remote.open(&node(3), Duration::from_secs(1)).await.is_err());
        remote.heal(3);
        let mut session = remote.open(&node(3), Duration::from_secs(1)).await?;
        session.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn dropped_sessions_are_counted_as_leaked() -> anyhow::Result<()> {
        let remote = FakeRemote::new();
        let session = remote.open(&node(1), Duration::from_secs(1)).await?;
        drop(session);
        assert_eq!(remote.leaked_sessions(), 1);
        assert_eq!(remote.open_sessions(), 0);
        Ok(())
    }
}
