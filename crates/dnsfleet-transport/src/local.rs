//! Sessions against a directory on the control plane host.
//!
//! Every node path is re-rooted below the factory root, so
//! `/etc/smartdns/smartdns.conf` for node 3 lands at
//! `<root>/node-3/etc/smartdns/smartdns.conf`. Used for staging deployments
//! and integration tests.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dnsfleet_core::{
    CommandOutput, Node, NodeId, RemoteSession, SessionError, SessionFactory, SessionResult,
};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::process::{decode_utf8, run};
use crate::ssh::backup_path;

/// Opens [`LocalSession`]s rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalSessionFactory {
    root: PathBuf,
}

impl LocalSessionFactory {
    /// Build a factory rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error when `root` is not an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> TransportResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(TransportError::InvalidRoot { path: root });
        }
        Ok(Self { root })
    }

    /// Directory holding the files of `node_id`.
    #[must_use]
    pub fn node_root(&self, node_id: NodeId) -> PathBuf {
        self.root.join(format!("node-{node_id}"))
    }
}

#[async_trait]
impl SessionFactory for LocalSessionFactory {
    async fn open(&self, node: &Node, _timeout: Duration) -> SessionResult<Box<dyn RemoteSession>> {
        let root = self.node_root(node.id);
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|err| SessionError::Connect {
                node_id: node.id,
                message: err.to_string(),
            })?;
        debug!(node_id = node.id, root = %root.display(), "local session opened");
        let session: Box<dyn RemoteSession> = Box::new(LocalSession { root });
        Ok(session)
    }
}

/// Session whose "remote" filesystem is a local directory.
#[derive(Debug)]
pub struct LocalSession {
    root: PathBuf,
}

impl LocalSession {
    /// Host path backing the node path `path`.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let mut resolved = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir => {
                    if resolved != self.root {
                        resolved.pop();
                    }
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        resolved
    }
}

fn io_failure(operation: &'static str, path: &Path, err: &io::Error) -> SessionError {
    if err.kind() == io::ErrorKind::NotFound {
        return SessionError::NotFound {
            path: path.to_path_buf(),
        };
    }
    SessionError::Io {
        operation,
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[async_trait]
impl RemoteSession for LocalSession {
    async fn read_file(&mut self, path: &Path) -> SessionResult<String> {
        let bytes = tokio::fs::read(self.resolve(path))
            .await
            .map_err(|err| io_failure("read_file", path, &err))?;
        decode_utf8(bytes, "read_file", path)
    }

    async fn write_file(&mut self, path: &Path, contents: &str) -> SessionResult<()> {
        let target = self.resolve(path);
        let parent = target
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|err| io_failure("write_file", path, &err))?;

        let contents = contents.to_owned();
        let written = tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut temp = NamedTempFile::new_in(&parent)?;
            io::Write::write_all(&mut temp, contents.as_bytes())?;
            temp.persist(&target).map_err(|err| err.error)?;
            Ok(())
        })
        .await
        .map_err(|err| SessionError::Io {
            operation: "write_file",
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        written.map_err(|err| io_failure("write_file", path, &err))
    }

    async fn remove_file(&mut self, path: &Path) -> SessionResult<()> {
        match tokio::fs::remove_file(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_failure("remove_file", path, &err)),
        }
    }

    async fn execute(&mut self, command: &str, timeout: Duration) -> SessionResult<CommandOutput> {
        let mut child = Command::new("sh");
        child.arg("-c").arg(command).current_dir(&self.root);
        run(child, None, timeout, "execute").await
    }

    async fn create_backup(&mut self, path: &Path) -> SessionResult<PathBuf> {
        let backup = backup_path(path);
        let mut source = tokio::fs::File::open(self.resolve(path))
            .await
            .map_err(|err| io_failure("create_backup", path, &err))?;
        let permissions = source
            .metadata()
            .await
            .map_err(|err| io_failure("create_backup", path, &err))?
            .permissions();
        let mut target = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.resolve(&backup))
            .await
            .map_err(|err| io_failure("create_backup", &backup, &err))?;
        tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|err| io_failure("create_backup", &backup, &err))?;
        target
            .sync_all()
            .await
            .map_err(|err| io_failure("create_backup", &backup, &err))?;
        target
            .set_permissions(permissions)
            .await
            .map_err(|err| io_failure("create_backup", &backup, &err))?;
        Ok(backup)
    }

    async fn close(&mut self) -> SessionResult<()> {
        Ok(())
    }
}
