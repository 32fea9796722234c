//! Sessions over the system OpenSSH client.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dnsfleet_core::{
    CommandOutput, Node, NodeCredentials, NodeId, RemoteSession, SessionError, SessionFactory,
    SessionResult,
};
use tokio::process::Command;
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::process::{RawOutput, decode_utf8, run, run_raw, shell_quote};

/// Exit status used by the read and backup scripts to signal a missing file.
const MISSING_FILE_STATUS: i32 = 44;
/// Exit status the ssh client reserves for its own failures.
const SSH_FAILURE_STATUS: i32 = 255;
const TEMP_SUFFIX: &str = ".dnsfleet.tmp";

static BACKUP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Client options shared by every session.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Client binary.
    pub binary: PathBuf,
    /// Deadline for file operations and backups.
    pub operation_timeout: Duration,
    /// Extra `-o` options (e.g. `StrictHostKeyChecking=accept-new`).
    pub extra_options: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ssh"),
            operation_timeout: Duration::from_secs(30),
            extra_options: vec!["StrictHostKeyChecking=accept-new".to_string()],
        }
    }
}

/// Opens [`SshSession`]s.
#[derive(Debug, Clone)]
pub struct SshSessionFactory {
    options: SshOptions,
}

impl SshSessionFactory {
    /// Build a factory.
    ///
    /// # Errors
    ///
    /// Returns an error when the binary path is empty or the timeout is zero.
    pub fn new(options: SshOptions) -> TransportResult<Self> {
        if options.binary.as_os_str().is_empty() {
            return Err(TransportError::InvalidOption {
                field: "binary",
                reason: "must not be empty",
            });
        }
        if options.operation_timeout.is_zero() {
            return Err(TransportError::InvalidOption {
                field: "operation_timeout",
                reason: "must be greater than zero",
            });
        }
        Ok(Self { options })
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    async fn open(&self, node: &Node, timeout: Duration) -> SessionResult<Box<dyn RemoteSession>> {
        let session = SshSession {
            node_id: node.id,
            args: client_args(node, &self.options, timeout),
            options: self.options.clone(),
        };
        let handshake = session.remote("true", None, timeout, "connect").await;
        match handshake {
            Ok(output) if output.success() => {
                debug!(node_id = node.id, host = %node.host, "ssh session established");
                let session: Box<dyn RemoteSession> = Box::new(session);
                Ok(session)
            }
            Ok(output) => Err(SessionError::Connect {
                node_id: node.id,
                message: output.stderr.trim().to_string(),
            }),
            Err(SessionError::Timeout { .. }) => Err(SessionError::Connect {
                node_id: node.id,
                message: format!("no response within {}s", timeout.as_secs()),
            }),
            Err(err) => Err(SessionError::Connect {
                node_id: node.id,
                message: err.detail(),
            }),
        }
    }
}

/// One logical connection to a node; each operation runs a short ssh child.
#[derive(Debug)]
pub struct SshSession {
    node_id: NodeId,
    args: Vec<String>,
    options: SshOptions,
}

impl SshSession {
    /// Node this session talks to.
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn command(&self, script: &str) -> Command {
        let mut command = Command::new(&self.options.binary);
        command.args(&self.args).arg("--").arg(script);
        command
    }

    async fn remote(
        &self,
        script: &str,
        stdin: Option<&[u8]>,
        timeout: Duration,
        operation: &'static str,
    ) -> SessionResult<CommandOutput> {
        run(self.command(script), stdin, timeout, operation).await
    }

    async fn file_op(
        &self,
        script: &str,
        stdin: Option<&[u8]>,
        path: &Path,
        operation: &'static str,
    ) -> SessionResult<RawOutput> {
        let output = run_raw(
            self.command(script),
            stdin,
            self.options.operation_timeout,
            operation,
        )
        .await?;
        match output.status {
            Some(0) => Ok(output),
            Some(MISSING_FILE_STATUS) => Err(SessionError::NotFound {
                path: path.to_path_buf(),
            }),
            Some(SSH_FAILURE_STATUS) => Err(SessionError::Connect {
                node_id: self.node_id,
                message: output.stderr.trim().to_string(),
            }),
            _ => Err(SessionError::Io {
                operation,
                path: path.to_path_buf(),
                message: output.stderr.trim().to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn read_file(&mut self, path: &Path) -> SessionResult<String> {
        let quoted = quote_path(path);
        let script = format!("test -e {quoted} || exit {MISSING_FILE_STATUS}; cat {quoted}");
        let output = self.file_op(&script, None, path, "read_file").await?;
        decode_utf8(output.stdout, "read_file", path)
    }

    async fn write_file(&mut self, path: &Path, contents: &str) -> SessionResult<()> {
        let target = quote_path(path);
        let temp = shell_quote(&format!("{}{TEMP_SUFFIX}", path.display()));
        let script = format!("cat > {temp} && mv -f {temp} {target}");
        self.file_op(&script, Some(contents.as_bytes()), path, "write_file")
            .await
            .map(|_| ())
    }

    async fn remove_file(&mut self, path: &Path) -> SessionResult<()> {
        let script = format!("rm -f {}", quote_path(path));
        self.file_op(&script, None, path, "remove_file")
            .await
            .map(|_| ())
    }

    async fn execute(&mut self, command: &str, timeout: Duration) -> SessionResult<CommandOutput> {
        let output = self.remote(command, None, timeout, "execute").await?;
        if output.status == Some(SSH_FAILURE_STATUS) {
            return Err(SessionError::Connect {
                node_id: self.node_id,
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    async fn create_backup(&mut self, path: &Path) -> SessionResult<PathBuf> {
        let backup = backup_path(path);
        let source = quote_path(path);
        let target = quote_path(&backup);
        let script = format!(
            "test -e {source} || exit {MISSING_FILE_STATUS}; \
             if test -e {target}; then echo 'backup target already exists' >&2; exit 1; fi; \
             cp -p {source} {target}"
        );
        self.file_op(&script, None, path, "create_backup").await?;
        Ok(backup)
    }

    async fn close(&mut self) -> SessionResult<()> {
        self.args.clear();
        Ok(())
    }
}

/// Timestamped sibling path used for backups.
///
/// Microsecond stamps plus a process-wide sequence keep two backups taken
/// within the same second apart.
pub(crate) fn backup_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d%H%M%S%.6f");
    let sequence = BACKUP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PathBuf::from(format!("{}.bak.{stamp}.{sequence}", path.display()))
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.display().to_string())
}

fn client_args(node: &Node, options: &SshOptions, connect_timeout: Duration) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)),
        "-p".to_string(),
        node.port.to_string(),
    ];
    for option in &options.extra_options {
        args.push("-o".to_string());
        args.push(option.clone());
    }
    if let NodeCredentials::KeyFile { path } = &node.credentials {
        args.push("-i".to_string());
        args.push(path.display().to_string());
        args.push("-o".to_string());
        args.push("IdentitiesOnly=yes".to_string());
    }
    if let Some(jump) = node.jump_host.as_deref().filter(|jump| !jump.trim().is_empty()) {
        args.push("-J".to_string());
        args.push(jump.trim().to_string());
    }
    args.push(format!("{}@{}", node.username, node.host));
    args
}
