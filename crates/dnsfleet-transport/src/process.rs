//! Child process execution with deadlines.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use dnsfleet_core::{CommandOutput, SessionError, SessionResult};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Quote `value` for a POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Exit status and captured streams, with stdout left undecoded.
#[derive(Debug)]
pub(crate) struct RawOutput {
    pub(crate) status: Option<i32>,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: String,
}

impl RawOutput {
    pub(crate) fn into_lossy(self) -> CommandOutput {
        CommandOutput {
            status: self.status,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: self.stderr,
        }
    }
}

/// Decode file contents, refusing anything that is not valid UTF-8.
pub(crate) fn decode_utf8(
    bytes: Vec<u8>,
    operation: &'static str,
    path: &Path,
) -> SessionResult<String> {
    String::from_utf8(bytes).map_err(|err| SessionError::Io {
        operation,
        path: path.to_path_buf(),
        message: format!(
            "file is not valid UTF-8 (first invalid byte at offset {})",
            err.utf8_error().valid_up_to()
        ),
    })
}

/// Run `command` to completion, feeding `stdin` when given.
pub(crate) async fn run(
    command: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    operation: &'static str,
) -> SessionResult<CommandOutput> {
    run_raw(command, stdin, timeout, operation)
        .await
        .map(RawOutput::into_lossy)
}

/// Like [`run`], but stdout is returned as raw bytes.
///
/// The child is spawned with `kill_on_drop`, so abandoning the future on
/// timeout terminates the process.
pub(crate) async fn run_raw(
    mut command: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    operation: &'static str,
) -> SessionResult<RawOutput> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let io_error = |err: std::io::Error| SessionError::Io {
        operation,
        path: Default::default(),
        message: err.to_string(),
    };

    let task = async {
        let mut child = command.spawn().map_err(io_error)?;
        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(bytes).await.map_err(io_error)?;
            pipe.shutdown().await.map_err(io_error)?;
        }
        let output = child.wait_with_output().await.map_err(io_error)?;
        Ok(RawOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    };

    tokio::time::timeout(timeout, task)
        .await
        .map_err(|_| SessionError::Timeout {
            operation,
            after: timeout,
        })?
}
