use std::fmt::Debug;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{timeout, timeout_at, Instant};

use crate::error::ProbeError;

use super::{Invocation, MAX_TIMEOUT};

const READ_BUF_SIZE: usize = 4096;

/// How long stderr may stay open after the process itself is gone, e.g. because a killed
/// wrapper left a child behind.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// More than any ping or traceroute will reasonably complain about.
const MAX_STDERR_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Success,
    /// Non-zero exit. `code` is `None` if the process was killed by a signal.
    Failed { code: Option<i32> },
    /// The deadline passed and the process was killed.
    TimedOut,
}

/// How a process ended, plus what it had to say on stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunExit {
    pub kind: ExitKind,
    pub stderr: String,
}

/// Runs a probe process to completion.
#[async_trait]
pub trait Runner: Send + Sync + Debug {
    /// Runs `invocation`, sending stdout to `chunk_tx` in arbitrarily sized chunks, in the order
    /// the process wrote them. The sender is dropped as soon as stdout is exhausted or the
    /// deadline has passed, which is how the receiving side knows that no more output follows.
    ///
    /// Only fails if the process could not be started or talked to. Unsuccessful exits and
    /// timeouts are reported through [RunExit], since the output read so far may still be useful.
    async fn run(
        &self,
        invocation: &Invocation,
        chunk_tx: UnboundedSender<Vec<u8>>,
    ) -> Result<RunExit, ProbeError>;
}

/// Spawns real processes. Never goes through a shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl Runner for SystemRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        chunk_tx: UnboundedSender<Vec<u8>>,
    ) -> Result<RunExit, ProbeError> {
        let program = &invocation.program;
        debug!("Calling `{}` with deadline {:?}", invocation, invocation.timeout);
        let deadline = Instant::now() + invocation.timeout.min(MAX_TIMEOUT);

        let mut child = Command::new(program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::SpawnFailed {
                program: program.to_string(),
                source,
            })?;

        let mut stderr_task = tokio::spawn(watch_stderr(child.stderr.take(), program.to_string()));
        let stdout = child.stdout.take();

        let pumping = pump_then_wait(&mut child, stdout, chunk_tx, program);
        let pumped = timeout_at(deadline, pumping).await;
        let kind = match pumped {
            Ok(Ok(status)) => exit_kind_of(status),
            Ok(Err(source)) => {
                return Err(ProbeError::Io {
                    program: program.to_string(),
                    source,
                })
            }
            Err(_) => {
                warn!(
                    "`{}` did not finish within {:?}, killing it",
                    invocation, invocation.timeout
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill `{}`: {}", program, e);
                }
                ExitKind::TimedOut
            }
        };

        let stderr = match timeout(STDERR_GRACE, &mut stderr_task).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("stderr watcher for `{}` failed: {}", program, e);
                String::new()
            }
            Err(_) => {
                debug!("stderr of `{}` still open after exit, not waiting for it", program);
                stderr_task.abort();
                String::new()
            }
        };
        debug!("`{}` exited: {:?}", program, kind);
        Ok(RunExit { kind, stderr })
    }
}

fn exit_kind_of(status: ExitStatus) -> ExitKind {
    if status.success() {
        ExitKind::Success
    } else {
        ExitKind::Failed {
            code: status.code(),
        }
    }
}

async fn pump_then_wait(
    child: &mut Child,
    stdout: Option<ChildStdout>,
    chunk_tx: UnboundedSender<Vec<u8>>,
    program: &str,
) -> std::io::Result<ExitStatus> {
    if let Some(mut stdout) = stdout {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let mut receiver_gone = false;
        loop {
            let read = stdout.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            // Keep draining even without a receiver, a full pipe would stall the process
            if !receiver_gone && chunk_tx.send(buf[..read].to_vec()).is_err() {
                warn!(
                    "Nobody is listening to `{}` anymore, discarding the rest of its output",
                    program
                );
                receiver_gone = true;
            }
        }
        trace!("Done reading from `{}` stdout", program);
    }
    drop(chunk_tx);
    child.wait().await
}

async fn watch_stderr(stderr: Option<ChildStderr>, program: String) -> String {
    let mut collected = String::new();
    let Some(stderr) = stderr else {
        return collected;
    };
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                if looks_fatal(&text) {
                    warn!("{}: {}", program, text.trim_end());
                } else {
                    trace!("{}: {}", program, text.trim_end());
                }
                if collected.len() + text.len() <= MAX_STDERR_BYTES {
                    collected.push_str(&text);
                }
            }
            Err(e) => {
                warn!("Failed to read stderr of `{}`: {}", program, e);
                break;
            }
        }
    }
    collected
}

/// Resolution failures and the like, which are worth seeing without trace logging.
fn looks_fatal(line: &str) -> bool {
    const MARKERS: [&str; 4] = [
        "unknown host",
        "not known",
        "cannot resolve",
        "could not find host",
    ];
    let line = line.to_ascii_lowercase();
    MARKERS.iter().any(|marker| line.contains(marker))
}
