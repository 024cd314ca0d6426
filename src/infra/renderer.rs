//! The external renderer, modeled as a capability behind a process boundary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

const SOURCE: &str = "infra::renderer";

/// Environment bindings that form the entire interface surface with the
/// renderer: it reads `input_*.png` from `INPUT_DIR` and must deposit exactly
/// one playable video into `OUTPUT_DIR` before exiting zero. No argv payload,
/// stdin, or stdout-as-data is part of the contract.
const INPUT_DIR_ENV: &str = "INPUT_DIR";
const OUTPUT_DIR_ENV: &str = "OUTPUT_DIR";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to spawn renderer: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("renderer exited with status {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("renderer exceeded the {0:?} timeout")]
    Timeout(Duration),
    #[error("renderer console output exceeded the {cap} byte capture limit")]
    OutputTooLarge { cap: usize },
    #[error("io error while supervising renderer: {0}")]
    Io(#[source] std::io::Error),
}

/// Capability seam for the rendering collaborator. The production
/// implementation is a subprocess; substituting an in-process renderer would
/// not change the orchestrator.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn invoke(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        deadline: Duration,
    ) -> Result<(), RenderError>;
}

/// Launches the configured external command once per job. A render failure is
/// terminal for the job; no retries happen at this layer or above.
#[derive(Debug, Clone)]
pub struct SubprocessRenderer {
    command: PathBuf,
    max_capture_bytes: usize,
}

impl SubprocessRenderer {
    pub fn new(command: PathBuf, max_capture_bytes: usize) -> Self {
        Self {
            command,
            max_capture_bytes,
        }
    }
}

#[async_trait]
impl Renderer for SubprocessRenderer {
    async fn invoke(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        deadline: Duration,
    ) -> Result<(), RenderError> {
        let started_at = Instant::now();

        // kill_on_drop covers caller-side cancellation: dropping the invoke
        // future must not leave an orphaned renderer holding the scratch
        // directories open. The child leads its own process group so the
        // explicit kill paths can reach anything it forks.
        let mut command = Command::new(&self.command);
        command
            .env(INPUT_DIR_ENV, input_dir)
            .env(OUTPUT_DIR_ENV, output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(RenderError::Spawn)?;

        match timeout(deadline, supervise(&mut child, self.max_capture_bytes)).await {
            Ok(Ok((status, _))) if status.success() => {
                debug!(
                    target = SOURCE,
                    command = %self.command.display(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "renderer completed"
                );
                Ok(())
            }
            Ok(Ok((status, stderr))) => {
                let exit_code = status.code();
                warn!(
                    target = SOURCE,
                    command = %self.command.display(),
                    exit_code = exit_code.map(i64::from).unwrap_or(-1),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    stderr = %stderr,
                    "renderer invocation failed"
                );
                Err(RenderError::Failed { exit_code, stderr })
            }
            Ok(Err(err)) => {
                kill(&mut child).await;
                Err(err)
            }
            Err(_elapsed) => {
                warn!(
                    target = SOURCE,
                    command = %self.command.display(),
                    timeout_ms = deadline.as_millis() as u64,
                    "renderer timed out; killing"
                );
                kill(&mut child).await;
                Err(RenderError::Timeout(deadline))
            }
        }
    }
}

/// Drain both console streams under the capture cap, then reap the child.
/// stdout is captured only to bound a runaway renderer; stderr is kept for
/// failure diagnostics.
async fn supervise(
    child: &mut Child,
    cap: usize,
) -> Result<(std::process::ExitStatus, String), RenderError> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (_stdout, stderr) = tokio::try_join!(read_capped(stdout, cap), read_capped(stderr, cap))?;
    let status = child.wait().await.map_err(RenderError::Io)?;

    Ok((status, String::from_utf8_lossy(&stderr).into_owned()))
}

async fn read_capped<R>(reader: Option<R>, cap: usize) -> Result<Vec<u8>, RenderError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buffer = Vec::new();
    let mut limited = reader.take(cap as u64 + 1);
    limited
        .read_to_end(&mut buffer)
        .await
        .map_err(RenderError::Io)?;

    if buffer.len() > cap {
        return Err(RenderError::OutputTooLarge { cap });
    }
    Ok(buffer)
}

/// Forcibly terminate the renderer and every process it spawned. The group
/// signal reaches forked descendants that a direct child kill would orphan,
/// still holding the scratch directories open.
async fn kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: signalling the process group created for this child at
        // spawn; the negative pid addresses the whole group.
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
    if let Err(err) = child.kill().await {
        warn!(target = SOURCE, error = %err, "failed to kill renderer");
    }
}
