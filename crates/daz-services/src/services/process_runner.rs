//! Process runner for DAZ Studio scripts
//!
//! Launches the DAZ Studio executable in script mode, enforces the per-call
//! wall-clock timeout and classifies the outcome into a [`ProcessResult`].
//! This is the only place in the server where a timeout is applied: every
//! `tools/call` is bounded by it.

use async_trait::async_trait;
use daz_config::DazConfig;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long to keep reading the pipes after the process is gone
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

/// Windows: launch without a console window
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Overall classification of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Ok,
    Error,
}

/// Why a run ended without an exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The call timeout expired and the process was killed
    Timeout,
    /// The executable could not be started
    LaunchFailed,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProcessOutcome {
    /// The process exited; `-1` when it was terminated by a signal
    Exited { returncode: i32 },
    Aborted {
        reason: AbortReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_s: Option<u64>,
    },
}

/// Fully populated result of one script run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessResult {
    pub status: ProcessStatus,
    #[serde(flatten)]
    pub outcome: ProcessOutcome,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProcessResult {
    /// Build a result; `status` is `Ok` iff the process exited with code 0
    pub fn new(
        outcome: ProcessOutcome,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        let status = match outcome {
            ProcessOutcome::Exited { returncode: 0 } => ProcessStatus::Ok,
            _ => ProcessStatus::Error,
        };
        Self {
            status,
            outcome,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_ms,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ProcessStatus::Ok
    }

    pub fn returncode(&self) -> Option<i32> {
        match self.outcome {
            ProcessOutcome::Exited { returncode } => Some(returncode),
            ProcessOutcome::Aborted { .. } => None,
        }
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self.outcome {
            ProcessOutcome::Exited { .. } => None,
            ProcessOutcome::Aborted { reason, .. } => Some(reason),
        }
    }
}

/// Runs a named script with positional arguments
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run `script` (resolved under the script root) with `args` in order
    async fn run(&self, script: &str, args: &[String]) -> ProcessResult;
}

/// Settings for [`ProcessRunner`], resolved from configuration at startup
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// DAZ Studio executable
    pub executable: PathBuf,
    /// Directory the script identifiers are resolved against
    pub script_root: PathBuf,
    /// Wall-clock limit per run
    pub call_timeout: Duration,
}

impl RunnerSettings {
    pub fn from_config(config: &DazConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            script_root: config.script_root.clone(),
            call_timeout: config.call_timeout(),
        }
    }
}

/// [`ScriptRunner`] backed by the real DAZ Studio executable
///
/// Command line: `<executable> -noPrompt -script <script_root/script> [-scriptArg <value>]*`
pub struct ProcessRunner {
    settings: RunnerSettings,
}

impl ProcessRunner {
    pub fn new(settings: RunnerSettings) -> Self {
        Self { settings }
    }

    /// Full path of a script; existence is not checked
    pub fn script_path(&self, script: &str) -> PathBuf {
        self.settings.script_root.join(script)
    }

    /// Argument vector passed to the executable
    pub fn command_args(&self, script: &str, args: &[String]) -> Vec<String> {
        let mut argv = vec![
            "-noPrompt".to_string(),
            "-script".to_string(),
            self.script_path(script).to_string_lossy().into_owned(),
        ];
        for arg in args {
            argv.push("-scriptArg".to_string());
            argv.push(arg.clone());
        }
        argv
    }

    fn build_command(&self, argv: &[String]) -> Command {
        let mut cmd = Command::new(&self.settings.executable);
        cmd.args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down helpers the script starts
        #[cfg(unix)]
        cmd.process_group(0);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd
    }
}

#[async_trait]
impl ScriptRunner for ProcessRunner {
    async fn run(&self, script: &str, args: &[String]) -> ProcessResult {
        let start = Instant::now();
        let argv = self.command_args(script, args);

        debug!(
            executable = %self.settings.executable.display(),
            script = %script,
            argv = ?argv,
            "Launching DAZ script"
        );

        let mut child = match self.build_command(&argv).spawn() {
            Ok(child) => child,
            Err(e) => {
                let result = ProcessResult::new(
                    ProcessOutcome::Aborted {
                        reason: AbortReason::LaunchFailed,
                        timeout_s: None,
                    },
                    "",
                    format!(
                        "failed to launch {}: {}",
                        self.settings.executable.display(),
                        e
                    ),
                    elapsed_ms(start),
                );
                error!(
                    script = %script,
                    error = %e,
                    duration_ms = result.duration_ms,
                    "DAZ script failed to launch"
                );
                return result;
            }
        };

        let stdout = PipeCapture::spawn(child.stdout.take());
        let stderr = PipeCapture::spawn(child.stderr.take());

        let waited = tokio::time::timeout(self.settings.call_timeout, child.wait()).await;
        let outcome = match waited {
            Ok(Ok(status)) => ProcessOutcome::Exited {
                returncode: status.code().unwrap_or(-1),
            },
            Ok(Err(e)) => {
                warn!(script = %script, error = %e, "Failed to wait for DAZ script");
                ProcessOutcome::Exited { returncode: -1 }
            }
            Err(_) => {
                kill_process_tree(&mut child, script).await;
                ProcessOutcome::Aborted {
                    reason: AbortReason::Timeout,
                    timeout_s: Some(self.settings.call_timeout.as_secs()),
                }
            }
        };

        let (stdout, stderr) = collect_output(stdout, stderr).await;
        let result = ProcessResult::new(outcome, stdout, stderr, elapsed_ms(start));

        if result.is_ok() {
            info!(
                script = %script,
                returncode = 0,
                duration_ms = result.duration_ms,
                "DAZ script finished"
            );
        } else {
            error!(
                script = %script,
                returncode = ?result.returncode(),
                reason = ?result.abort_reason(),
                duration_ms = result.duration_ms,
                "DAZ script failed"
            );
        }

        result
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Kill the child and, on Unix, every process in its group
async fn kill_process_tree(child: &mut Child, script: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(script = %script, error = %e, "Failed to kill DAZ script process group");
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!(script = %script, error = %e, "Failed to kill timed out DAZ script");
    }
}

/// Background reader for one child pipe
///
/// Bytes land in a buffer shared with the caller, so whatever was read is
/// still there when the reader has to be abandoned.
struct PipeCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let reader = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        debug!(error = %e, "Stopped reading process output");
                        break;
                    }
                }
            }
        });
        Self { buffer, reader }
    }

    async fn into_text(self) -> String {
        self.reader.abort();
        let bytes = std::mem::take(&mut *self.buffer.lock().await);
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

/// Wait for both pipes under one [`OUTPUT_GRACE`] deadline
///
/// A pipe can outlive the process when a grandchild inherited it; the
/// output read up to the deadline is kept.
async fn collect_output(mut stdout: PipeCapture, mut stderr: PipeCapture) -> (String, String) {
    let drained = tokio::time::timeout(OUTPUT_GRACE, async {
        let _ = tokio::join!(&mut stdout.reader, &mut stderr.reader);
    })
    .await;

    if drained.is_err() {
        warn!("Process output still open after exit, keeping what was read");
    }

    (stdout.into_text().await, stderr.into_text().await)
}
