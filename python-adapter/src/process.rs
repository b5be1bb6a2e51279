//! Subprocess execution and lifecycle management for screened scripts.

use crate::error::SandboxError;
use crate::types::{RunResult, SandboxConfig, SCRUBBED_SCRIPT_NAME};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio::time::timeout;

const GRACE_PERIOD: Duration = Duration::from_millis(250);

/// Collected output lines, total byte count, and whether truncation occurred.
type StreamOutput = (Vec<String>, usize, bool);

/// Result of collecting all subprocess output: stdout lines, stderr lines, and exit status.
type CollectedOutput = (Vec<String>, Vec<String>, std::process::ExitStatus);

/// Timeout-wrapped result of the full collection phase.
type TimedCollectionResult =
    Result<Result<CollectedOutput, SandboxError>, tokio::time::error::Elapsed>;

/// Screens `code`, writes it to a temporary script and runs it with
/// `interpreter` under the configured wall-clock limit.
///
/// The temporary script path is replaced by `tmp.py` in the captured output.
///
/// # Errors
/// Returns a [`SandboxError`] if the source violates the policy, the script
/// cannot be written or spawned, the process times out, or its output
/// exceeds the configured limit.
pub async fn run_script(
    interpreter: &Path,
    code: &str,
    config: &SandboxConfig,
) -> Result<RunResult, SandboxError> {
    crate::screen::screen_source(code, config)?;

    let script = write_script(code)?;
    let script_path = script.path().to_path_buf();
    let args = crate::cmd::build_args(&script_path);
    let start_time = Instant::now();

    let mut child = spawn_child(interpreter, &args)?;

    let stdout = child.stdout.take().ok_or(SandboxError::MissingHandle("stdout"))?;
    let stderr = child.stderr.take().ok_or(SandboxError::MissingHandle("stderr"))?;
    let pid = child.id().ok_or(SandboxError::MissingHandle("pid"))?;

    let limit = config.max_output_bytes;
    let mut tasks = JoinSet::new();
    tasks.spawn(async move { (0u8, drain_stream_bounded(stdout, limit).await) });
    tasks.spawn(async move { (1u8, drain_stream_bounded(stderr, limit).await) });

    let process_result = timeout(
        config.timeout,
        collect_output(&mut child, &mut tasks, limit),
    )
    .await;
    let duration = start_time.elapsed();

    let mut result = build_run_result(process_result, &mut child, pid, &mut tasks, duration).await?;
    let shown = script_path.to_string_lossy();
    result.stdout = result.stdout.replace(shown.as_ref(), SCRUBBED_SCRIPT_NAME);
    result.stderr = result.stderr.replace(shown.as_ref(), SCRUBBED_SCRIPT_NAME);

    tracing::debug!(
        event = "python_script_finished",
        exit_code = result.exit_code,
        duration_ms = result.duration_ms,
    );
    Ok(result)
}

fn write_script(code: &str) -> Result<tempfile::NamedTempFile, SandboxError> {
    let mut file = tempfile::Builder::new()
        .prefix("segex_")
        .suffix(".py")
        .tempfile()
        .map_err(SandboxError::ScriptFile)?;
    file.write_all(code.as_bytes())
        .and_then(|()| file.flush())
        .map_err(SandboxError::ScriptFile)?;
    Ok(file)
}

/// Spawns the interpreter with piped stdout/stderr and an empty environment.
fn spawn_child(
    interpreter: &Path,
    args: &[std::ffi::OsString],
) -> Result<tokio::process::Child, SandboxError> {
    let mut cmd = Command::new(interpreter);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .current_dir(std::env::temp_dir())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.env_clear();

    cmd.spawn().map_err(|e| SandboxError::SpawnFailed {
        stage: "spawn".to_string(),
        source: e,
    })
}

/// Collects stdout and stderr output from reader tasks and waits for the child.
async fn collect_output(
    child: &mut tokio::process::Child,
    tasks: &mut JoinSet<(u8, StreamOutput)>,
    limit: usize,
) -> Result<CollectedOutput, SandboxError> {
    let mut stdout_lines = Vec::new();
    let mut stderr_lines = Vec::new();

    while let Some(result) = tasks.join_next().await {
        let (which, (lines, bytes, truncated)) =
            result.map_err(|e| SandboxError::StreamFailed {
                stage: "join".to_string(),
                source: e,
            })?;

        if truncated {
            return Err(SandboxError::OutputTruncated {
                captured_bytes: bytes,
                limit_bytes: limit,
            });
        }

        if which == 0 {
            stdout_lines = lines;
        } else {
            stderr_lines = lines;
        }
    }

    let status = child.wait().await.map_err(|e| SandboxError::SpawnFailed {
        stage: "wait".to_string(),
        source: e,
    })?;

    Ok((stdout_lines, stderr_lines, status))
}

/// Converts the raw process outcome into a [`RunResult`] or an appropriate error.
async fn build_run_result(
    process_result: TimedCollectionResult,
    child: &mut tokio::process::Child,
    pid: u32,
    tasks: &mut JoinSet<(u8, StreamOutput)>,
    duration: Duration,
) -> Result<RunResult, SandboxError> {
    let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);

    match process_result {
        Ok(Ok((stdout_lines, stderr_lines, status))) => Ok(RunResult {
            stdout: stdout_lines.join("\n"),
            stderr: stderr_lines.join("\n"),
            exit_code: status.code().unwrap_or(-1),
            duration_ms,
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            if let Err(e) = graceful_shutdown(child, pid, tasks).await {
                tracing::warn!(event = "python_shutdown_failed", pid, error = %e);
            }
            Err(SandboxError::Timeout {
                elapsed: duration,
                pid,
            })
        }
    }
}

/// Drains a stream line by line, keeping at most `limit` bytes.
async fn drain_stream_bounded(
    stream: impl tokio::io::AsyncRead + Unpin,
    limit: usize,
) -> StreamOutput {
    let mut reader = BufReader::new(stream).lines();
    let mut lines = Vec::new();
    let mut total_bytes = 0usize;
    let mut truncated = false;

    while let Ok(Some(line)) = reader.next_line().await {
        let line_bytes = line.len();
        if total_bytes + line_bytes <= limit {
            lines.push(line);
            total_bytes += line_bytes;
        } else {
            truncated = true;
        }
    }

    (lines, total_bytes, truncated)
}

/// `SIGTERM`, wait a short grace period, then `SIGKILL`.
#[cfg(unix)]
async fn graceful_shutdown(
    child: &mut tokio::process::Child,
    pid: u32,
    tasks: &mut JoinSet<(u8, StreamOutput)>,
) -> Result<(), SandboxError> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let raw_pid = i32::try_from(pid).map_err(|_| SandboxError::SignalFailed {
        signal: "SIGTERM".to_string(),
        pid,
        reason: "PID value exceeds i32::MAX".to_string(),
    })?;

    signal::kill(Pid::from_raw(raw_pid), Signal::SIGTERM).map_err(|e| {
        SandboxError::SignalFailed {
            signal: "SIGTERM".to_string(),
            pid,
            reason: e.to_string(),
        }
    })?;

    match timeout(GRACE_PERIOD, child.wait()).await {
        Ok(Ok(_status)) => {}
        Ok(Err(e)) => {
            return Err(SandboxError::SpawnFailed {
                stage: "graceful_shutdown wait".to_string(),
                source: e,
            });
        }
        Err(_) => {
            child.kill().await.map_err(|e| SandboxError::SpawnFailed {
                stage: "SIGKILL".to_string(),
                source: e,
            })?;
        }
    }

    tasks.abort_all();
    Ok(())
}

/// Windows: immediate termination.
#[cfg(windows)]
async fn graceful_shutdown(
    child: &mut tokio::process::Child,
    _pid: u32,
    tasks: &mut JoinSet<(u8, StreamOutput)>,
) -> Result<(), SandboxError> {
    child.kill().await.map_err(|e| SandboxError::SpawnFailed {
        stage: "TerminateProcess".to_string(),
        source: e,
    })?;
    tasks.abort_all();
    Ok(())
}
