//! Shell command execution with output capture and a wall-clock timeout.
use std::{
    io::Read,
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use tracing::warn;

/// Exit code reported for commands that exceed their timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the shell itself cannot be launched or waited on.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Polling granularity while waiting for a child to exit.
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Captured result of one command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// The child's exit code (124 on timeout, 127 on spawn failure).
    pub return_code: i32,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
}

/// Substitutes a bare first token with `scripts_root/<token>` when such a
/// file exists. Tokens containing a path separator and commands that fail to
/// tokenize pass through unchanged.
pub fn resolve_command(command: &str, scripts_root: &Path) -> String {
    let Some(mut parts) = shlex::split(command) else {
        return command.to_string();
    };
    let Some(first) = parts.first() else {
        return command.to_string();
    };
    if first.contains('/') {
        return command.to_string();
    }

    let candidate = scripts_root.join(first);
    if !candidate.exists() {
        return command.to_string();
    }

    parts[0] = candidate.to_string_lossy().into_owned();
    shlex::try_join(parts.iter().map(String::as_str))
        .unwrap_or_else(|_| command.to_string())
}

/// Returns the basename of the command's first word, for log labelling.
/// Falls back to the raw command when tokenization fails.
pub fn script_name(command: &str) -> String {
    let Some(parts) = shlex::split(command) else {
        return command.to_string();
    };
    let Some(first) = parts.first() else {
        return command.to_string();
    };
    Path::new(first)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| first.clone())
}

/// Runs `command` through `sh -c` in `cwd`, capturing both streams. A child
/// still running at the deadline is killed and reported as exit 124 with a
/// timeout note appended to stderr.
pub fn run_command(command: &str, timeout_seconds: f64, cwd: &Path) -> CommandOutput {
    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            return CommandOutput {
                return_code: SPAWN_FAILURE_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("Failed to launch shell: {err}"),
            };
        }
    };

    let stdout_capture = child.stdout.take().map(capture_stream);
    let stderr_capture = child.stderr.take().map(capture_stream);

    let status = wait_with_deadline(&mut child, timeout_seconds);
    let stdout = join_capture(stdout_capture);
    let stderr = join_capture(stderr_capture);

    match status {
        WaitOutcome::Exited(status) => CommandOutput {
            return_code: exit_code(status),
            stdout,
            stderr,
        },
        WaitOutcome::TimedOut => CommandOutput {
            return_code: TIMEOUT_EXIT_CODE,
            stdout,
            stderr: format!("{stderr}\nCommand timed out after {timeout_seconds:.2}s."),
        },
        WaitOutcome::WaitFailed(err) => CommandOutput {
            return_code: SPAWN_FAILURE_EXIT_CODE,
            stdout,
            stderr: format!("{stderr}\nFailed to wait for command: {err}"),
        },
    }
}

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
    WaitFailed(std::io::Error),
}

fn wait_with_deadline(child: &mut Child, timeout_seconds: f64) -> WaitOutcome {
    let deadline =
        Instant::now() + Duration::from_secs_f64(timeout_seconds.max(0.0).min(86_400.0));
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return WaitOutcome::Exited(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    reap(child);
                    return WaitOutcome::TimedOut;
                }
                thread::sleep(WAIT_POLL);
            }
            Err(err) => {
                reap(child);
                return WaitOutcome::WaitFailed(err);
            }
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!("Failed to kill child {}: {err}", child.id());
    }
    let _ = child.wait();
}

fn capture_stream<R: Read + Send + 'static>(mut stream: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = stream.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn join_capture(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signo| 128 + signo))
        .unwrap_or(1)
}
