//! Stop controller and status report for a running daemon.
use std::{fs, io, path::Path};

use nix::{errno::Errno, sys::signal::Signal};

use crate::{
    leader::{self, load_leader_info},
    system::{Clock, ProcessControl},
};

/// Options for [`stop_daemon`].
#[derive(Debug, Clone)]
pub struct StopOptions {
    /// Escalate to `SIGKILL` when `SIGTERM` is not enough.
    pub force: bool,
    /// Treat "no daemon running" as success.
    pub quiet: bool,
    /// How long to wait for the daemon to exit after `SIGTERM`.
    pub wait_seconds: f64,
    /// Liveness polling interval while waiting.
    pub poll_seconds: f64,
}

impl Default for StopOptions {
    fn default() -> Self {
        StopOptions {
            force: false,
            quiet: false,
            wait_seconds: 5.0,
            poll_seconds: 0.1,
        }
    }
}

/// Outcome of a control operation: a process exit code plus a message.
#[derive(Debug, Clone)]
pub struct ControlOutcome {
    /// Process exit code (0 on success, 1 on structured failures).
    pub exit_code: i32,
    /// Operator-facing message.
    pub message: String,
}

impl ControlOutcome {
    fn new(exit_code: i32, message: impl Into<String>) -> Self {
        ControlOutcome {
            exit_code,
            message: message.into(),
        }
    }
}

fn is_pid_alive(pid: i32, process: &dyn ProcessControl) -> bool {
    if pid <= 0 {
        return false;
    }
    match process.signal(pid, None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        // EPERM means the pid exists but belongs to someone else.
        Err(_) => true,
    }
}

fn try_signal(pid: i32, signal: Signal, process: &dyn ProcessControl) -> bool {
    process.signal(pid, Some(signal)).is_ok()
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Stops the daemon recorded in the state directory's leader metadata.
///
/// Sends `SIGTERM`, polls for the owner to disappear, and optionally
/// escalates to `SIGKILL`. Refuses to signal anything when the metadata is
/// corrupt, names another host, or carries a nonpositive pid; a dead owner
/// only gets its metadata cleared.
pub fn stop_daemon(
    state_dir: &Path,
    options: &StopOptions,
    process: &dyn ProcessControl,
    clock: &dyn Clock,
) -> ControlOutcome {
    let leader = match load_leader_info(state_dir) {
        Ok(leader) => leader,
        Err(err) => return ControlOutcome::new(1, err.to_string()),
    };

    let Some(leader) = leader else {
        let exit_code = if options.quiet { 0 } else { 1 };
        return ControlOutcome::new(exit_code, "No daemon is running.");
    };

    let current_host = process.hostname();
    if leader.hostname != current_host {
        return ControlOutcome::new(
            1,
            format!(
                "Active daemon is on host '{}', current host is '{}'.",
                leader.hostname, current_host
            ),
        );
    }

    if leader.pid <= 0 {
        return ControlOutcome::new(
            1,
            format!("Invalid daemon pid in metadata: {}", leader.pid),
        );
    }

    let leader_file = leader::leader_file_path(state_dir);
    if !is_pid_alive(leader.pid, process) {
        if let Err(err) = remove_file_if_exists(&leader_file) {
            return ControlOutcome::new(1, format!("Failed to clear stale metadata: {err}"));
        }
        let _ = fs::remove_dir(leader::lock_marker_path(state_dir));
        return ControlOutcome::new(0, "No daemon is running. Cleared stale metadata.");
    }

    try_signal(leader.pid, Signal::SIGTERM, process);

    let deadline = clock.now() + options.wait_seconds;
    while clock.now() < deadline {
        if !is_pid_alive(leader.pid, process) {
            break;
        }
        clock.sleep(options.poll_seconds);
    }

    let mut still_alive = is_pid_alive(leader.pid, process);
    if still_alive && options.force {
        try_signal(leader.pid, Signal::SIGKILL, process);
        // Give the OS a short chance to reap.
        let deadline = clock.now() + options.wait_seconds.min(1.0);
        while clock.now() < deadline && is_pid_alive(leader.pid, process) {
            clock.sleep(options.poll_seconds);
        }
        still_alive = is_pid_alive(leader.pid, process);
    }

    if still_alive {
        return ControlOutcome::new(
            1,
            format!(
                "Failed to stop daemon pid {}. Retry with --force.",
                leader.pid
            ),
        );
    }

    if let Err(err) = remove_file_if_exists(&leader_file) {
        return ControlOutcome::new(
            1,
            format!("Daemon stopped but failed to clear metadata: {err}"),
        );
    }
    let _ = fs::remove_dir(leader::lock_marker_path(state_dir));

    ControlOutcome::new(0, format!("Stopped daemon pid {}.", leader.pid))
}

/// Reports whether a daemon is recorded for this state directory and whether
/// it is local and alive. Exit code 0 only when both hold.
pub fn daemon_status(state_dir: &Path, process: &dyn ProcessControl) -> ControlOutcome {
    let leader = match load_leader_info(state_dir) {
        Ok(leader) => leader,
        Err(err) => return ControlOutcome::new(1, err.to_string()),
    };
    let Some(leader) = leader else {
        return ControlOutcome::new(1, "No daemon is running.");
    };

    let local = leader.hostname == process.hostname();
    let alive = local && is_pid_alive(leader.pid, process);

    let mut message = format!(
        "host={} pid={} local={} alive={}",
        leader.hostname, leader.pid, local, alive
    );
    if let Some(expires) = leader.lease_expires_at {
        message.push_str(&format!(" lease_expires_at={expires}"));
    }

    let exit_code = if local && alive { 0 } else { 1 };
    ControlOutcome::new(exit_code, message)
}
