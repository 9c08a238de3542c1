//! OS clock and process capabilities, injectable for tests.
use std::{
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::{self, Pid},
};

/// Wall-clock time source. Timestamps are `f64` seconds since the Unix
/// epoch, matching the on-disk JSON representation.
pub trait Clock {
    /// Returns the current wall-clock time.
    fn now(&self) -> f64;

    /// Blocks for the given number of seconds.
    fn sleep(&self, seconds: f64);
}

/// OS-backed clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn sleep(&self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            thread::sleep(Duration::from_secs_f64(seconds));
        }
    }
}

/// Process identity and signal delivery.
pub trait ProcessControl {
    /// Returns the current hostname.
    fn hostname(&self) -> String;

    /// Returns the current process id.
    fn pid(&self) -> i32;

    /// Sends a signal to `pid`. Passing `None` probes liveness without
    /// delivering anything; `Errno::ESRCH` means the process is gone.
    fn signal(&self, pid: i32, signal: Option<Signal>) -> Result<(), Errno>;
}

/// OS-backed process control.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcess;

impl ProcessControl for SystemProcess {
    fn hostname(&self) -> String {
        unistd::gethostname()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string())
    }

    fn pid(&self) -> i32 {
        unistd::getpid().as_raw()
    }

    fn signal(&self, pid: i32, signal: Option<Signal>) -> Result<(), Errno> {
        signal::kill(Pid::from_raw(pid), signal)
    }
}
