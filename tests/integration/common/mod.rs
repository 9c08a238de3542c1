#![allow(dead_code)]

use std::{
    collections::HashSet,
    env,
    ffi::OsString,
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use nix::{errno::Errno, sys::signal::Signal};

use kicker::system::{Clock, ProcessControl};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Serializes tests that mutate process-wide environment variables.
pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct HomeEnvGuard {
    previous: Option<OsString>,
    _lock: MutexGuard<'static, ()>,
}

impl HomeEnvGuard {
    pub fn set(home: &Path) -> Self {
        let lock = env_lock();
        let previous = env::var_os("HOME");
        unsafe {
            env::set_var("HOME", home);
        }
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for HomeEnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => unsafe {
                env::set_var("HOME", value);
            },
            None => unsafe {
                env::remove_var("HOME");
            },
        }
    }
}

/// Writes an executable shell script.
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, format!("#!/usr/bin/env bash\nset -eu\n{body}\n"))
        .expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

/// Deterministic clock whose `sleep` just advances `now`.
#[derive(Clone, Default)]
pub struct FakeClock {
    now: Arc<Mutex<f64>>,
}

impl FakeClock {
    pub fn new(start: f64) -> Self {
        FakeClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, seconds: f64) {
        *self.now.lock().expect("clock lock") += seconds;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> f64 {
        *self.now.lock().expect("clock lock")
    }

    fn sleep(&self, seconds: f64) {
        self.advance(seconds);
    }
}

/// Fake process table with a configurable identity, a set of live pids, a
/// record of delivered signals, and a set of signals that mark the target
/// dead when delivered.
#[derive(Clone)]
pub struct FakeProcess {
    hostname: String,
    pid: i32,
    alive: Arc<Mutex<HashSet<i32>>>,
    sent: Arc<Mutex<Vec<Signal>>>,
    lethal: Arc<HashSet<Signal>>,
}

impl FakeProcess {
    pub fn new(hostname: &str, pid: i32) -> Self {
        FakeProcess {
            hostname: hostname.to_string(),
            pid,
            alive: Arc::new(Mutex::new(HashSet::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            lethal: Arc::new(HashSet::new()),
        }
    }

    pub fn with_alive(self, pids: &[i32]) -> Self {
        *self.alive.lock().expect("alive lock") = pids.iter().copied().collect();
        self
    }

    pub fn with_lethal_signals(mut self, signals: &[Signal]) -> Self {
        self.lethal = Arc::new(signals.iter().copied().collect());
        self
    }

    pub fn sent_signals(&self) -> Vec<Signal> {
        self.sent.lock().expect("sent lock").clone()
    }
}

impl ProcessControl for FakeProcess {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn pid(&self) -> i32 {
        self.pid
    }

    fn signal(&self, pid: i32, signal: Option<Signal>) -> Result<(), Errno> {
        let mut alive = self.alive.lock().expect("alive lock");
        match signal {
            None => {
                if alive.contains(&pid) {
                    Ok(())
                } else {
                    Err(Errno::ESRCH)
                }
            }
            Some(signal) => {
                if !alive.contains(&pid) {
                    return Err(Errno::ESRCH);
                }
                self.sent.lock().expect("sent lock").push(signal);
                if self.lethal.contains(&signal) {
                    alive.remove(&pid);
                }
                Ok(())
            }
        }
    }
}
