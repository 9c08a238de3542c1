//! File-based leader lease: at most one daemon per state directory.
//!
//! Mutual exclusion rests on an atomically created `leader.lock` directory
//! next to the `leader.json` metadata. A lease left past its expiry plus the
//! grace period, or metadata that cannot be parsed, counts as stale and may
//! be taken over.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::KickerError,
    system::{Clock, ProcessControl},
};

/// Metadata describing the process that believes itself to be leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderInfo {
    /// Host the daemon runs on.
    pub hostname: String,
    /// The daemon's process id.
    pub pid: i32,
    /// When the daemon claimed leadership.
    pub start_time: Option<f64>,
    /// When the current lease runs out.
    pub lease_expires_at: Option<f64>,
}

/// Result of a leadership claim attempt.
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    /// Whether this process now holds the lease.
    pub claimed: bool,
    /// Operator-facing description of what happened.
    pub message: String,
}

impl ClaimOutcome {
    fn rejected(message: impl Into<String>) -> Self {
        ClaimOutcome {
            claimed: false,
            message: message.into(),
        }
    }
}

/// Returns the leader metadata path inside a state directory.
pub fn leader_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join("leader.json")
}

/// Returns the mutual-exclusion marker path inside a state directory.
pub fn lock_marker_path(state_dir: &Path) -> PathBuf {
    state_dir.join("leader.lock")
}

/// Reads the leader metadata, if present.
pub fn load_leader_info(state_dir: &Path) -> Result<Option<LeaderInfo>, KickerError> {
    let path = leader_file_path(state_dir);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)
        .map_err(|err| KickerError::LeaderMetadata(err.to_string()))?;
    let info = serde_json::from_str(&raw)
        .map_err(|err| KickerError::LeaderMetadata(err.to_string()))?;
    Ok(Some(info))
}

/// Writes the leader metadata as pretty JSON with a trailing newline.
pub fn write_leader_info(state_dir: &Path, leader: &LeaderInfo) -> io::Result<()> {
    fs::create_dir_all(state_dir)?;
    let payload = serde_json::to_string_pretty(leader).map_err(io::Error::other)?;
    fs::write(leader_file_path(state_dir), payload + "\n")
}

fn try_create_marker(marker: &Path) -> bool {
    fs::create_dir(marker).is_ok()
}

/// Attempts to claim leadership of the state directory. A live lease rejects
/// the claim; a stale one is cleared and retaken.
pub fn claim_leader(
    state_dir: &Path,
    lease_seconds: f64,
    grace_seconds: f64,
    process: &dyn ProcessControl,
    clock: &dyn Clock,
) -> ClaimOutcome {
    if lease_seconds <= 0.0 {
        return ClaimOutcome::rejected("lease_seconds must be > 0");
    }
    if grace_seconds < 0.0 {
        return ClaimOutcome::rejected("grace_seconds must be >= 0");
    }
    if let Err(err) = fs::create_dir_all(state_dir) {
        return ClaimOutcome::rejected(format!("Failed to create state directory: {err}"));
    }

    let marker = lock_marker_path(state_dir);
    let leader_file = leader_file_path(state_dir);
    let now = clock.now();

    if !try_create_marker(&marker) {
        let mut stale = false;
        let current = match load_leader_info(state_dir) {
            Ok(info) => info,
            Err(_) => {
                stale = true;
                None
            }
        };

        if let Some(info) = &current {
            match info.lease_expires_at {
                None => stale = true,
                Some(expires) if expires + grace_seconds <= now => stale = true,
                Some(_) => {}
            }
        }

        if !stale {
            return ClaimOutcome::rejected("Daemon already active.");
        }

        let _ = fs::remove_file(&leader_file);
        let _ = fs::remove_dir(&marker);
        if !try_create_marker(&marker) {
            return ClaimOutcome::rejected("Could not claim daemon leader lock.");
        }
    }

    let leader = LeaderInfo {
        hostname: process.hostname(),
        pid: process.pid(),
        start_time: Some(now),
        lease_expires_at: Some(now + lease_seconds),
    };
    if let Err(err) = write_leader_info(state_dir, &leader) {
        let _ = fs::remove_dir(&marker);
        return ClaimOutcome::rejected(format!("Failed to write leader metadata: {err}"));
    }

    ClaimOutcome {
        claimed: true,
        message: format!("Claimed daemon leadership as pid {}.", leader.pid),
    }
}

/// Extends the lease. Refuses when the metadata is missing or names a
/// different owner, so a stale file cannot convince a non-owner to refresh.
pub fn refresh_lease(
    state_dir: &Path,
    lease_seconds: f64,
    process: &dyn ProcessControl,
    clock: &dyn Clock,
) -> Result<(), KickerError> {
    let now = clock.now();
    let mut existing = load_leader_info(state_dir)?.ok_or(KickerError::LeaderMissing)?;

    if existing.pid != process.pid() || existing.hostname != process.hostname() {
        return Err(KickerError::NotLeaseOwner);
    }

    existing.lease_expires_at = Some(now + lease_seconds);
    if existing.start_time.is_none() {
        existing.start_time = Some(now);
    }
    write_leader_info(state_dir, &existing)
        .map_err(|err| KickerError::LeaderMetadata(err.to_string()))
}

/// Best-effort removal of the metadata and the marker. Never fails; calling
/// it twice is a no-op.
pub fn release_leader(state_dir: &Path) {
    let _ = fs::remove_file(leader_file_path(state_dir));
    let _ = fs::remove_dir(lock_marker_path(state_dir));
}
