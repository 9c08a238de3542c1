//! Per-rule runtime state and its on-disk store.
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::KickerError, paths};

/// Retention window for the observability timestamp list.
pub const DAY_SECONDS: f64 = 86_400.0;

/// Mutable bookkeeping for a single rule, persisted across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleRuntimeState {
    /// Exit code of the most recent check, `None` until the first completes.
    pub last_check_exit: Option<i32>,
    /// Wall-clock time of the most recent check.
    pub last_check_at: Option<f64>,
    /// Action fire times inside the rule's rate-limit window.
    pub action_timestamps: Vec<f64>,
    /// Action fire times over the last 24 hours.
    pub action_timestamps_24h: Vec<f64>,
    /// Total number of actions ever executed for this rule.
    pub action_executions: u64,
}

impl RuleRuntimeState {
    /// Drops rate-limit timestamps that have left the window.
    pub fn prune_rate_window(&mut self, now: f64, window_seconds: f64) {
        self.action_timestamps
            .retain(|stamp| now - stamp < window_seconds);
    }

    /// Records one executed action at `now`.
    pub fn record_action(&mut self, now: f64) {
        self.action_timestamps.push(now);
        self.action_timestamps_24h.push(now);
        self.action_timestamps_24h
            .retain(|stamp| *stamp >= now - DAY_SECONDS);
        self.action_executions += 1;
    }

    /// Counts actions executed within the last 24 hours.
    pub fn executions_last_24h(&self, now: f64) -> usize {
        self.action_timestamps_24h
            .iter()
            .filter(|stamp| **stamp >= now - DAY_SECONDS)
            .count()
    }
}

/// Daemon-wide runtime state: per-rule bookkeeping plus log-trim cooldowns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeState {
    /// Per-rule state keyed by rule id.
    pub rules: BTreeMap<u32, RuleRuntimeState>,
    /// Last trim time per log key, used to rate-limit truncation.
    pub log_trim_last_at: BTreeMap<String, f64>,
}

impl RuntimeState {
    /// Returns the state for a rule, creating an empty entry if needed.
    pub fn rule_mut(&mut self, rule_id: u32) -> &mut RuleRuntimeState {
        self.rules.entry(rule_id).or_default()
    }
}

/// Loads and persists [`RuntimeState`].
pub struct RuntimeStateStore {
    path: PathBuf,
}

impl RuntimeStateStore {
    /// Creates a store over an explicit file path.
    pub fn new(path: PathBuf) -> Self {
        RuntimeStateStore { path }
    }

    /// Creates a store over `~/.local/state/kicker/runtime_state.json`.
    pub fn default_location() -> Self {
        RuntimeStateStore::new(paths::runtime_state_file())
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state, returning an empty one when the file is absent or
    /// blank.
    pub fn load(&self) -> Result<RuntimeState, KickerError> {
        if !self.path.exists() {
            return Ok(RuntimeState::default());
        }
        let raw = fs::read_to_string(&self.path).map_err(KickerError::StateRead)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(RuntimeState::default());
        }
        serde_json::from_str(trimmed).map_err(KickerError::StateParse)
    }

    /// Writes the state as pretty JSON with a trailing newline.
    pub fn save(&self, state: &RuntimeState) -> Result<(), KickerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(KickerError::StateWrite)?;
        }
        let payload = serde_json::to_string_pretty(state)
            .map_err(|err| KickerError::StateWrite(std::io::Error::other(err)))?;
        fs::write(&self.path, payload + "\n").map_err(KickerError::StateWrite)
    }
}
