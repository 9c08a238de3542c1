//! Home-relative locations for kicker's configuration and state.
use std::{env, path::PathBuf};

/// Returns the invoking user's home directory, falling back to `/`.
pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Returns the configuration directory (`~/.config/kicker`).
pub fn config_dir() -> PathBuf {
    home_dir().join(".config/kicker")
}

/// Returns the state directory (`~/.local/state/kicker`).
pub fn state_dir() -> PathBuf {
    home_dir().join(".local/state/kicker")
}

/// Returns the directory searched for bare script names.
pub fn scripts_dir() -> PathBuf {
    config_dir().join("scripts")
}

/// Returns the rule configuration file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

/// Returns the runtime state file path.
pub fn runtime_state_file() -> PathBuf {
    state_dir().join("runtime_state.json")
}

/// Returns the check log file path.
pub fn checks_log_file() -> PathBuf {
    state_dir().join("kicker_checks.log")
}

/// Returns the action log file path.
pub fn actions_log_file() -> PathBuf {
    state_dir().join("kicker_actions.log")
}
