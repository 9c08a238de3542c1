//! Error handling for kicker.
use thiserror::Error;

/// Defines all possible errors that can occur in the supervisor.
#[derive(Debug, Error)]
pub enum KickerError {
    /// Error reading the rule configuration file.
    #[error("Failed to read config file: {0}")]
    ConfigRead(#[source] std::io::Error),

    /// Error writing the rule configuration file.
    #[error("Failed to write config file: {0}")]
    ConfigWrite(#[source] std::io::Error),

    /// Error parsing the rule configuration file.
    #[error("Config file must be valid JSON-compatible YAML: {0}")]
    ConfigParse(#[source] serde_json::Error),

    /// Structurally invalid configuration (bad version, duplicate ids, ...).
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A rule that violates its own invariants.
    #[error("Invalid rule: {0}")]
    RuleInvalid(String),

    /// A malformed command-line parameter.
    #[error("{0}")]
    Parameter(String),

    /// Error reading the runtime state file.
    #[error("Failed to read runtime state: {0}")]
    StateRead(#[source] std::io::Error),

    /// Error parsing the runtime state file.
    #[error("Runtime state file is corrupt: {0}")]
    StateParse(#[source] serde_json::Error),

    /// Error writing the runtime state file.
    #[error("Failed to write runtime state: {0}")]
    StateWrite(#[source] std::io::Error),

    /// Unreadable or malformed leader metadata.
    #[error("Invalid daemon metadata: {0}")]
    LeaderMetadata(String),

    /// Leader metadata disappeared while this process held the lease.
    #[error("Leader metadata missing while refreshing lease")]
    LeaderMissing,

    /// Leader metadata names a different owner than the current process.
    #[error("Cannot refresh lease: current process is not leader owner")]
    NotLeaseOwner,
}
