//! Rule-driven check/action supervisor for a single host.

#![warn(unused_crate_dependencies)]
// These dependencies are only used in the binaries (src/bin/)
// Test dependencies are only used in test code
#[cfg(test)]
use assert_cmd as _;
use ctrlc as _;
#[cfg(test)]
use predicates as _;
use strum as _;
use tracing_subscriber as _;

/// CLI parsing.
pub mod cli;

/// Rule config loading.
pub mod config;

/// Daemon stop controller and status report.
pub mod control;

/// Daemon scheduling loop.
pub mod daemon;

/// Errors.
pub mod error;

/// Leader lease protocol.
pub mod leader;

/// Check/action log sink.
pub mod logs;

/// Config and state paths.
pub mod paths;

/// Rule evaluation.
pub mod policy;

/// Command execution.
pub mod spawn;

/// Runtime state persistence.
pub mod state;

/// OS clock and process capabilities.
pub mod system;
