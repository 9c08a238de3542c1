//! Command-line interface for kicker.
use clap::{ArgGroup, Parser, Subcommand};

use crate::logs::LogFormat;

/// Command-line interface for kicker.
#[derive(Parser)]
#[command(name = "kicker", version, author)]
#[command(about = "A rule-driven check/action supervisor", long_about = None)]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for kicker.
#[derive(Subcommand)]
pub enum Commands {
    /// Add a rule pairing a check command with an action command.
    #[command(group(ArgGroup::new("trigger").required(true)))]
    Add {
        /// Action command to run when the trigger fires.
        action: String,

        /// Run the action when CHECK exits zero.
        #[arg(
            long = "if",
            value_name = "CHECK",
            visible_aliases = ["if-pass", "if-zero"],
            group = "trigger"
        )]
        if_zero: Option<String>,

        /// Run the action when CHECK exits nonzero.
        #[arg(
            long = "if-fail",
            value_name = "CHECK",
            visible_alias = "if-nonzero",
            group = "trigger"
        )]
        if_nonzero: Option<String>,

        /// Run the action when CHECK goes from nonzero to zero.
        #[arg(long = "if-fail-to-pass", value_name = "CHECK", group = "trigger")]
        if_fail_to_pass: Option<String>,

        /// Run the action when CHECK goes from zero to nonzero.
        #[arg(long = "if-pass-to-fail", value_name = "CHECK", group = "trigger")]
        if_pass_to_fail: Option<String>,

        /// Run the action when the check exits with CODE (needs --check).
        #[arg(long = "if-code", value_name = "CODE", group = "trigger")]
        if_code: Option<i32>,

        /// Check command evaluated for --if-code.
        #[arg(long, value_name = "CHECK")]
        check: Option<String>,

        /// Remove the rule after its first executed action.
        #[arg(long)]
        once: bool,

        /// Per-rule poll interval in seconds.
        #[arg(long, value_name = "SECONDS")]
        interval: Option<f64>,

        /// Rate limit as COUNT/SECONDS (e.g. 1/300).
        #[arg(long, value_name = "COUNT/SECONDS")]
        rate_limit: Option<String>,

        /// Per-rule command timeout in seconds.
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<f64>,
    },

    /// List configured rules.
    List,

    /// Remove a rule by id.
    Remove {
        /// Id of the rule to remove.
        id: u32,
    },

    /// Show per-rule action execution counters.
    Stats,

    /// Manage the kickerd daemon.
    Daemon {
        /// The daemon command to execute.
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

/// Daemon subcommands.
#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Run the daemon loop in the foreground.
    Run {
        /// Log format for daemon check/action logs.
        #[arg(long, value_enum, default_value_t = LogFormat::PlainText)]
        log_format: LogFormat,

        /// Override global default polling interval in seconds.
        #[arg(long, value_name = "SECONDS")]
        poll_interval: Option<f64>,

        /// Leader lease duration in seconds.
        #[arg(long, value_name = "SECONDS")]
        lease_seconds: Option<f64>,

        /// Grace period after lease expiry before takeover is allowed.
        #[arg(long, value_name = "SECONDS", default_value_t = 10.0)]
        lease_grace_seconds: f64,

        /// Suppress the success message on exit.
        #[arg(long)]
        quiet: bool,

        /// Print one status line per scheduler event.
        #[arg(long)]
        verbose: bool,
    },

    /// Report whether a local daemon is alive.
    Status,

    /// Stop the active daemon for this user's state directory.
    Stop {
        /// Escalate to SIGKILL if the daemon does not stop after SIGTERM.
        #[arg(long)]
        force: bool,

        /// Return success when no daemon is running.
        #[arg(long)]
        quiet: bool,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
