//! Append-only check/action logs with size-bounded trimming.
//!
//! Every command invocation produces one record per output line plus a
//! terminal `return_code` record, in stdout, stderr, return-code order.
//! Consumers depend on that order.
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use serde_json::json;
use strum_macros::Display;
use tracing::warn;

use crate::state::RuntimeState;

/// Logs larger than this trigger a trim attempt before the next append.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Minimum spacing between trims of the same log file.
pub const TRIM_COOLDOWN_SECONDS: f64 = 3600.0;

/// Size a trimmed log is cut back to (byte-truncated from the tail).
pub const TRIM_TARGET_BYTES: usize = 8 * 1024 * 1024;

/// On-disk format of the check/action logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum LogFormat {
    /// One prefixed text line per output line plus a return-code line.
    PlainText,
    /// One JSON object per record.
    Json,
}

/// One command invocation to be logged.
#[derive(Debug, Clone, Copy)]
pub struct CommandRecord<'a> {
    /// Wall-clock time of the invocation.
    pub now: f64,
    /// Short script label (basename of the first command word).
    pub script: &'a str,
    /// The resolved command line.
    pub command: &'a str,
    /// Captured stdout.
    pub stdout: &'a str,
    /// Captured stderr.
    pub stderr: &'a str,
    /// The command's exit code.
    pub return_code: i32,
}

/// Writes check and action records to their two log files. Write and trim
/// failures are reported as warnings and never propagate.
pub struct CommandLogger {
    format: LogFormat,
    checks_log: PathBuf,
    actions_log: PathBuf,
}

impl CommandLogger {
    /// Creates a logger over the two sink files.
    pub fn new(format: LogFormat, checks_log: PathBuf, actions_log: PathBuf) -> Self {
        CommandLogger {
            format,
            checks_log,
            actions_log,
        }
    }

    /// Appends a check record.
    pub fn log_check(&self, record: &CommandRecord<'_>, state: &mut RuntimeState) {
        self.append(&self.checks_log, "checks", "check", record, state);
    }

    /// Appends an action record.
    pub fn log_action(&self, record: &CommandRecord<'_>, state: &mut RuntimeState) {
        self.append(&self.actions_log, "actions", "action", record, state);
    }

    fn append(
        &self,
        path: &Path,
        trim_key: &str,
        phase: &str,
        record: &CommandRecord<'_>,
        state: &mut RuntimeState,
    ) {
        if let Some(parent) = path.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            warn!("Failed to create log directory {:?}: {err}", parent);
            return;
        }
        trim_if_needed(path, trim_key, record.now, state);

        let payload = match self.format {
            LogFormat::PlainText => format_plain(phase, record),
            LogFormat::Json => format_json(phase, record),
        };

        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(payload.as_bytes()));
        if let Err(err) = appended {
            warn!("Failed to append to log {:?}: {err}", path);
        }
    }
}

fn iso_timestamp(ts: f64) -> String {
    let secs = ts.floor() as i64;
    let nanos = ((ts - secs as f64) * 1_000_000_000.0) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos.min(999_999_999))
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

fn format_plain(phase: &str, record: &CommandRecord<'_>) -> String {
    let prefix = format!("{} [{}] [{}]", iso_timestamp(record.now), record.script, phase);
    let mut lines = String::new();
    for line in record.stdout.lines().filter(|line| !line.is_empty()) {
        lines.push_str(&format!("{prefix} [stdout] {line}\n"));
    }
    for line in record.stderr.lines().filter(|line| !line.is_empty()) {
        lines.push_str(&format!("{prefix} [stderr] {line}\n"));
    }
    lines.push_str(&format!("{prefix} [return_code] {}\n", record.return_code));
    lines
}

fn format_json(phase: &str, record: &CommandRecord<'_>) -> String {
    let timestamp = iso_timestamp(record.now);
    let mut out = String::new();
    for line in record.stdout.lines() {
        let item = json!({
            "timestamp": timestamp,
            "script": record.script,
            "phase": phase,
            "stream": "stdout",
            "message": line,
            "command": record.command,
        });
        out.push_str(&item.to_string());
        out.push('\n');
    }
    for line in record.stderr.lines() {
        let item = json!({
            "timestamp": timestamp,
            "script": record.script,
            "phase": phase,
            "stream": "stderr",
            "message": line,
            "command": record.command,
        });
        out.push_str(&item.to_string());
        out.push('\n');
    }
    let terminal = json!({
        "timestamp": timestamp,
        "script": record.script,
        "phase": phase,
        "stream": "return_code",
        "value": record.return_code,
        "command": record.command,
    });
    out.push_str(&terminal.to_string());
    out.push('\n');
    out
}

fn trim_if_needed(path: &Path, trim_key: &str, now: f64, state: &mut RuntimeState) {
    let Ok(metadata) = fs::metadata(path) else {
        return;
    };
    if metadata.len() <= MAX_LOG_BYTES {
        return;
    }

    let last_trim = state.log_trim_last_at.get(trim_key).copied().unwrap_or(0.0);
    if now - last_trim < TRIM_COOLDOWN_SECONDS {
        return;
    }

    let content = match fs::read(path) {
        Ok(content) => content,
        Err(err) => {
            warn!("Failed to read log {:?} for trimming: {err}", path);
            return;
        }
    };
    let tail = if content.len() > TRIM_TARGET_BYTES {
        &content[content.len() - TRIM_TARGET_BYTES..]
    } else {
        &content[..]
    };
    if let Err(err) = fs::write(path, tail) {
        warn!("Failed to trim log {:?}: {err}", path);
        return;
    }
    state.log_trim_last_at.insert(trim_key.to_string(), now);
}
