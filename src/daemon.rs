//! The kicker daemon loop.
//!
//! One single-threaded scheduler polls every rule's check command on its own
//! cadence, feeds exit codes through the trigger state machine, and runs
//! actions under the rate gate. The loop holds the leader lease for its
//! state directory and releases it on the way out. Within a tick, due rules
//! execute in ascending id order; no two commands ever run concurrently.
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::warn;

use crate::{
    config::{ConfigStore, Rule},
    leader::{claim_leader, refresh_lease, release_leader},
    logs::{CommandLogger, CommandRecord, LogFormat},
    paths,
    policy::{effective_poll_interval, effective_rate_limit, effective_timeout, trigger_matches},
    spawn::{resolve_command, run_command, script_name},
    state::{RuntimeState, RuntimeStateStore},
    system::{Clock, ProcessControl, SystemClock, SystemProcess},
};

/// Shortest sleep between idle ticks.
const MIN_IDLE_SLEEP: f64 = 0.05;

/// Longest sleep between idle ticks; bounds stop-signal latency.
const MAX_IDLE_SLEEP: f64 = 0.5;

/// Everything the daemon needs to know before it starts.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    /// Format of the check/action logs.
    pub log_format: LogFormat,
    /// Override for the global default poll interval.
    pub poll_interval: Option<f64>,
    /// Override for the leader lease duration.
    pub lease_seconds: Option<f64>,
    /// Grace period past lease expiry before takeover is allowed.
    pub lease_grace_seconds: f64,
    /// Rule configuration file.
    pub config_path: PathBuf,
    /// State directory holding lease, runtime state, and logs.
    pub state_dir: PathBuf,
    /// Directory searched for bare script names.
    pub scripts_root: PathBuf,
    /// Working directory for check and action commands.
    pub command_cwd: PathBuf,
    /// Stop after this many rule executions (test hook).
    pub max_rule_executions: Option<u64>,
}

impl DaemonSettings {
    /// Settings over the user's standard kicker directories.
    pub fn new(log_format: LogFormat) -> Self {
        DaemonSettings {
            log_format,
            poll_interval: None,
            lease_seconds: None,
            lease_grace_seconds: 10.0,
            config_path: paths::config_file(),
            state_dir: paths::state_dir(),
            scripts_root: paths::scripts_dir(),
            command_cwd: paths::home_dir(),
            max_rule_executions: None,
        }
    }
}

/// Result of one daemon run: a process exit code plus a message.
#[derive(Debug, Clone)]
pub struct DaemonRunOutcome {
    /// Process exit code (0 after a clean stop).
    pub exit_code: i32,
    /// Operator-facing message.
    pub message: String,
}

impl DaemonRunOutcome {
    fn new(exit_code: i32, message: impl Into<String>) -> Self {
        DaemonRunOutcome {
            exit_code,
            message: message.into(),
        }
    }
}

type StatusFn = Box<dyn FnMut(&str)>;

/// The daemon scheduler. Construct with [`Daemon::new`], optionally swap the
/// OS seams for fakes, then call [`Daemon::run`].
pub struct Daemon {
    settings: DaemonSettings,
    clock: Box<dyn Clock>,
    process: Box<dyn ProcessControl>,
    stop: Arc<AtomicBool>,
    status: Option<StatusFn>,
}

impl Daemon {
    /// Creates a daemon over the OS clock and process primitives.
    pub fn new(settings: DaemonSettings) -> Self {
        Daemon {
            settings,
            clock: Box::new(SystemClock),
            process: Box::new(SystemProcess),
            stop: Arc::new(AtomicBool::new(false)),
            status: None,
        }
    }

    /// Replaces the wall clock (tests use a fake).
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the process identity/signal seam.
    pub fn with_process(mut self, process: Box<dyn ProcessControl>) -> Self {
        self.process = process;
        self
    }

    /// Installs a callback receiving one line per scheduler event.
    pub fn with_status_fn(mut self, status: impl FnMut(&str) + 'static) -> Self {
        self.status = Some(Box::new(status));
        self
    }

    /// Returns the cooperative stop flag. Setting it lets the current tick
    /// finish and then ends the loop.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn emit_status(&mut self, message: &str) {
        if let Some(status) = self.status.as_mut() {
            status(message);
        }
    }

    /// Claims leadership and runs the scheduling loop until the stop flag is
    /// set or leadership is lost. Always persists runtime state and releases
    /// the lease on the way out.
    pub fn run(mut self) -> DaemonRunOutcome {
        let config_store = ConfigStore::new(self.settings.config_path.clone());
        let config = match config_store.load() {
            Ok(config) => config,
            Err(err) => return DaemonRunOutcome::new(1, err.to_string()),
        };

        let default_poll = self
            .settings
            .poll_interval
            .unwrap_or(config.globals.default_poll_interval_seconds);
        if default_poll <= 0.0 {
            return DaemonRunOutcome::new(1, "default polling interval must be > 0");
        }

        let lease_seconds = self
            .settings
            .lease_seconds
            .unwrap_or_else(|| (default_poll * 2.0).max(30.0));

        let claim = claim_leader(
            &self.settings.state_dir,
            lease_seconds,
            self.settings.lease_grace_seconds,
            self.process.as_ref(),
            self.clock.as_ref(),
        );
        if !claim.claimed {
            return DaemonRunOutcome::new(1, claim.message);
        }

        let state_store =
            RuntimeStateStore::new(self.settings.state_dir.join("runtime_state.json"));
        let mut runtime_state = match state_store.load() {
            Ok(state) => state,
            Err(err) => {
                release_leader(&self.settings.state_dir);
                return DaemonRunOutcome::new(1, err.to_string());
            }
        };

        let mut rules: Vec<Rule> = config.rules.clone();
        rules.sort_by_key(|rule| rule.id);
        let mut next_due: BTreeMap<u32, f64> = rules
            .iter()
            .map(|rule| (rule.id, self.clock.now()))
            .collect();

        let logger = CommandLogger::new(
            self.settings.log_format,
            self.settings.state_dir.join("kicker_checks.log"),
            self.settings.state_dir.join("kicker_actions.log"),
        );

        self.emit_status(&format!(
            "Daemon starting: rules={} default_poll={}s lease={}s",
            rules.len(),
            default_poll,
            lease_seconds
        ));

        let mut executions: u64 = 0;
        let mut next_lease_refresh = self.clock.now() + (lease_seconds / 2.0).max(1.0);

        let outcome = loop {
            if self.stop.load(Ordering::SeqCst) {
                break DaemonRunOutcome::new(0, "Daemon stopped.");
            }

            let now = self.clock.now();
            if now >= next_lease_refresh {
                if let Err(err) = refresh_lease(
                    &self.settings.state_dir,
                    lease_seconds,
                    self.process.as_ref(),
                    self.clock.as_ref(),
                ) {
                    break DaemonRunOutcome::new(1, format!("Lost daemon leadership: {err}"));
                }
                next_lease_refresh = now + (lease_seconds / 2.0).max(1.0);
            }

            let due: Vec<u32> = rules
                .iter()
                .filter(|rule| next_due.get(&rule.id).copied().unwrap_or(now) <= now)
                .map(|rule| rule.id)
                .collect();

            if due.is_empty() {
                let wake = next_due
                    .values()
                    .copied()
                    .fold(f64::INFINITY, f64::min);
                let wake = if wake.is_finite() {
                    wake
                } else {
                    now + default_poll
                };
                self.clock
                    .sleep((wake - now).max(MIN_IDLE_SLEEP).min(MAX_IDLE_SLEEP));
                continue;
            }

            for rule_id in due {
                let Some(rule) = rules.iter().find(|rule| rule.id == rule_id).cloned()
                else {
                    continue;
                };

                let action_executed =
                    self.run_rule_once(&rule, &mut runtime_state, &logger, now, default_poll);
                next_due.insert(rule.id, now + effective_poll_interval(&rule, default_poll));

                if action_executed && rule.once {
                    if let Err(err) = config_store.remove_rule(rule.id) {
                        warn!("Failed to remove once rule #{} from config: {err}", rule.id);
                    }
                    rules.retain(|kept| kept.id != rule.id);
                    next_due.remove(&rule.id);
                    runtime_state.rules.remove(&rule.id);
                    self.emit_status(&format!("rule=#{} removed due to once=true", rule.id));
                }

                executions += 1;
                if let Some(cap) = self.settings.max_rule_executions
                    && executions >= cap
                {
                    self.stop.store(true, Ordering::SeqCst);
                    break;
                }
            }

            if let Err(err) = state_store.save(&runtime_state) {
                warn!("Failed to persist runtime state: {err}");
            }
        };

        if let Err(err) = state_store.save(&runtime_state) {
            warn!("Failed to persist runtime state at shutdown: {err}");
        }
        release_leader(&self.settings.state_dir);
        self.emit_status("Daemon exiting.");
        outcome
    }

    /// Executes one rule: check, trigger evaluation, rate gate, and (when
    /// both pass) the action. Returns whether the action ran.
    fn run_rule_once(
        &mut self,
        rule: &Rule,
        state: &mut RuntimeState,
        logger: &CommandLogger,
        now: f64,
        default_poll: f64,
    ) -> bool {
        let previous_rc = state.rule_mut(rule.id).last_check_exit;
        let timeout = effective_timeout(rule, default_poll);

        let check_command = resolve_command(&rule.check, &self.settings.scripts_root);
        let check = run_command(&check_command, timeout, &self.settings.command_cwd);
        let check_script = script_name(&check_command);
        logger.log_check(
            &CommandRecord {
                now,
                script: &check_script,
                command: &check_command,
                stdout: &check.stdout,
                stderr: &check.stderr,
                return_code: check.return_code,
            },
            state,
        );

        let current_rc = check.return_code;
        {
            let rule_state = state.rule_mut(rule.id);
            rule_state.last_check_exit = Some(current_rc);
            rule_state.last_check_at = Some(now);
        }

        if !trigger_matches(rule, previous_rc, current_rc) {
            self.emit_status(&format!(
                "rule=#{} check_rc={current_rc} trigger_matched=false rate_limited=false",
                rule.id
            ));
            return false;
        }

        let limit = effective_rate_limit(rule, default_poll);
        let rule_state = state.rule_mut(rule.id);
        rule_state.prune_rate_window(now, limit.window_seconds);
        if rule_state.action_timestamps.len() as u32 >= limit.count {
            self.emit_status(&format!(
                "rule=#{} check_rc={current_rc} trigger_matched=true rate_limited=true",
                rule.id
            ));
            return false;
        }
        self.emit_status(&format!(
            "rule=#{} check_rc={current_rc} trigger_matched=true rate_limited=false",
            rule.id
        ));

        let action_command = resolve_command(&rule.action, &self.settings.scripts_root);
        let action = run_command(&action_command, timeout, &self.settings.command_cwd);
        state.rule_mut(rule.id).record_action(now);
        let action_script = script_name(&action_command);
        logger.log_action(
            &CommandRecord {
                now,
                script: &action_script,
                command: &action_command,
                stdout: &action.stdout,
                stderr: &action.stderr,
                return_code: action.return_code,
            },
            state,
        );
        self.emit_status(&format!(
            "rule=#{} action_executed=true action_rc={}",
            rule.id, action.return_code
        ));
        true
    }
}
