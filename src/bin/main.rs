use std::{
    process,
    sync::atomic::Ordering,
};

use tracing::warn;
use tracing_subscriber::EnvFilter;

use kicker::{
    cli::{Cli, Commands, DaemonCommands, parse_args},
    config::{ConfigStore, Rule, TriggerMode},
    control::{StopOptions, daemon_status, stop_daemon},
    daemon::{Daemon, DaemonSettings},
    error::KickerError,
    logs::LogFormat,
    paths,
    policy::parse_rate_limit,
    state::RuntimeStateStore,
    system::{Clock, SystemClock, SystemProcess},
};

fn main() {
    let args = parse_args();
    init_logging();

    match dispatch(args) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn dispatch(args: Cli) -> Result<i32, KickerError> {
    match args.command {
        Commands::Add {
            action,
            if_zero,
            if_nonzero,
            if_fail_to_pass,
            if_pass_to_fail,
            if_code,
            check,
            once,
            interval,
            rate_limit,
            timeout,
        } => {
            let (trigger, check_command) = if let Some(command) = if_zero {
                (TriggerMode::OnZero, command)
            } else if let Some(command) = if_nonzero {
                (TriggerMode::OnNonzero, command)
            } else if let Some(command) = if_fail_to_pass {
                (TriggerMode::OnTransitionFailToPass, command)
            } else if let Some(command) = if_pass_to_fail {
                (TriggerMode::OnTransitionPassToFail, command)
            } else if let Some(code) = if_code {
                let Some(command) = check else {
                    return Err(KickerError::Parameter(
                        "--check is required with --if-code".to_string(),
                    ));
                };
                (TriggerMode::OnCode(code), command)
            } else {
                // clap's trigger group guarantees exactly one flag.
                return Err(KickerError::Parameter(
                    "exactly one trigger flag is required".to_string(),
                ));
            };

            cmd_add(AddRequest {
                action,
                check: check_command,
                trigger,
                once,
                interval,
                rate_limit,
                timeout,
            })
        }
        Commands::List => cmd_list(),
        Commands::Remove { id } => cmd_remove(id),
        Commands::Stats => cmd_stats(),
        Commands::Daemon { command } => match command {
            DaemonCommands::Run {
                log_format,
                poll_interval,
                lease_seconds,
                lease_grace_seconds,
                quiet,
                verbose,
            } => Ok(run_daemon_command(
                log_format,
                poll_interval,
                lease_seconds,
                lease_grace_seconds,
                quiet,
                verbose,
            )),
            DaemonCommands::Status => {
                let outcome = daemon_status(&paths::state_dir(), &SystemProcess);
                println!("{}", outcome.message);
                Ok(outcome.exit_code)
            }
            DaemonCommands::Stop { force, quiet } => {
                let options = StopOptions {
                    force,
                    quiet,
                    ..StopOptions::default()
                };
                let outcome =
                    stop_daemon(&paths::state_dir(), &options, &SystemProcess, &SystemClock);
                if !(quiet && outcome.exit_code == 0) {
                    println!("{}", outcome.message);
                }
                Ok(outcome.exit_code)
            }
        },
    }
}

struct AddRequest {
    action: String,
    check: String,
    trigger: TriggerMode,
    once: bool,
    interval: Option<f64>,
    rate_limit: Option<String>,
    timeout: Option<f64>,
}

fn cmd_add(request: AddRequest) -> Result<i32, KickerError> {
    let rate_limit = request
        .rate_limit
        .as_deref()
        .map(parse_rate_limit)
        .transpose()?;

    let store = ConfigStore::default_location();
    let config = store.load()?;
    let rule = Rule {
        id: config.next_rule_id(),
        check: request.check,
        action: request.action,
        trigger: request.trigger,
        once: request.once,
        poll_interval_seconds: request.interval,
        rate_limit,
        timeout_seconds: request.timeout,
    };
    let rule = store.add_rule(rule)?;
    println!("Added rule #{}.", rule.id);
    Ok(0)
}

fn cmd_list() -> Result<i32, KickerError> {
    let config = ConfigStore::default_location().load()?;
    if config.rules.is_empty() {
        println!("No rules configured.");
        return Ok(0);
    }
    for rule in &config.rules {
        println!("{}", render_rule(rule));
    }
    Ok(0)
}

fn render_rule(rule: &Rule) -> String {
    let mut line = format!(
        "#{} trigger={} check='{}' action='{}'",
        rule.id, rule.trigger, rule.check, rule.action
    );
    if let TriggerMode::OnCode(code) = rule.trigger {
        line.push_str(&format!(" code={code}"));
    }
    if rule.once {
        line.push_str(" once=true");
    }
    if let Some(interval) = rule.poll_interval_seconds {
        line.push_str(&format!(" interval={interval}s"));
    }
    if let Some(limit) = rule.rate_limit {
        line.push_str(&format!(" rate_limit={}/{}", limit.count, limit.window_seconds));
    }
    if let Some(timeout) = rule.timeout_seconds {
        line.push_str(&format!(" timeout={timeout}s"));
    }
    line
}

fn cmd_remove(id: u32) -> Result<i32, KickerError> {
    let store = ConfigStore::default_location();
    if store.remove_rule(id)? {
        println!("Removed rule #{id}.");
        Ok(0)
    } else {
        println!("No rule with id {id}.");
        Ok(1)
    }
}

fn cmd_stats() -> Result<i32, KickerError> {
    let config = ConfigStore::default_location().load()?;
    let state = RuntimeStateStore::default_location().load()?;
    let now = SystemClock.now();

    println!("rule_id  action_executions  action_executions_24h");
    for rule in &config.rules {
        let (executions, recent) = state
            .rules
            .get(&rule.id)
            .map(|entry| (entry.action_executions, entry.executions_last_24h(now)))
            .unwrap_or((0, 0));
        println!("{:<9}{:<19}{}", rule.id, executions, recent);
    }
    Ok(0)
}

fn run_daemon_command(
    log_format: LogFormat,
    poll_interval: Option<f64>,
    lease_seconds: Option<f64>,
    lease_grace_seconds: f64,
    quiet: bool,
    verbose: bool,
) -> i32 {
    let mut settings = DaemonSettings::new(log_format);
    settings.poll_interval = poll_interval;
    settings.lease_seconds = lease_seconds;
    settings.lease_grace_seconds = lease_grace_seconds;

    let mut daemon = Daemon::new(settings);
    if verbose {
        daemon = daemon.with_status_fn(|line| println!("{line}"));
    }

    let stop = daemon.stop_flag();
    if let Err(err) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
        warn!("Failed to install stop handler: {err}");
    }

    let outcome = daemon.run();
    if !(quiet && outcome.exit_code == 0) && !outcome.message.is_empty() {
        println!("{}", outcome.message);
    }
    outcome.exit_code
}
