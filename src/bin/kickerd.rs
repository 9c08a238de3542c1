use std::{process, sync::atomic::Ordering};

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use kicker::{
    daemon::{Daemon, DaemonSettings},
    logs::LogFormat,
};

/// Run the kicker daemon loop in the foreground.
///
/// Accepts the same long options as `kicker daemon run`.
#[derive(Parser)]
#[command(name = "kickerd")]
#[command(about = "Run the kicker daemon loop in the foreground", long_about = None)]
struct KickerdCli {
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
}

fn main() {
    let args = KickerdCli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut settings = DaemonSettings::new(args.log_format);
    settings.poll_interval = args.poll_interval;
    settings.lease_seconds = args.lease_seconds;
    settings.lease_grace_seconds = args.lease_grace_seconds;

    let mut daemon = Daemon::new(settings);
    if args.verbose {
        daemon = daemon.with_status_fn(|line| println!("{line}"));
    }

    let stop = daemon.stop_flag();
    if let Err(err) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
        warn!("Failed to install stop handler: {err}");
    }

    let outcome = daemon.run();
    if !(args.quiet && outcome.exit_code == 0) && !outcome.message.is_empty() {
        println!("{}", outcome.message);
    }
    process::exit(outcome.exit_code);
}
