//! qmpfault binary.
//!
//! # Usage
//!
//! ```bash
//! # Target started with: qemu-system-... -qmp tcp:localhost:4444,server -S
//! qmpfault --address localhost:4444 --scenario glitch.json -v
//!
//! # Unix socket, protocol traffic logged
//! qmpfault --address /tmp/qmp.sock --scenario glitch.json -vv
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use qmpfault_cli::Scenario;
use qmpfault_core::{ClockPolicy, SessionConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Fault injection over QMP
#[derive(Parser, Debug)]
#[command(name = "qmpfault")]
#[command(about = "Inject scheduled faults into a QEMU target over QMP")]
#[command(version)]
struct Args {
    /// QMP address: host:port or a Unix socket path
    #[arg(short, long)]
    address: String,

    /// Fault scenario (JSON)
    #[arg(short, long)]
    scenario: PathBuf,

    /// Log actions (-v) and protocol traffic (-vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Fault time earlier than the clock: strict aborts, lenient warns
    #[arg(long, default_value_t = ClockPolicy::Strict)]
    clock_policy: ClockPolicy,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let level = if args.verbose >= 2 { "debug" } else { args.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let scenario = Scenario::load(&args.scenario)?;
    tracing::info!("Loaded {} faults from {}", scenario.faults.len(), args.scenario.display());

    let config = SessionConfig { verbosity: args.verbose, clock_policy: args.clock_policy };
    let mut session = qmpfault_client::connect(&args.address, config).inspect_err(|e| {
        tracing::error!(category = ?e.category(), "{e}");
    })?;

    let report = |e: &qmpfault_core::SessionError| {
        tracing::error!(category = ?e.category(), "{e}");
    };
    scenario.install(&mut session).inspect_err(report)?;
    session.run().inspect_err(report)?;

    tracing::info!("Target shut down at {}ns", session.now_ns());
    Ok(())
}
