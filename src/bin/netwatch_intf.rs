//! Per-interface worker entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use netwatch::core::config::SOCKET_PATH;
use netwatch::core::errors::Result;
use netwatch::signals;
use netwatch::worker::Worker;
use netwatch::worker::link::IpCommand;
use netwatch::worker::stats::SysfsStats;

/// Interface monitoring worker; spawned by the netwatch supervisor.
#[derive(Parser)]
#[command(name = "netwatch-intf", version, about)]
struct Cli {
    /// Name of the interface this worker monitors.
    interface: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    match run(cli.interface) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(code = err.code(), "{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(interface: String) -> Result<()> {
    let shutdown = signals::install_shutdown_flag()?;
    let mut worker = Worker::connect(SOCKET_PATH, interface, SysfsStats::new(), IpCommand, shutdown)?;
    worker.run()
}
