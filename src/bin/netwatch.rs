//! Supervisor entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use netwatch::console;
use netwatch::core::config::SOCKET_PATH;
use netwatch::core::errors::Result;
use netwatch::signals;
use netwatch::supervisor::{Supervisor, spawn};

/// Link-state supervisor: one isolated monitoring worker per interface.
#[derive(Parser)]
#[command(name = "netwatch", version, about)]
struct Cli {}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let Cli {} = Cli::parse();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(code = err.code(), "{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let interfaces = console::collect_interfaces(&mut stdin.lock(), &mut stdout)?;
    let shutdown = signals::install_shutdown_flag()?;
    let mut supervisor = Supervisor::bind(SOCKET_PATH, interfaces, shutdown)?;
    supervisor.spawn_workers(&spawn::worker_binary())?;
    supervisor.run()
}
