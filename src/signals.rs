//! Cooperative termination: SIGINT/SIGTERM only set a flag.
//!
//! Handlers never perform I/O or touch supervisor state; the owning loop
//! observes the flag at its next safe point and does all blocking cleanup
//! from ordinary control flow.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::core::errors::{NetwatchError, Result};

/// Installs the shared shutdown flag for SIGINT and SIGTERM. Registration
/// failure is a fatal startup error.
pub fn install_shutdown_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&flag)).map_err(|source| {
            NetwatchError::SignalInstall {
                details: format!("signal {signal}: {source}"),
            }
        })?;
    }
    Ok(flag)
}
