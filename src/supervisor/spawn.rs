//! Worker process spawn and reap bookkeeping.
//!
//! One worker process per interface, spawned through the OS process
//! facility with the interface name as the single positional argument.
//! The supervisor never blocks on worker exit; reaping is a best-effort
//! sweep after the shutdown handshake.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::core::errors::{NetwatchError, Result};

/// Name of the per-interface worker binary.
pub const WORKER_BINARY: &str = "netwatch-intf";

/// Locates the worker binary next to the running supervisor, falling back to
/// a PATH lookup when the executable path cannot be resolved.
#[must_use]
pub fn worker_binary() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BINARY)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(WORKER_BINARY))
}

/// Spawn-order table of worker child processes.
#[derive(Debug, Default)]
pub struct WorkerProcesses {
    children: Vec<(String, Child)>,
}

impl WorkerProcesses {
    /// Spawns one worker per interface, in order. Any spawn failure is
    /// fatal: a partial worker set would leave interfaces silently
    /// unmonitored.
    pub fn spawn_all(binary: &Path, interfaces: &[String]) -> Result<Self> {
        let mut children = Vec::with_capacity(interfaces.len());
        for interface in interfaces {
            let child = Command::new(binary)
                .arg(interface)
                .stdin(Stdio::null())
                .spawn()
                .map_err(|source| NetwatchError::Spawn {
                    interface: interface.clone(),
                    source,
                })?;
            info!(interface = %interface, pid = child.id(), "spawned worker");
            children.push((interface.clone(), child));
        }
        Ok(Self { children })
    }

    /// Number of spawned workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether no workers were spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Process identity for the worker owning `interface`.
    #[must_use]
    pub fn pid_for(&self, interface: &str) -> Option<u32> {
        self.children
            .iter()
            .find(|(name, _)| name == interface)
            .map(|(_, child)| child.id())
    }

    /// Best-effort, non-blocking reap. Workers are expected to self-
    /// terminate promptly after acknowledging `Shut Down`; stragglers are
    /// logged, never waited on.
    pub fn reap(&mut self) {
        for (interface, child) in &mut self.children {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(interface = %interface, %status, "worker exited");
                }
                Ok(None) => {
                    info!(interface = %interface, pid = child.id(), "worker still running at supervisor exit");
                }
                Err(source) => {
                    warn!(interface = %interface, error = %source, "cannot query worker status");
                }
            }
        }
    }
}
