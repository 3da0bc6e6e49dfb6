//! NWM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, NetwatchError>;

/// Top-level error type for netwatch.
///
/// Startup errors (1xxx) are fatal and map to a non-zero exit; everything
/// else is logged at the point of failure and the process carries on.
#[derive(Debug, Error)]
pub enum NetwatchError {
    #[error("[NWM-1001] cannot bind rendezvous socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[NWM-1002] cannot install signal handler: {details}")]
    SignalInstall { details: String },

    #[error("[NWM-1003] cannot spawn worker for interface {interface}: {source}")]
    Spawn {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[NWM-1004] cannot connect to rendezvous socket {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[NWM-1005] console input failure: {details}")]
    Console { details: String },

    #[error("[NWM-2001] transport failure in {context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("[NWM-2002] readiness wait failure: {details}")]
    Poll { details: String },

    #[error("[NWM-2003] connection registry full: capacity {capacity}")]
    RegistryFull { capacity: usize },

    #[error("[NWM-3001] cannot force interface {interface} up: {details}")]
    LinkControl { interface: String, details: String },

    #[error("[NWM-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NetwatchError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "NWM-1001",
            Self::SignalInstall { .. } => "NWM-1002",
            Self::Spawn { .. } => "NWM-1003",
            Self::Connect { .. } => "NWM-1004",
            Self::Console { .. } => "NWM-1005",
            Self::Transport { .. } => "NWM-2001",
            Self::Poll { .. } => "NWM-2002",
            Self::RegistryFull { .. } => "NWM-2003",
            Self::LinkControl { .. } => "NWM-3001",
            Self::Io { .. } => "NWM-3002",
        }
    }

    /// Whether the failure is fatal at startup (non-zero exit) as opposed to
    /// a runtime condition that is logged and survived.
    #[must_use]
    pub const fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. }
                | Self::SignalInstall { .. }
                | Self::Spawn { .. }
                | Self::Connect { .. }
                | Self::Console { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for transport errors with a known context.
    #[must_use]
    pub const fn transport(context: &'static str, source: std::io::Error) -> Self {
        Self::Transport { context, source }
    }
}
