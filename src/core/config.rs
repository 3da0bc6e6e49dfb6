//! Fixed operating parameters.
//!
//! The rendezvous address and all timing constants are agreed out-of-band by
//! supervisor and worker; nothing here is parameterized at runtime.

use std::time::Duration;

/// Well-known rendezvous socket both sides use to establish their channel.
pub const SOCKET_PATH: &str = "/tmp/netwatch.sock";

/// Shared frame size for every protocol message.
pub const FRAME_LEN: usize = 128;

/// Cadence of the worker's stat-poll cycle.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long the shutdown handshake waits for a `Done` acknowledgment before
/// closing a worker channel anyway.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Root of the read-only per-interface stat tree.
pub const SYSFS_NET_ROOT: &str = "/sys/class/net";
