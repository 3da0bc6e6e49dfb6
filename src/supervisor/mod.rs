//! Supervisor subsystem: connection registry, worker spawning, and the
//! event loop that multiplexes every worker channel.

pub mod event_loop;
pub mod registry;
pub mod spawn;

pub use event_loop::Supervisor;
