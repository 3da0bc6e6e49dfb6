//! netwatch — link-state supervision for a fixed set of network interfaces.
//!
//! One supervisor process spawns one isolated monitoring worker process per
//! interface. Each worker connects back over the well-known Unix-domain
//! rendezvous socket; the supervisor multiplexes every channel with a single
//! blocking readiness wait, answers `Link Down` reports with the recovery
//! directive pair, and tears the whole set down through an acknowledged
//! shutdown handshake.

pub mod console;
pub mod core;
pub mod protocol;
pub mod signals;
pub mod supervisor;
pub mod worker;
