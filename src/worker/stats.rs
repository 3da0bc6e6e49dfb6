//! Read-only per-interface stat source.
//!
//! Values come from a conventional sysfs-style tree (one file per counter,
//! read sequentially, never written) and are kept as raw text: this data is
//! collected for display, not arithmetic. An unreadable entry is logged and
//! displayed as empty.

#![allow(missing_docs)]

use std::path::PathBuf;

use colored::Colorize;
use tracing::warn;

use crate::core::config::SYSFS_NET_ROOT;

/// One sample of an interface's operational state and traffic counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub operstate: String,
    pub carrier_up_count: String,
    pub carrier_down_count: String,
    pub rx_bytes: String,
    pub rx_dropped: String,
    pub rx_errors: String,
    pub rx_packets: String,
    pub tx_bytes: String,
    pub tx_dropped: String,
    pub tx_errors: String,
    pub tx_packets: String,
}

impl InterfaceCounters {
    /// Whether the link counts as up for monitoring purposes. An empty
    /// operstate (unreadable file) does not count as a transition.
    #[must_use]
    pub fn is_link_up(&self) -> bool {
        self.operstate == "up" || self.operstate.is_empty()
    }

    /// Three-line display block for the operator console.
    #[must_use]
    pub fn render(&self, interface: &str) -> String {
        let state = if self.is_link_up() {
            self.operstate.green()
        } else {
            self.operstate.red()
        };
        format!(
            "Interface:{} state:{} up_count:{} down_count:{}\n\
             rx_bytes:{} rx_dropped:{} rx_errors:{} rx_packets:{}\n\
             tx_bytes:{} tx_dropped:{} tx_errors:{} tx_packets:{}",
            interface,
            state,
            self.carrier_up_count,
            self.carrier_down_count,
            self.rx_bytes,
            self.rx_dropped,
            self.rx_errors,
            self.rx_packets,
            self.tx_bytes,
            self.tx_dropped,
            self.tx_errors,
            self.tx_packets,
        )
    }
}

/// Source of interface samples. The production impl reads sysfs; tests
/// substitute scripted fakes.
pub trait StatSource {
    /// Takes one sample for `interface`.
    fn sample(&self, interface: &str) -> InterfaceCounters;
}

/// Reads per-interface state and counters from `/sys/class/net`.
#[derive(Debug, Clone)]
pub struct SysfsStats {
    root: PathBuf,
}

impl Default for SysfsStats {
    fn default() -> Self {
        Self {
            root: PathBuf::from(SYSFS_NET_ROOT),
        }
    }
}

impl SysfsStats {
    /// Stat source rooted at the real sysfs tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stat source rooted elsewhere (tests point this at a scratch tree).
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_entry(&self, interface: &str, entry: &str) -> String {
        let path = self.root.join(interface).join(entry);
        match std::fs::read_to_string(&path) {
            Ok(contents) => contents
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
            Err(source) => {
                warn!(path = %path.display(), error = %source, "cannot read stat entry");
                String::new()
            }
        }
    }
}

impl StatSource for SysfsStats {
    fn sample(&self, interface: &str) -> InterfaceCounters {
        InterfaceCounters {
            operstate: self.read_entry(interface, "operstate"),
            carrier_up_count: self.read_entry(interface, "carrier_up_count"),
            carrier_down_count: self.read_entry(interface, "carrier_down_count"),
            rx_bytes: self.read_entry(interface, "statistics/rx_bytes"),
            rx_dropped: self.read_entry(interface, "statistics/rx_dropped"),
            rx_errors: self.read_entry(interface, "statistics/rx_errors"),
            rx_packets: self.read_entry(interface, "statistics/rx_packets"),
            tx_bytes: self.read_entry(interface, "statistics/tx_bytes"),
            tx_dropped: self.read_entry(interface, "statistics/tx_dropped"),
            tx_errors: self.read_entry(interface, "statistics/tx_errors"),
            tx_packets: self.read_entry(interface, "statistics/tx_packets"),
        }
    }
}
