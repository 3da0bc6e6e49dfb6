//! The "force interface administratively up" collaborator.
//!
//! The action is a control concern, not a protocol one: failure is logged
//! locally by the caller, never reported back to the supervisor, and never
//! retried.

use std::process::Command;

use crate::core::errors::{NetwatchError, Result};

/// Seam for the administrative-up action. Tests substitute fakes; the
/// production impl issues the real OS request.
pub trait LinkControl {
    /// Requests that `interface` be enabled, independent of physical link
    /// presence.
    fn set_link_up(&self, interface: &str) -> Result<()>;
}

/// Production impl: `ip link set dev <interface> up`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpCommand;

impl LinkControl for IpCommand {
    fn set_link_up(&self, interface: &str) -> Result<()> {
        let output = Command::new("ip")
            .args(["link", "set", "dev", interface, "up"])
            .output()
            .map_err(|source| NetwatchError::LinkControl {
                interface: interface.to_string(),
                details: source.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(NetwatchError::LinkControl {
                interface: interface.to_string(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
