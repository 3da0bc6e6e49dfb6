//! Connection registry: the supervisor-side table mapping each accepted
//! channel to its owning worker and interface, with per-connection protocol
//! state.
//!
//! The registry has a fixed capacity equal to the number of interfaces
//! requested at startup; there is no dynamic add or remove of interfaces.
//! Channels do get closed (shutdown handshake, dead peers), which leaves the
//! handle in place for bookkeeping but removes it from the readiness set.

use std::os::unix::net::UnixStream;

use tracing::warn;

use crate::core::errors::{NetwatchError, Result};
use crate::protocol::{self, Message};

/// Supervisor's view of one worker connection.
///
/// `AwaitingHandshake` is the post-accept initial state; the terminal state
/// is reached only through `ShuttingDown` followed by channel close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Accepted, no directive sent yet.
    AwaitingHandshake,
    /// A `Monitor` directive is outstanding.
    Monitoring,
    /// The worker reported `Link Down`; recovery not yet issued.
    LinkDown,
    /// A `Shut Down` directive has been sent.
    ShuttingDown,
}

/// One registered worker connection: process identity, owning interface,
/// channel handle, and protocol state.
#[derive(Debug)]
pub struct WorkerHandle {
    interface: String,
    pid: Option<u32>,
    stream: Option<UnixStream>,
    state: ProtocolState,
}

impl WorkerHandle {
    fn new(interface: String, pid: Option<u32>, stream: UnixStream) -> Self {
        Self {
            interface,
            pid,
            stream: Some(stream),
            state: ProtocolState::AwaitingHandshake,
        }
    }

    /// The interface this worker owns.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Process identity of the worker, when known.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> ProtocolState {
        self.state
    }

    /// The channel, if still open.
    #[must_use]
    pub const fn stream(&self) -> Option<&UnixStream> {
        self.stream.as_ref()
    }

    /// Whether the channel is still open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, message: Message) -> Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(NetwatchError::transport(
                "directive write",
                std::io::Error::from(std::io::ErrorKind::NotConnected),
            ));
        };
        let mut writer = stream;
        protocol::write_message(&mut writer, message)
            .map_err(|source| NetwatchError::transport("directive write", source))
    }

    /// Sends `Monitor` and records the transition to `Monitoring`.
    ///
    /// Legal from `AwaitingHandshake` and `LinkDown` only. A call while a
    /// `Monitor` is already outstanding is refused (no second directive goes
    /// out without an intervening `Link Down`), and a call after shutdown
    /// began is refused outright.
    pub fn begin_monitoring(&mut self) -> Result<()> {
        match self.state {
            ProtocolState::AwaitingHandshake | ProtocolState::LinkDown => {
                self.send(Message::Monitor)?;
                self.state = ProtocolState::Monitoring;
                Ok(())
            }
            ProtocolState::Monitoring => {
                warn!(interface = %self.interface, "Monitor already outstanding; not re-sent");
                Ok(())
            }
            ProtocolState::ShuttingDown => {
                warn!(interface = %self.interface, "Monitor suppressed during shutdown");
                Ok(())
            }
        }
    }

    /// Records a `Link Down` report from the worker.
    pub fn record_link_down(&mut self) {
        if self.state != ProtocolState::Monitoring {
            warn!(
                interface = %self.interface,
                state = ?self.state,
                "Link Down received outside the monitoring state"
            );
        }
        self.state = ProtocolState::LinkDown;
    }

    /// Sends the unconditional recovery pair: `Set Link Up` then `Monitor`.
    ///
    /// Fire-and-forget: there is no confirmation that the administrative-up
    /// action succeeded before monitoring resumes. A still-down link simply
    /// produces the next `Link Down` report.
    pub fn recover(&mut self) -> Result<()> {
        self.send(Message::SetLinkUp)?;
        self.begin_monitoring()
    }

    /// Sends `Shut Down` and records the transition.
    pub fn begin_shutdown(&mut self) -> Result<()> {
        self.send(Message::ShutDown)?;
        self.state = ProtocolState::ShuttingDown;
        Ok(())
    }

    /// Closes the channel. The handle stays registered for bookkeeping but
    /// drops out of the readiness set.
    pub fn close(&mut self) {
        self.stream = None;
    }
}

/// Fixed-capacity table of worker connections in registration order.
#[derive(Debug)]
pub struct ConnectionRegistry {
    handles: Vec<WorkerHandle>,
    capacity: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry sized for the interface set.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Registers a freshly accepted channel. Fails once the fixed capacity
    /// is reached.
    pub fn register(
        &mut self,
        interface: String,
        pid: Option<u32>,
        stream: UnixStream,
    ) -> Result<&mut WorkerHandle> {
        if self.handles.len() >= self.capacity {
            return Err(NetwatchError::RegistryFull {
                capacity: self.capacity,
            });
        }
        self.handles.push(WorkerHandle::new(interface, pid, stream));
        let index = self.handles.len() - 1;
        Ok(&mut self.handles[index])
    }

    /// Number of registered handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing is registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Whether every slot is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.handles.len() >= self.capacity
    }

    /// Fixed capacity, equal to the requested interface count.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// All handles in registration order.
    #[must_use]
    pub fn handles(&self) -> &[WorkerHandle] {
        &self.handles
    }

    /// Mutable access to one handle.
    pub fn handle_mut(&mut self, index: usize) -> Option<&mut WorkerHandle> {
        self.handles.get_mut(index)
    }

    /// Registration-order indices of handles whose channel is still open.
    pub fn open_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.handles
            .iter()
            .enumerate()
            .filter(|(_, handle)| handle.is_open())
            .map(|(index, _)| index)
    }

    /// Releases every handle (and with them any still-open channels).
    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    use super::{ConnectionRegistry, ProtocolState};
    use crate::core::config::FRAME_LEN;
    use crate::protocol::{Message, read_frame};

    fn read_message(peer: &mut UnixStream) -> Option<Message> {
        read_frame(peer).expect("full frame queued").message()
    }

    fn assert_nothing_queued(peer: &mut UnixStream) {
        peer.set_nonblocking(true).expect("set_nonblocking");
        let mut byte = [0u8; 1];
        let err = peer.read(&mut byte).expect_err("channel should be idle");
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
        peer.set_nonblocking(false).expect("set_nonblocking");
    }

    #[test]
    fn register_respects_fixed_capacity() {
        let mut registry = ConnectionRegistry::new(1);
        let (ours, _theirs) = UnixStream::pair().expect("socketpair");
        registry
            .register("eth0".to_string(), Some(100), ours)
            .expect("first slot free");
        assert!(registry.is_full());

        let (extra, _peer) = UnixStream::pair().expect("socketpair");
        let err = registry
            .register("eth1".to_string(), None, extra)
            .expect_err("capacity exhausted");
        assert_eq!(err.code(), "NWM-2003");
    }

    #[test]
    fn monitor_is_never_outstanding_twice() {
        let mut registry = ConnectionRegistry::new(1);
        let (ours, mut theirs) = UnixStream::pair().expect("socketpair");
        let handle = registry
            .register("eth0".to_string(), None, ours)
            .expect("slot free");
        assert_eq!(handle.state(), ProtocolState::AwaitingHandshake);

        handle.begin_monitoring().expect("first Monitor");
        assert_eq!(handle.state(), ProtocolState::Monitoring);
        assert_eq!(read_message(&mut theirs), Some(Message::Monitor));

        // A second call while Monitoring is a refused no-op.
        handle.begin_monitoring().expect("refused, not an error");
        assert_nothing_queued(&mut theirs);
    }

    #[test]
    fn recovery_sends_set_link_up_then_monitor() {
        let mut registry = ConnectionRegistry::new(1);
        let (ours, mut theirs) = UnixStream::pair().expect("socketpair");
        let handle = registry
            .register("eth0".to_string(), None, ours)
            .expect("slot free");
        handle.begin_monitoring().expect("initial Monitor");
        assert_eq!(read_message(&mut theirs), Some(Message::Monitor));

        handle.record_link_down();
        assert_eq!(handle.state(), ProtocolState::LinkDown);
        handle.recover().expect("recovery pair");
        assert_eq!(handle.state(), ProtocolState::Monitoring);

        assert_eq!(read_message(&mut theirs), Some(Message::SetLinkUp));
        assert_eq!(read_message(&mut theirs), Some(Message::Monitor));
    }

    #[test]
    fn shutdown_suppresses_further_monitor_directives() {
        let mut registry = ConnectionRegistry::new(1);
        let (ours, mut theirs) = UnixStream::pair().expect("socketpair");
        let handle = registry
            .register("eth0".to_string(), None, ours)
            .expect("slot free");
        handle.begin_monitoring().expect("initial Monitor");
        assert_eq!(read_message(&mut theirs), Some(Message::Monitor));

        handle.begin_shutdown().expect("Shut Down goes out");
        assert_eq!(handle.state(), ProtocolState::ShuttingDown);
        assert_eq!(read_message(&mut theirs), Some(Message::ShutDown));

        handle.begin_monitoring().expect("refused, not an error");
        assert_nothing_queued(&mut theirs);
    }

    #[test]
    fn closed_handles_leave_the_readiness_set() {
        let mut registry = ConnectionRegistry::new(2);
        let (first, _peer_a) = UnixStream::pair().expect("socketpair");
        let (second, _peer_b) = UnixStream::pair().expect("socketpair");
        registry
            .register("eth0".to_string(), None, first)
            .expect("slot free");
        registry
            .register("eth1".to_string(), None, second)
            .expect("slot free");

        registry
            .handle_mut(0)
            .expect("handle exists")
            .close();
        let open: Vec<usize> = registry.open_indices().collect();
        assert_eq!(open, vec![1]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn write_to_closed_channel_is_a_transport_error() {
        let mut registry = ConnectionRegistry::new(1);
        let (ours, _theirs) = UnixStream::pair().expect("socketpair");
        let handle = registry
            .register("eth0".to_string(), None, ours)
            .expect("slot free");
        handle.close();
        let err = handle.begin_shutdown().expect_err("channel closed");
        assert_eq!(err.code(), "NWM-2001");
    }

    #[test]
    fn frames_are_exactly_one_frame_long() {
        let mut registry = ConnectionRegistry::new(1);
        let (ours, mut theirs) = UnixStream::pair().expect("socketpair");
        let handle = registry
            .register("eth0".to_string(), None, ours)
            .expect("slot free");
        handle.begin_monitoring().expect("Monitor");

        let mut buffer = vec![0u8; FRAME_LEN];
        theirs.read_exact(&mut buffer).expect("one full frame");
        assert_nothing_queued(&mut theirs);
    }
}
