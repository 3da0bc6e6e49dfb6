//! Supervisor event loop: rendezvous listener, readiness multiplexing,
//! directive dispatch, and the shutdown handshake.
//!
//! The whole supervisor lives in a single thread. Asynchronous signal
//! delivery only sets the shared shutdown flag; every blocking operation and
//! all cleanup happen here, in ordinary control flow, at the next safe point
//! after the readiness wait returns.

use std::os::fd::AsFd;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, info, warn};

use super::registry::{ConnectionRegistry, WorkerHandle};
use super::spawn::WorkerProcesses;
use crate::core::config::SHUTDOWN_GRACE;
use crate::core::errors::{NetwatchError, Result};
use crate::protocol::{self, Message};

/// Outcome of one readiness wait.
enum Wake {
    /// Interrupted by signal delivery; the caller re-checks the flag.
    Interrupted,
    /// At least one member of the poll set is readable.
    Ready {
        listener: bool,
        channels: Vec<usize>,
    },
}

/// How a worker answered the shutdown directive within the grace period.
#[derive(Debug, PartialEq, Eq)]
enum Acknowledgment {
    Graceful,
    TimedOut,
    Unexpected(String),
}

/// The supervisor: listener, registry, child table and shutdown flag, owned
/// by the event loop and touched by nothing else.
#[derive(Debug)]
pub struct Supervisor {
    listener: UnixListener,
    socket_path: PathBuf,
    interfaces: Vec<String>,
    registry: ConnectionRegistry,
    workers: WorkerProcesses,
    shutdown: Arc<AtomicBool>,
    grace: Duration,
}

impl Supervisor {
    /// Removes any stale rendezvous socket from a prior crashed run, then
    /// binds and listens. Bind or listen failure is fatal.
    pub fn bind(
        socket_path: impl AsRef<Path>,
        interfaces: Vec<String>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        match std::fs::remove_file(&socket_path) {
            Ok(()) => debug!(path = %socket_path.display(), "removed stale rendezvous socket"),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(NetwatchError::Bind {
                    path: socket_path,
                    source,
                });
            }
        }
        let listener = UnixListener::bind(&socket_path).map_err(|source| NetwatchError::Bind {
            path: socket_path.clone(),
            source,
        })?;
        let capacity = interfaces.len();
        Ok(Self {
            listener,
            socket_path,
            interfaces,
            registry: ConnectionRegistry::new(capacity),
            workers: WorkerProcesses::default(),
            shutdown,
            grace: SHUTDOWN_GRACE,
        })
    }

    /// Overrides the shutdown grace period (tests use a short one).
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Spawns one worker process per interface, in order.
    pub fn spawn_workers(&mut self, binary: &Path) -> Result<()> {
        self.workers = WorkerProcesses::spawn_all(binary, &self.interfaces)?;
        Ok(())
    }

    /// The connection registry, for inspection.
    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The rendezvous socket path in use.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the event loop until the shutdown flag is observed, then drives
    /// the shutdown handshake.
    pub fn run(&mut self) -> Result<()> {
        info!(
            path = %self.socket_path.display(),
            interfaces = self.interfaces.len(),
            "supervisor listening"
        );
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let open: Vec<usize> = self.registry.open_indices().collect();
            let wake = match self.wait_ready(&open, PollTimeout::NONE) {
                Ok(wake) => wake,
                Err(error) => {
                    warn!(%error, "readiness wait failed; entering shutdown");
                    break;
                }
            };
            // Flag check comes first on every wake, including EINTR.
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let Wake::Ready { listener, channels } = wake else {
                continue;
            };
            if listener {
                self.accept_one();
            }
            for index in channels {
                self.service_channel(index);
            }
        }
        self.shutdown_all();
        Ok(())
    }

    /// Blocks on readiness of {listener} ∪ {open channels}.
    fn wait_ready(&self, open: &[usize], timeout: PollTimeout) -> Result<Wake> {
        let interest = PollFlags::POLLIN;
        let mut fds = Vec::with_capacity(open.len() + 1);
        fds.push(PollFd::new(self.listener.as_fd(), interest));
        for &index in open {
            if let Some(stream) = self.registry.handles()[index].stream() {
                fds.push(PollFd::new(stream.as_fd(), interest));
            }
        }
        match poll(&mut fds, timeout) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Wake::Interrupted),
            Err(errno) => {
                return Err(NetwatchError::Poll {
                    details: errno.to_string(),
                });
            }
        }
        let readable = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
        let is_ready =
            |fd: &PollFd<'_>| fd.revents().is_some_and(|flags| flags.intersects(readable));
        let listener = is_ready(&fds[0]);
        let channels = open
            .iter()
            .zip(fds.iter().skip(1))
            .filter_map(|(&index, fd)| is_ready(fd).then_some(index))
            .collect();
        Ok(Wake::Ready { listener, channels })
    }

    /// Accepts one connection, binds it to the next interface in spawn
    /// order, and immediately issues the first `Monitor` directive.
    pub fn accept_one(&mut self) {
        let stream = match self.listener.accept() {
            Ok((stream, _)) => stream,
            Err(source) => {
                warn!(error = %source, "accept failed");
                return;
            }
        };
        if self.registry.is_full() {
            warn!("connection beyond the fixed worker set refused");
            return;
        }
        let interface = self.interfaces[self.registry.len()].clone();
        let pid = self.workers.pid_for(&interface);
        info!(interface = %interface, ?pid, "worker connected");
        match self.registry.register(interface.clone(), pid, stream) {
            Ok(handle) => {
                if let Err(error) = handle.begin_monitoring() {
                    warn!(interface = %interface, %error, "initial Monitor failed");
                }
            }
            Err(error) => warn!(interface = %interface, %error, "registration failed"),
        }
    }

    /// Reads exactly one frame from a ready channel and dispatches it.
    ///
    /// `Link Down` triggers the unconditional recovery pair; every other
    /// decoded message is logged and ignored; an unrecognized tag is logged
    /// and ignored; a transport error or EOF closes the channel.
    pub fn service_channel(&mut self, index: usize) {
        let Some(handle) = self.registry.handle_mut(index) else {
            return;
        };
        let interface = handle.interface().to_string();
        let frame = {
            let Some(stream) = handle.stream() else {
                return;
            };
            let mut reader = stream;
            protocol::read_frame(&mut reader)
        };
        match frame {
            Ok(frame) => match frame.message() {
                Some(Message::LinkDown) => {
                    info!(interface = %interface, "link down reported; issuing recovery");
                    handle.record_link_down();
                    if let Err(error) = handle.recover() {
                        warn!(interface = %interface, %error, "recovery directives failed");
                    }
                }
                Some(message) => {
                    info!(interface = %interface, message = %message, "worker report");
                }
                None => {
                    warn!(
                        interface = %interface,
                        tag = %frame.tag().escape_debug(),
                        "unrecognized frame ignored"
                    );
                }
            },
            Err(source) => {
                warn!(interface = %interface, error = %source, "channel read failed; closing");
                handle.close();
            }
        }
    }

    /// The shutdown handshake: every registered worker gets exactly one
    /// `Shut Down`, a bounded wait for its `Done`, and an unconditional
    /// close. Acknowledgment is advisory; the close does not depend on it.
    /// The rendezvous socket is removed only after every handle has been
    /// processed.
    pub fn shutdown_all(&mut self) {
        info!(workers = self.registry.len(), "shutting down worker set");
        for index in 0..self.registry.len() {
            let grace = self.grace;
            let Some(handle) = self.registry.handle_mut(index) else {
                continue;
            };
            if !handle.is_open() {
                continue;
            }
            let interface = handle.interface().to_string();
            if let Err(error) = handle.begin_shutdown() {
                warn!(interface = %interface, %error, "Shut Down not delivered; closing");
                handle.close();
                continue;
            }
            match Self::await_acknowledgment(handle, grace) {
                Acknowledgment::Graceful => {
                    info!(interface = %interface, "worker acknowledged shutdown");
                }
                Acknowledgment::TimedOut => {
                    info!(interface = %interface, "no acknowledgment within grace period; closing anyway");
                }
                Acknowledgment::Unexpected(tag) => {
                    warn!(interface = %interface, tag = %tag.escape_debug(), "unexpected reply to Shut Down");
                }
            }
            handle.close();
        }
        self.registry.clear();
        self.workers.reap();
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => info!(path = %self.socket_path.display(), "rendezvous socket removed"),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                warn!(path = %self.socket_path.display(), error = %source, "cannot remove rendezvous socket");
            }
        }
    }

    /// Bounded wait for one reply frame after `Shut Down`. A prompt `Done`
    /// shortens shutdown; silence pays the full grace period, nothing more.
    fn await_acknowledgment(handle: &WorkerHandle, grace: Duration) -> Acknowledgment {
        let Some(stream) = handle.stream() else {
            return Acknowledgment::TimedOut;
        };
        let millis = u16::try_from(grace.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(stream.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => return Acknowledgment::TimedOut,
            Ok(_) => {}
            Err(errno) => {
                warn!(error = %errno, "acknowledgment wait failed");
                return Acknowledgment::TimedOut;
            }
        }
        let mut reader = stream;
        match protocol::read_frame(&mut reader) {
            Ok(frame) if frame.message() == Some(Message::Done) => Acknowledgment::Graceful,
            Ok(frame) => Acknowledgment::Unexpected(frame.tag()),
            Err(_) => Acknowledgment::TimedOut,
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Startup may fail after bind; never leave a stale socket behind.
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
