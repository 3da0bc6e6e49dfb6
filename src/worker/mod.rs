//! Per-interface worker: directive-wait state machine and monitoring cycle.
//!
//! One worker process owns exactly one interface and one channel to the
//! supervisor. The process is single-threaded: it suspends either on "read
//! next directive" or on the fixed-interval sleep between stat polls. Once
//! per poll tick the channel is checked with a zero-timeout wait, so a
//! directive arriving mid-cycle is consumed within one cadence interval
//! instead of waiting for the next link-down.

pub mod link;
pub mod stats;

use std::io::Write;
use std::net::Shutdown;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, info, warn};

use crate::core::config::POLL_INTERVAL;
use crate::core::errors::{NetwatchError, Result};
use crate::protocol::{self, Frame, Message};
use self::link::LinkControl;
use self::stats::StatSource;

/// Why a monitoring cycle ended.
enum CycleEnd {
    /// The interface left the "up" operational state.
    LinkDown,
    /// A directive arrived mid-cycle.
    Directive(Frame),
    /// The termination flag was observed.
    Terminated,
    /// The supervisor channel died.
    ChannelLost,
}

/// The worker state machine for one interface.
pub struct Worker<S, L> {
    interface: String,
    stream: UnixStream,
    stats: S,
    link: L,
    shutdown: Arc<AtomicBool>,
    cadence: Duration,
    display: Box<dyn Write + Send>,
}

impl<S: StatSource, L: LinkControl> Worker<S, L> {
    /// Connects to the supervisor's rendezvous endpoint and sends the
    /// `Ready` handshake. Either step failing is a startup error.
    pub fn connect(
        socket_path: impl AsRef<Path>,
        interface: String,
        stats: S,
        link: L,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let socket_path = socket_path.as_ref();
        let stream =
            UnixStream::connect(socket_path).map_err(|source| NetwatchError::Connect {
                path: socket_path.to_path_buf(),
                source,
            })?;
        let mut worker = Self::over(stream, interface, stats, link, shutdown);
        protocol::write_message(&mut &worker.stream, Message::Ready)
            .map_err(|source| NetwatchError::transport("Ready handshake", source))?;
        debug!(interface = %worker.interface, "connected and ready");
        worker.display = Box::new(std::io::stdout());
        Ok(worker)
    }

    /// Builds a worker over an existing channel (tests use a socketpair).
    #[must_use]
    pub fn over(
        stream: UnixStream,
        interface: String,
        stats: S,
        link: L,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            interface,
            stream,
            stats,
            link,
            shutdown,
            cadence: POLL_INTERVAL,
            display: Box::new(std::io::sink()),
        }
    }

    /// Overrides the stat-poll cadence (tests use a short one).
    #[must_use]
    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Redirects the stat display (the default for connected workers is
    /// stdout).
    #[must_use]
    pub fn with_display(mut self, display: Box<dyn Write + Send>) -> Self {
        self.display = display;
        self
    }

    /// The directive-wait loop. Returns once the worker has been told to
    /// shut down, the termination flag was observed, or the supervisor went
    /// away.
    pub fn run(&mut self) -> Result<()> {
        let mut pending: Option<Frame> = None;
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.send_done_and_close();
                return Ok(());
            }
            let frame = if let Some(frame) = pending.take() {
                frame
            } else {
                match self.wait_directive() {
                    Ok(Some(frame)) => frame,
                    // Signal delivery; the flag check at the top decides.
                    Ok(None) => continue,
                    Err(source) => {
                        warn!(interface = %self.interface, error = %source, "supervisor channel lost");
                        return Ok(());
                    }
                }
            };
            match frame.message() {
                Some(Message::Monitor) => {
                    if let Err(source) =
                        protocol::write_message(&mut &self.stream, Message::Monitoring)
                    {
                        warn!(interface = %self.interface, error = %source, "Monitoring ack failed");
                    }
                    match self.monitor_cycle() {
                        CycleEnd::LinkDown => {
                            info!(interface = %self.interface, "link down; reporting");
                            if let Err(source) =
                                protocol::write_message(&mut &self.stream, Message::LinkDown)
                            {
                                warn!(interface = %self.interface, error = %source, "Link Down report failed");
                            }
                        }
                        CycleEnd::Directive(frame) => pending = Some(frame),
                        CycleEnd::Terminated => {
                            self.send_done_and_close();
                            return Ok(());
                        }
                        CycleEnd::ChannelLost => {
                            warn!(interface = %self.interface, "supervisor channel lost mid-cycle");
                            return Ok(());
                        }
                    }
                }
                Some(Message::SetLinkUp) => {
                    // Control errors stay local: logged, not reported back,
                    // not retried.
                    if let Err(error) = self.link.set_link_up(&self.interface) {
                        warn!(interface = %self.interface, %error, "administrative up failed");
                    }
                }
                Some(Message::ShutDown) => {
                    info!(interface = %self.interface, "shutdown directive received");
                    self.send_done_and_close();
                    return Ok(());
                }
                Some(message) => {
                    warn!(interface = %self.interface, message = %message, "unexpected message ignored");
                }
                None => {
                    warn!(
                        interface = %self.interface,
                        tag = %frame.tag().escape_debug(),
                        "unrecognized frame ignored"
                    );
                }
            }
        }
    }

    /// One monitoring cycle: sample, display, check the operational state,
    /// peek at the channel, sleep, repeat.
    fn monitor_cycle(&mut self) -> CycleEnd {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return CycleEnd::Terminated;
            }
            let counters = self.stats.sample(&self.interface);
            let _ = writeln!(self.display, "{}", counters.render(&self.interface));
            if !counters.is_link_up() {
                // Exactly one Link Down goes out before any further state
                // read; the caller sends it and returns to directive-wait.
                return CycleEnd::LinkDown;
            }
            match self.try_read_directive() {
                Ok(Some(frame)) => return CycleEnd::Directive(frame),
                Ok(None) => {}
                Err(_) => return CycleEnd::ChannelLost,
            }
            std::thread::sleep(self.cadence);
        }
    }

    /// Interruptible wait for the next directive. `read_exact` restarts
    /// interrupted reads on its own, so the suspension has to live in
    /// `poll`, which signal delivery does wake; `None` sends the caller
    /// back to the termination-flag check.
    fn wait_directive(&self) -> std::io::Result<Option<Frame>> {
        let mut fds = [PollFd::new(self.stream.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => protocol::read_frame(&mut &self.stream).map(Some),
            Err(Errno::EINTR) => Ok(None),
            Err(errno) => Err(std::io::Error::from(errno)),
        }
    }

    /// Zero-timeout channel peek; reads one full frame when the channel is
    /// readable.
    fn try_read_directive(&self) -> std::io::Result<Option<Frame>> {
        let mut fds = [PollFd::new(self.stream.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(0) => Ok(None),
            Ok(_) => protocol::read_frame(&mut &self.stream).map(Some),
            Err(Errno::EINTR) => Ok(None),
            Err(errno) => Err(std::io::Error::from(errno)),
        }
    }

    /// Best-effort final acknowledgment: send `Done`, close the channel.
    fn send_done_and_close(&mut self) {
        if let Err(source) = protocol::write_message(&mut &self.stream, Message::Done) {
            warn!(interface = %self.interface, error = %source, "Done acknowledgment failed");
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        info!(interface = %self.interface, "worker done");
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::link::LinkControl;
    use super::stats::{InterfaceCounters, StatSource};
    use super::Worker;
    use crate::core::errors::{NetwatchError, Result};
    use crate::protocol::{Message, read_frame, write_message};

    /// Scripted operstate sequence; the last entry repeats forever.
    struct ScriptedStats {
        states: Vec<&'static str>,
        cursor: AtomicUsize,
    }

    impl ScriptedStats {
        fn new(states: Vec<&'static str>) -> Self {
            Self {
                states,
                cursor: AtomicUsize::new(0),
            }
        }
    }

    impl StatSource for ScriptedStats {
        fn sample(&self, _interface: &str) -> InterfaceCounters {
            let index = self.cursor.fetch_add(1, Ordering::SeqCst);
            let state = self.states[index.min(self.states.len() - 1)];
            InterfaceCounters {
                operstate: state.to_string(),
                ..InterfaceCounters::default()
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingLink {
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl LinkControl for RecordingLink {
        fn set_link_up(&self, interface: &str) -> Result<()> {
            self.calls
                .lock()
                .expect("no poisoned lock in tests")
                .push(interface.to_string());
            if self.fail {
                Err(NetwatchError::LinkControl {
                    interface: interface.to_string(),
                    details: "scripted failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn spawn_worker(
        states: Vec<&'static str>,
        link: RecordingLink,
        shutdown: Arc<AtomicBool>,
    ) -> (UnixStream, std::thread::JoinHandle<()>) {
        let (ours, theirs) = UnixStream::pair().expect("socketpair");
        let mut worker = Worker::over(
            theirs,
            "eth0".to_string(),
            ScriptedStats::new(states),
            link,
            shutdown,
        )
        .with_cadence(Duration::from_millis(1));
        let handle = std::thread::spawn(move || {
            worker.run().expect("worker run is infallible here");
        });
        (ours, handle)
    }

    #[test]
    fn monitor_acknowledges_then_reports_one_link_down() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (mut channel, handle) =
            spawn_worker(vec!["up", "up", "down"], RecordingLink::default(), shutdown);

        write_message(&mut channel, Message::Monitor).expect("directive");
        assert_eq!(
            read_frame(&mut channel).expect("frame").message(),
            Some(Message::Monitoring)
        );
        assert_eq!(
            read_frame(&mut channel).expect("frame").message(),
            Some(Message::LinkDown)
        );

        write_message(&mut channel, Message::ShutDown).expect("directive");
        assert_eq!(
            read_frame(&mut channel).expect("frame").message(),
            Some(Message::Done)
        );
        handle.join().expect("worker thread");
    }

    #[test]
    fn set_link_up_invokes_the_collaborator_and_failure_stays_local() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let link = RecordingLink {
            fail: true,
            ..RecordingLink::default()
        };
        let calls = Arc::clone(&link.calls);
        let (mut channel, handle) = spawn_worker(vec!["up"], link, shutdown);

        write_message(&mut channel, Message::SetLinkUp).expect("directive");
        write_message(&mut channel, Message::ShutDown).expect("directive");
        assert_eq!(
            read_frame(&mut channel).expect("frame").message(),
            Some(Message::Done)
        );
        handle.join().expect("worker thread");

        let recorded = calls.lock().expect("no poisoned lock in tests");
        // The failing administrative action was attempted exactly once and
        // nothing beyond Done ever went back to the supervisor.
        assert_eq!(recorded.as_slice(), ["eth0"]);
    }

    #[test]
    fn shutdown_mid_cycle_is_honored_within_one_tick() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (mut channel, handle) =
            spawn_worker(vec!["up"], RecordingLink::default(), shutdown);

        write_message(&mut channel, Message::Monitor).expect("directive");
        assert_eq!(
            read_frame(&mut channel).expect("frame").message(),
            Some(Message::Monitoring)
        );
        // The worker is inside its monitoring cycle now; the directive must
        // be picked up by the per-tick channel peek.
        write_message(&mut channel, Message::ShutDown).expect("directive");
        assert_eq!(
            read_frame(&mut channel).expect("frame").message(),
            Some(Message::Done)
        );
        handle.join().expect("worker thread");
    }

    #[test]
    fn termination_flag_produces_a_best_effort_done() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (mut channel, handle) = spawn_worker(
            vec!["up"],
            RecordingLink::default(),
            Arc::clone(&shutdown),
        );

        write_message(&mut channel, Message::Monitor).expect("directive");
        assert_eq!(
            read_frame(&mut channel).expect("frame").message(),
            Some(Message::Monitoring)
        );
        shutdown.store(true, Ordering::SeqCst);
        assert_eq!(
            read_frame(&mut channel).expect("frame").message(),
            Some(Message::Done)
        );
        handle.join().expect("worker thread");
    }

    #[test]
    fn signal_delivery_wakes_the_directive_wait() {
        let shutdown = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&shutdown))
            .expect("register flag");

        let (mut channel, theirs) = UnixStream::pair().expect("socketpair");
        let mut worker = Worker::over(
            theirs,
            "eth0".to_string(),
            ScriptedStats::new(vec!["up"]),
            RecordingLink::default(),
            Arc::clone(&shutdown),
        )
        .with_cadence(Duration::from_millis(1));
        let (tid_tx, tid_rx) = std::sync::mpsc::channel();
        let handle = std::thread::spawn(move || {
            tid_tx
                .send(nix::sys::pthread::pthread_self())
                .expect("report thread id");
            worker.run().expect("worker run is infallible here");
        });
        let tid = tid_rx.recv().expect("worker thread id");
        // Let the worker park itself in the directive wait first; no
        // directive ever goes out, so only signal delivery can wake it.
        std::thread::sleep(Duration::from_millis(20));
        nix::sys::pthread::pthread_kill(tid, nix::sys::signal::Signal::SIGUSR1)
            .expect("signal the worker thread");

        channel
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout");
        assert_eq!(
            read_frame(&mut channel).expect("frame").message(),
            Some(Message::Done)
        );
        handle.join().expect("worker thread");
    }

    #[test]
    fn supervisor_disappearing_ends_the_worker() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (channel, handle) = spawn_worker(vec!["up"], RecordingLink::default(), shutdown);
        drop(channel);
        handle.join().expect("worker exits on EOF");
    }
}
