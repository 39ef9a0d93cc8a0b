//! Three-tier command arbitration in front of a single transport writer.
//!
//! Producers hold a cloneable [`DispatcherHandle`] and never touch the
//! transport. One [`DispatchLoop`] owns the transport and is the only place
//! that writes to it. Per iteration the loop:
//!
//! 1. drains the priority queue in FIFO order,
//! 2. sends the pending coalesced command (if any) and starts over,
//! 3. otherwise waits a bounded time for one normal-queue item.
//!
//! A priority speed command for the tracked motor port discards the pending
//! coalesced command. A shutdown sentinel on the normal queue ends the loop. Write failures are
//! logged and the command is dropped; nothing is retried.
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel as xch;
use hubctl_traits::{NotifyFn, Transport};

use crate::codec::{LogicalCommand, encode};
use crate::config::DispatcherCfg;
use crate::error::HubError;
use crate::format::hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Stops and direction changes; delivered before anything else.
    Priority,
    /// Single slot, latest wins.
    Coalesced,
    /// Diagnostics and info requests.
    Normal,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Priority => "priority",
            Self::Coalesced => "coalesced",
            Self::Normal => "normal",
        })
    }
}

/// Drive motor speed as requested and as last written to the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeedState {
    pub desired: i32,
    pub last_transmitted: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    pub write_failures: u64,
    /// Coalesced commands overwritten before they were sent.
    pub superseded: u64,
    /// Speed commands skipped because the wire already carries that speed.
    pub deduplicated: u64,
    /// Commands that failed to encode inside the loop.
    pub rejected: u64,
}

enum Envelope {
    Command(LogicalCommand),
    Shutdown,
}

enum Wake {
    Normal(Option<Envelope>),
    Signal(bool),
    Idle,
}

struct Shared {
    coalesced: Mutex<Option<LogicalCommand>>,
    speed: Mutex<SpeedState>,
    superseded: AtomicU64,
    closed: AtomicBool,
}

#[inline]
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe producer side of the dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    priority_tx: xch::Sender<LogicalCommand>,
    normal_tx: xch::Sender<Envelope>,
    wake_tx: xch::Sender<()>,
    shared: Arc<Shared>,
    motor_port: u8,
}

impl fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("motor_port", &self.motor_port)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl DispatcherHandle {
    /// Queue `cmd` on `tier`.
    ///
    /// Out-of-range commands are rejected here, synchronously, and never
    /// reach the queue.
    pub fn enqueue(&self, cmd: LogicalCommand, tier: Tier) -> Result<(), HubError> {
        cmd.validate()?;
        if self.is_closed() {
            return Err(HubError::Closed);
        }
        if let Some(speed) = cmd.speed_on(self.motor_port) {
            lock(&self.shared.speed).desired = speed;
        }
        tracing::trace!(%tier, command = %cmd, "enqueue");
        match tier {
            Tier::Priority => {
                if cmd.speed_on(self.motor_port).is_some()
                    && let Some(old) = lock(&self.shared.coalesced).take()
                {
                    // An older queued speed never lands after a priority speed.
                    self.shared.superseded.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(command = %old, "superseded by priority");
                }
                self.priority_tx.send(cmd).map_err(|_| HubError::Closed)?;
                self.wake();
            }
            Tier::Coalesced => {
                if let Some(old) = lock(&self.shared.coalesced).replace(cmd) {
                    self.shared.superseded.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(command = %old, "superseded");
                }
                self.wake();
            }
            Tier::Normal => {
                self.normal_tx
                    .send(Envelope::Command(cmd))
                    .map_err(|_| HubError::Closed)?;
            }
        }
        Ok(())
    }

    pub fn current_speed(&self) -> SpeedState {
        *lock(&self.shared.speed)
    }

    /// Ask the loop to stop once it reaches the sentinel. Later enqueues fail.
    pub fn shutdown(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            let _ = self.normal_tx.send(Envelope::Shutdown);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    #[inline]
    fn wake(&self) {
        // A full wake slot already guarantees another loop pass.
        let _ = self.wake_tx.try_send(());
    }
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Shutdown,
}

/// Consumer side; owns the transport.
pub struct DispatchLoop<T: Transport> {
    transport: T,
    priority_rx: xch::Receiver<LogicalCommand>,
    normal_rx: xch::Receiver<Envelope>,
    wake_rx: xch::Receiver<()>,
    shared: Arc<Shared>,
    cfg: DispatcherCfg,
    stats: DispatchStats,
}

impl<T: Transport> DispatchLoop<T> {
    /// Open the transport link before the loop starts.
    pub fn connect(&mut self, on_notify: NotifyFn) -> Result<(), HubError> {
        self.transport
            .connect(on_notify)
            .map_err(|e| HubError::Transport(e.to_string()))
    }

    /// Run one iteration.
    pub fn step(&mut self) -> Step {
        while let Ok(cmd) = self.priority_rx.try_recv() {
            self.transmit(cmd, Tier::Priority);
        }

        let pending = lock(&self.shared.coalesced).take();
        if let Some(cmd) = pending {
            self.transmit(cmd, Tier::Coalesced);
            return Step::Continue;
        }

        let woke = xch::select! {
            recv(self.normal_rx) -> msg => Wake::Normal(msg.ok()),
            recv(self.wake_rx) -> msg => Wake::Signal(msg.is_ok()),
            default(self.cfg.normal_wait) => Wake::Idle,
        };
        match woke {
            Wake::Normal(Some(Envelope::Command(cmd))) => self.transmit(cmd, Tier::Normal),
            Wake::Normal(Some(Envelope::Shutdown) | None) => {
                self.flush();
                return Step::Shutdown;
            }
            // Every handle is gone and nothing is left to send.
            Wake::Signal(false) if self.normal_rx.is_empty() && self.priority_rx.is_empty() => {
                return Step::Shutdown;
            }
            Wake::Signal(_) | Wake::Idle => {}
        }
        Step::Continue
    }

    /// Loop until the shutdown sentinel, then disconnect the transport.
    pub fn run(mut self) -> DispatchStats {
        tracing::debug!(motor_port = self.cfg.motor_port, "dispatcher started");
        while self.step() == Step::Continue {}
        if let Err(e) = self.transport.disconnect() {
            tracing::warn!(error = %e, "transport disconnect failed");
        }
        let stats = self.stats();
        tracing::info!(
            sent = stats.sent,
            write_failures = stats.write_failures,
            superseded = stats.superseded,
            deduplicated = stats.deduplicated,
            "dispatcher stopped"
        );
        stats
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            superseded: self.shared.superseded.load(Ordering::Relaxed),
            ..self.stats
        }
    }

    /// Send whatever producers queued before the sentinel arrived.
    fn flush(&mut self) {
        while let Ok(cmd) = self.priority_rx.try_recv() {
            self.transmit(cmd, Tier::Priority);
        }
        let pending = lock(&self.shared.coalesced).take();
        if let Some(cmd) = pending {
            self.transmit(cmd, Tier::Coalesced);
        }
    }

    fn transmit(&mut self, cmd: LogicalCommand, tier: Tier) {
        let motor_port = self.cfg.motor_port;
        let speed = cmd.speed_on(motor_port);
        if tier != Tier::Priority
            && speed.is_some()
            && speed == lock(&self.shared.speed).last_transmitted
        {
            self.stats.deduplicated += 1;
            tracing::trace!(%tier, command = %cmd, "speed unchanged; skipped");
            return;
        }

        let frame = match encode(&cmd) {
            Ok(f) => f,
            Err(e) => {
                self.stats.rejected += 1;
                tracing::warn!(error = %e, command = %cmd, "dropping invalid command");
                return;
            }
        };

        match self.transport.write(frame.as_bytes()) {
            Ok(()) => {
                self.stats.sent += 1;
                let mut state = lock(&self.shared.speed);
                if speed.is_some() {
                    state.last_transmitted = speed;
                } else if runs_to_completion_on(&cmd, motor_port) {
                    // The motor ends in its end state; any speed is worth resending.
                    state.last_transmitted = None;
                }
                drop(state);
                tracing::debug!(%tier, command = %cmd, frame = %hex(frame.as_bytes()), "sent");
            }
            Err(e) => {
                self.stats.write_failures += 1;
                tracing::warn!(error = %e, %tier, command = %cmd, "write failed; command dropped");
            }
        }
    }
}

fn runs_to_completion_on(cmd: &LogicalCommand, motor_port: u8) -> bool {
    matches!(
        cmd,
        LogicalCommand::SetSpeedForTime { port, .. } | LogicalCommand::SetSpeedForDegrees { port, .. }
            if *port == motor_port
    )
}

/// Create a connected producer handle and loop without spawning a thread.
pub fn channel<T: Transport>(transport: T, cfg: DispatcherCfg) -> (DispatcherHandle, DispatchLoop<T>) {
    let (priority_tx, priority_rx) = xch::unbounded();
    let (normal_tx, normal_rx) = xch::unbounded();
    let (wake_tx, wake_rx) = xch::bounded(1);
    let shared = Arc::new(Shared {
        coalesced: Mutex::new(None),
        speed: Mutex::new(SpeedState::default()),
        superseded: AtomicU64::new(0),
        closed: AtomicBool::new(false),
    });
    let handle = DispatcherHandle {
        priority_tx,
        normal_tx,
        wake_tx,
        shared: shared.clone(),
        motor_port: cfg.motor_port,
    };
    let dispatch_loop = DispatchLoop {
        transport,
        priority_rx,
        normal_rx,
        wake_rx,
        shared,
        cfg,
        stats: DispatchStats::default(),
    };
    (handle, dispatch_loop)
}

/// Dispatcher running on its own thread.
///
/// Dropping it sends the shutdown sentinel and joins the thread.
pub struct Dispatcher {
    handle: DispatcherHandle,
    join_handle: Option<JoinHandle<DispatchStats>>,
}

impl Dispatcher {
    pub fn spawn<T: Transport + Send + 'static>(
        transport: T,
        cfg: DispatcherCfg,
    ) -> std::io::Result<Self> {
        let (handle, dispatch_loop) = channel(transport, cfg);
        Self::start(handle, dispatch_loop)
    }

    /// Move a pair made by [`channel`] onto its own thread.
    pub fn start<T: Transport + Send + 'static>(
        handle: DispatcherHandle,
        dispatch_loop: DispatchLoop<T>,
    ) -> std::io::Result<Self> {
        let join_handle = std::thread::Builder::new()
            .name("hub-dispatch".into())
            .spawn(move || dispatch_loop.run())?;
        Ok(Self {
            handle,
            join_handle: Some(join_handle),
        })
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Stop after everything queued ahead of the sentinel and return the totals.
    pub fn shutdown(mut self) -> DispatchStats {
        self.handle.shutdown();
        self.join().unwrap_or_default()
    }

    fn join(&mut self) -> Option<DispatchStats> {
        let handle = self.join_handle.take()?;
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(?e, "dispatcher thread panicked");
                None
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.handle.shutdown();
        let _ = self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingTransport;
    use rstest::rstest;

    fn speed(port: u8, s: i32) -> LogicalCommand {
        LogicalCommand::set_speed(port, s)
    }

    #[test]
    fn priority_coalesced_normal_ordering() {
        let transport = RecordingTransport::new();
        let log = transport.log();
        let (h, l) = channel(transport, DispatcherCfg::default());
        let a = LogicalCommand::set_speed(0, 0);
        let b = speed(0, 40);
        let c = speed(0, 50);
        let d = LogicalCommand::request_hub_name();
        h.enqueue(a.clone(), Tier::Priority).unwrap();
        h.enqueue(b, Tier::Coalesced).unwrap();
        h.enqueue(c.clone(), Tier::Coalesced).unwrap();
        h.enqueue(d.clone(), Tier::Normal).unwrap();
        h.shutdown();
        let stats = l.run();

        let expect: Vec<Vec<u8>> = [a, c, d]
            .iter()
            .map(|cmd| encode(cmd).unwrap().into_vec())
            .collect();
        assert_eq!(log.frames(), expect);
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.superseded, 1);
    }

    #[test]
    fn priority_speed_drops_pending_coalesced_speed() {
        let transport = RecordingTransport::new();
        let log = transport.log();
        let (h, l) = channel(transport, DispatcherCfg::default());
        h.enqueue(speed(0, 45), Tier::Coalesced).unwrap();
        h.enqueue(speed(0, 0), Tier::Priority).unwrap();
        h.shutdown();
        let stats = l.run();
        assert_eq!(log.frames(), vec![encode(&speed(0, 0)).unwrap().into_vec()]);
        assert_eq!(stats.superseded, 1);
    }

    #[rstest]
    #[case::motor_speed(speed(0, 0), false)]
    #[case::other_port_speed(speed(1, 0), true)]
    #[case::led(LogicalCommand::SetHubLed { color: 9 }, true)]
    fn priority_after_pending_coalesced_speed(
        #[case] urgent: LogicalCommand,
        #[case] pending_survives: bool,
    ) {
        let transport = RecordingTransport::new();
        let log = transport.log();
        let (h, mut l) = channel(transport, DispatcherCfg::default());
        let queued = speed(0, 45);
        h.enqueue(queued.clone(), Tier::Coalesced).unwrap();
        h.enqueue(urgent.clone(), Tier::Priority).unwrap();
        assert_eq!(l.step(), Step::Continue);
        assert_eq!(l.step(), Step::Continue);

        let mut expect = vec![encode(&urgent).unwrap().into_vec()];
        if pending_survives {
            expect.push(encode(&queued).unwrap().into_vec());
        }
        assert_eq!(log.frames(), expect);
        assert_eq!(l.stats().superseded, u64::from(!pending_survives));
        let on_wire = if pending_survives { 45 } else { 0 };
        assert_eq!(h.current_speed().last_transmitted, Some(on_wire));
    }

    #[test]
    fn coalesced_repeat_of_transmitted_speed_is_skipped() {
        let transport = RecordingTransport::new();
        let log = transport.log();
        let (h, mut l) = channel(transport, DispatcherCfg::default());
        h.enqueue(speed(0, 60), Tier::Coalesced).unwrap();
        assert_eq!(l.step(), Step::Continue);
        h.enqueue(speed(0, 60), Tier::Coalesced).unwrap();
        assert_eq!(l.step(), Step::Continue);
        assert_eq!(log.frames().len(), 1);
        assert_eq!(l.stats().deduplicated, 1);
        assert_eq!(
            h.current_speed(),
            SpeedState {
                desired: 60,
                last_transmitted: Some(60)
            }
        );
    }

    #[test]
    fn priority_bypasses_speed_dedup() {
        let transport = RecordingTransport::new();
        let log = transport.log();
        let (h, mut l) = channel(transport, DispatcherCfg::default());
        h.enqueue(speed(0, 0), Tier::Priority).unwrap();
        h.enqueue(speed(0, 0), Tier::Priority).unwrap();
        l.step();
        assert_eq!(log.frames().len(), 2);
    }

    #[test]
    fn write_failure_is_counted_and_loop_continues() {
        let transport = RecordingTransport::failing_first(1);
        let log = transport.log();
        let (h, l) = channel(transport, DispatcherCfg::default());
        h.enqueue(speed(0, 30), Tier::Priority).unwrap();
        h.enqueue(speed(0, 35), Tier::Priority).unwrap();
        h.shutdown();
        let stats = l.run();
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(log.frames(), vec![encode(&speed(0, 35)).unwrap().into_vec()]);
        // The failed write never reached the wire.
        assert_eq!(h.current_speed().last_transmitted, Some(35));
    }

    #[test]
    fn enqueue_after_shutdown_is_rejected() {
        let (h, _l) = channel(RecordingTransport::new(), DispatcherCfg::default());
        h.shutdown();
        assert!(matches!(
            h.enqueue(speed(0, 10), Tier::Normal),
            Err(HubError::Closed)
        ));
    }

    #[test]
    fn invalid_command_is_rejected_synchronously() {
        let (h, l) = channel(RecordingTransport::new(), DispatcherCfg::default());
        assert!(matches!(
            h.enqueue(speed(0, 101), Tier::Coalesced),
            Err(HubError::Validation(_))
        ));
        h.shutdown();
        assert_eq!(l.run().sent, 0);
    }

    #[test]
    fn timed_run_forgets_last_transmitted_speed() {
        let transport = RecordingTransport::new();
        let (h, mut l) = channel(transport, DispatcherCfg::default());
        h.enqueue(speed(0, 50), Tier::Coalesced).unwrap();
        l.step();
        let timed = LogicalCommand::SetSpeedForTime {
            port: 0,
            speed: 50,
            max_power: 100,
            use_profile: 0,
            time_ms: 1000,
            end_state: crate::codec::EndState::Brake,
        };
        h.enqueue(timed, Tier::Priority).unwrap();
        l.step();
        assert_eq!(h.current_speed().last_transmitted, None);
    }

    #[test]
    fn spawned_dispatcher_drains_before_stopping() {
        let transport = RecordingTransport::new();
        let log = transport.log();
        let d = Dispatcher::spawn(transport, DispatcherCfg::default()).unwrap();
        let h = d.handle();
        for i in 0..5 {
            h.enqueue(
                LogicalCommand::RequestPortInfo {
                    port: i,
                    info_type: 1,
                },
                Tier::Normal,
            )
            .unwrap();
        }
        let stats = d.shutdown();
        assert_eq!(stats.sent, 5);
        assert_eq!(log.frames().len(), 5);
    }
}
