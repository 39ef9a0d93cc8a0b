//! Test and helper doubles for hubctl_core.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use hubctl_traits::{
    AnalogEvent, AnalogSource, BoxError, Clock, NotifyFn, Scheduler, Task, TimerHandle, Transport,
};

/// Shared view of the frames a [`RecordingTransport`] accepted.
#[derive(Debug, Clone, Default)]
pub struct FrameLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl FrameLog {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.0.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, frame: &[u8]) {
        if let Ok(mut g) = self.0.lock() {
            g.push(frame.to_vec());
        }
    }
}

/// Transport that records every written frame; optionally fails the first N writes.
#[derive(Default)]
pub struct RecordingTransport {
    log: FrameLog,
    fail_next: usize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            log: FrameLog::default(),
            fail_next: n,
        }
    }

    pub fn log(&self) -> FrameLog {
        self.log.clone()
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self, _on_notify: NotifyFn) -> Result<(), BoxError> {
        Ok(())
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), BoxError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(Box::new(std::io::Error::other("simulated write failure")));
        }
        self.log.push(frame);
        Ok(())
    }
}

struct Pending {
    due: Instant,
    handle: TimerHandle,
    task: Task,
}

/// Scheduler whose tasks only run when the test calls [`ManualScheduler::run_due`].
///
/// Due times are taken from the supplied clock, so pairing it with a
/// manually advanced clock gives fully deterministic timers.
#[derive(Clone)]
pub struct ManualScheduler<C: Clock> {
    clock: C,
    pending: Arc<Mutex<Vec<Pending>>>,
}

impl<C: Clock> ManualScheduler<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run every non-cancelled task whose due time has passed. Returns how many ran.
    pub fn run_due(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<Pending> = {
            let mut g = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let (ready, keep): (Vec<Pending>, Vec<Pending>) = std::mem::take(&mut *g)
                .into_iter()
                .partition(|p| p.due <= now);
            *g = keep;
            ready
        };
        let mut ran = 0;
        for p in due {
            if !p.handle.is_cancelled() {
                (p.task)();
                ran += 1;
            }
        }
        ran
    }

    /// Tasks still waiting (cancelled ones included until their due time).
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|g| g.len()).unwrap_or(0)
    }
}

impl<C: Clock + Send + Sync> Scheduler for ManualScheduler<C> {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let entry = Pending {
            due: self.clock.now() + delay,
            handle: handle.clone(),
            task,
        };
        if let Ok(mut g) = self.pending.lock() {
            g.push(entry);
        }
        handle
    }
}

/// Analog source replaying a fixed script, then reporting timeouts.
pub struct ScriptedAnalog {
    events: VecDeque<AnalogEvent>,
}

impl ScriptedAnalog {
    pub fn new(events: impl IntoIterator<Item = AnalogEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

impl AnalogSource for ScriptedAnalog {
    fn read(&mut self, timeout: Duration) -> Result<AnalogEvent, BoxError> {
        match self.events.pop_front() {
            Some(ev) => Ok(ev),
            None => {
                std::thread::sleep(timeout);
                Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "script exhausted",
                )))
            }
        }
    }
}
