//! Trigger automation: runs [`TriggerMachine`] decisions against the dispatcher.
//!
//! A fired binding sends a priority stop immediately. For stop-then-resume
//! bindings the speed on the wire at that moment is remembered and restored
//! after the dwell through the [`Scheduler`]. The resume is a no-op when the
//! link is down or there was nothing to restore.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use hubctl_traits::{Clock, Scheduler, TimerHandle};

use crate::config::{MotorCfg, TriggerAction, TriggerCfg};
use crate::dispatcher::{DispatcherHandle, Tier};
use crate::link::LinkState;
use crate::trigger::{Outcome, TriggerMachine, TriggerState};

/// Observer for trigger state changes. Called outside any internal lock.
pub type TriggerObserver = Arc<dyn Fn(&TriggerState) + Send + Sync>;

struct Inner {
    machine: TriggerMachine,
    pending_resume: Option<TimerHandle>,
}

#[inline]
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct TriggerAutomation<C: Clock> {
    inner: Arc<Mutex<Inner>>,
    observers: Arc<Mutex<Vec<TriggerObserver>>>,
    dispatcher: DispatcherHandle,
    scheduler: Arc<dyn Scheduler>,
    link: LinkState,
    motor: MotorCfg,
    cfg: TriggerCfg,
    clock: C,
}

impl<C: Clock + Clone + Send + Sync + 'static> TriggerAutomation<C> {
    pub fn new(
        cfg: TriggerCfg,
        motor: MotorCfg,
        dispatcher: DispatcherHandle,
        scheduler: Arc<dyn Scheduler>,
        link: LinkState,
        clock: C,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                machine: TriggerMachine::new(&cfg),
                pending_resume: None,
            })),
            observers: Arc::new(Mutex::new(Vec::new())),
            dispatcher,
            scheduler,
            link,
            motor,
            cfg,
            clock,
        }
    }

    pub fn on_state(&self, observer: TriggerObserver) {
        lock(&self.observers).push(observer);
    }

    pub fn state(&self) -> TriggerState {
        lock(&self.inner).machine.state()
    }

    /// True while a stop-then-resume action waits for its resume.
    pub fn is_busy(&self) -> bool {
        lock(&self.inner).machine.is_busy()
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.inner).machine.is_enabled()
    }

    /// Feed one RGB reading from the sensor notification path.
    pub fn on_rgb(&self, r: u8, g: u8, b: u8) {
        let now = self.clock.now();
        let outcome = lock(&self.inner).machine.observe(r, g, b, now);
        self.publish(&outcome);
        if let Some(binding) = outcome.fired {
            self.act(binding);
        }
    }

    /// Apply window expiry between samples.
    pub fn poll(&self) {
        let outcome = lock(&self.inner).machine.poll(self.clock.now());
        self.publish(&outcome);
    }

    /// Enable or disable the automation. Disabling cancels a pending resume.
    pub fn set_enabled(&self, enabled: bool) {
        let outcome = {
            let mut g = lock(&self.inner);
            if !enabled && let Some(h) = g.pending_resume.take() {
                h.cancel();
            }
            g.machine.set_enabled(enabled)
        };
        tracing::info!(enabled, "trigger automation");
        self.publish(&outcome);
    }

    fn act(&self, binding: usize) {
        let Some(bd) = self.cfg.bindings.get(binding) else {
            return;
        };
        let resume_speed = self.dispatcher.current_speed().last_transmitted.unwrap_or(0);
        tracing::info!(binding = %bd.name, resume_speed, "color trigger; stopping");
        match self.motor.speed_command(0) {
            Ok(stop) => {
                if let Err(e) = self.dispatcher.enqueue(stop, Tier::Priority) {
                    tracing::warn!(error = %e, "trigger stop not queued");
                }
            }
            Err(e) => tracing::warn!(error = %e, "trigger stop invalid"),
        }
        if bd.action != TriggerAction::StopThenResume {
            return;
        }
        let this = self.clone();
        let handle = self.scheduler.schedule(
            self.cfg.dwell,
            Box::new(move || this.resume(resume_speed)),
        );
        if let Some(old) = lock(&self.inner).pending_resume.replace(handle) {
            old.cancel();
        }
    }

    fn resume(&self, speed: i32) {
        let now: Instant = self.clock.now();
        let mut g = lock(&self.inner);
        g.pending_resume = None;
        if !self.link.is_connected() {
            tracing::debug!(speed, "link down; resume skipped");
            g.machine.resume_skipped();
            return;
        }
        if speed == 0 {
            tracing::debug!("nothing to resume");
            g.machine.resume_skipped();
            return;
        }
        let queued = self
            .motor
            .speed_command(speed)
            .map_err(crate::error::HubError::from)
            .and_then(|cmd| self.dispatcher.enqueue(cmd, Tier::Priority));
        match queued {
            Ok(()) => {
                tracing::info!(speed, "resuming after trigger");
                let outcome = g.machine.resume_sent(now);
                drop(g);
                self.publish(&outcome);
            }
            Err(e) => {
                tracing::warn!(error = %e, speed, "resume not queued");
                g.machine.resume_skipped();
            }
        }
    }

    fn publish(&self, outcome: &Outcome) {
        if outcome.transitions.is_empty() {
            return;
        }
        let observers: Vec<TriggerObserver> = lock(&self.observers).clone();
        for state in &outcome.transitions {
            tracing::debug!(state = state.name(), "trigger");
            for obs in &observers {
                obs(state);
            }
        }
    }
}
