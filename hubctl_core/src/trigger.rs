//! Detect-sustain-act-cooldown state machine over RGB readings.
//!
//! Pure: the caller supplies `now` and performs the emitted actions. See
//! [`crate::automation::TriggerAutomation`] for the wiring to the dispatcher
//! and the resume timer.

use std::time::{Duration, Instant};

use crate::config::{TriggerAction, TriggerBinding, TriggerCfg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    /// A binding has matched continuously since `since`.
    Detecting { since: Instant, binding: usize },
    /// Transient: reported to observers, never stored.
    Triggered { binding: usize },
    Cooldown { until: Instant },
    PostResumeBlocked { until: Instant },
}

impl TriggerState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Detecting { .. } => "detecting",
            Self::Triggered { .. } => "triggered",
            Self::Cooldown { .. } => "cooldown",
            Self::PostResumeBlocked { .. } => "post-resume-blocked",
        }
    }
}

/// What one call changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// States entered, in order.
    pub transitions: Vec<TriggerState>,
    /// Binding index whose action must run now.
    pub fired: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TriggerMachine {
    required: Duration,
    cooldown: Duration,
    post_resume_block: Duration,
    bindings: Vec<TriggerBinding>,
    state: TriggerState,
    enabled: bool,
    /// An action is still running (stopped, waiting for the resume).
    busy: bool,
}

impl TriggerMachine {
    pub fn new(cfg: &TriggerCfg) -> Self {
        Self {
            required: cfg.required,
            cooldown: cfg.cooldown,
            post_resume_block: cfg.post_resume_block,
            bindings: cfg.bindings.clone(),
            state: TriggerState::Idle,
            enabled: cfg.enabled,
            busy: false,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn binding(&self, index: usize) -> Option<&TriggerBinding> {
        self.bindings.get(index)
    }

    /// Enable or disable classification. Disabling drops any detection in progress.
    pub fn set_enabled(&mut self, enabled: bool) -> Outcome {
        let mut out = Outcome::default();
        self.enabled = enabled;
        if !enabled {
            self.busy = false;
            self.enter(TriggerState::Idle, &mut out);
        }
        out
    }

    /// Apply timer expiry without a sample.
    pub fn poll(&mut self, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        self.expire(now, &mut out);
        out
    }

    /// Evaluate one RGB sample.
    pub fn observe(&mut self, r: u8, g: u8, b: u8, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        self.expire(now, &mut out);
        if !self.enabled || self.busy {
            return out;
        }
        match self.state {
            // Blocked windows swallow samples until they expire.
            TriggerState::Cooldown { .. } | TriggerState::PostResumeBlocked { .. } => {}
            TriggerState::Idle | TriggerState::Triggered { .. } => {
                if let Some(i) = self.matching(r, g, b) {
                    self.enter(TriggerState::Detecting { since: now, binding: i }, &mut out);
                }
            }
            TriggerState::Detecting { since, binding } => {
                if self.bindings[binding].band.contains(r, g, b) {
                    if now.saturating_duration_since(since) >= self.required {
                        self.fire(binding, now, &mut out);
                    }
                } else {
                    self.enter(TriggerState::Idle, &mut out);
                    if let Some(i) = self.matching(r, g, b) {
                        self.enter(TriggerState::Detecting { since: now, binding: i }, &mut out);
                    }
                }
            }
        }
        out
    }

    /// The resume was sent at `now`; block re-triggering for a while.
    pub fn resume_sent(&mut self, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        self.busy = false;
        self.enter(
            TriggerState::PostResumeBlocked {
                until: now + self.post_resume_block,
            },
            &mut out,
        );
        out
    }

    /// The resume was skipped (link down or nothing to resume).
    pub fn resume_skipped(&mut self) {
        self.busy = false;
    }

    fn fire(&mut self, binding: usize, now: Instant, out: &mut Outcome) {
        out.transitions.push(TriggerState::Triggered { binding });
        out.fired = Some(binding);
        self.busy = self.bindings[binding].action == TriggerAction::StopThenResume;
        self.enter(
            TriggerState::Cooldown {
                until: now + self.cooldown,
            },
            out,
        );
    }

    fn expire(&mut self, now: Instant, out: &mut Outcome) {
        if let TriggerState::Cooldown { until } | TriggerState::PostResumeBlocked { until } =
            self.state
            && now >= until
        {
            self.enter(TriggerState::Idle, out);
        }
    }

    fn matching(&self, r: u8, g: u8, b: u8) -> Option<usize> {
        self.bindings.iter().position(|bd| bd.band.contains(r, g, b))
    }

    fn enter(&mut self, next: TriggerState, out: &mut Outcome) {
        if self.state != next {
            tracing::trace!(from = self.state.name(), to = next.name(), "trigger state");
            self.state = next;
            out.transitions.push(next);
        }
    }
}
