//! Analog input to incremental speed changes.
//!
//! Every tick the latest raw sample is classified into a signed rate
//! (speed units per second) by a band table, scaled by the gain and
//! integrated into an accumulator. Whole units leave the accumulator as a
//! step on the desired speed magnitude; the fractional remainder carries
//! over to the next tick. The direction (sign) is never changed here.
use std::time::{Duration, Instant};

use crate::config::{MapperCfg, RateBand};

/// Integrator state, reset whenever the analog source goes away.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MappingState {
    pub accumulator: f64,
    pub last_raw_sample: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Disabled,
    /// No sample seen yet.
    NoSample,
    Disconnected,
    ManualOverride,
    DirectionChange,
    /// The train is stopped; the mapper only adjusts a moving train.
    Stopped,
}

/// What the mapper sees on one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub now: Instant,
    /// Most recent raw sample, if a new one arrived since the last tick.
    pub sample: Option<i32>,
    pub source_connected: bool,
    pub direction_changing: bool,
    /// Current desired speed of the drive motor.
    pub desired: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Suppressed(SuppressReason),
    /// Nothing to send this tick.
    Hold,
    /// Submit `to` as the new speed.
    Adjust { from: i32, to: i32 },
}

#[derive(Debug, Clone)]
pub struct AnalogSpeedMapper {
    cfg: MapperCfg,
    state: MappingState,
    have_sample: bool,
    manual_until: Option<Instant>,
}

impl AnalogSpeedMapper {
    pub fn new(cfg: MapperCfg) -> Self {
        Self {
            cfg,
            state: MappingState::default(),
            have_sample: false,
            manual_until: None,
        }
    }

    pub fn state(&self) -> MappingState {
        self.state
    }

    pub fn tick_interval(&self) -> Duration {
        self.cfg.tick
    }

    /// Open the manual-override window starting at `now`.
    pub fn note_manual(&mut self, now: Instant) {
        self.manual_until = Some(now + self.cfg.manual_override);
    }

    /// Signed rate for `raw` in units per second, before gain. Unbanded values map to 0.
    pub fn rate_for(&self, raw: i32) -> f64 {
        let band: Option<&RateBand> = self.cfg.bands.iter().find(|b| raw >= b.min && raw <= b.max);
        let rate = band.map_or(0.0, |b| b.rate);
        tracing::trace!(
            raw,
            band_min = band.map(|b| b.min),
            band_max = band.map(|b| b.max),
            rate,
            "rate band select"
        );
        rate
    }

    pub fn tick(&mut self, input: TickInput) -> TickDecision {
        if let Some(raw) = input.sample {
            self.state.last_raw_sample = raw;
            self.have_sample = true;
        }
        let decision = self.decide(input);
        tracing::trace!(
            ?decision,
            raw = self.state.last_raw_sample,
            accumulator = self.state.accumulator,
            "mapper tick"
        );
        decision
    }

    fn decide(&mut self, input: TickInput) -> TickDecision {
        if !self.cfg.enabled {
            return TickDecision::Suppressed(SuppressReason::Disabled);
        }
        if !input.source_connected {
            self.state.accumulator = 0.0;
            return TickDecision::Suppressed(SuppressReason::Disconnected);
        }
        if !self.have_sample {
            return TickDecision::Suppressed(SuppressReason::NoSample);
        }
        if let Some(until) = self.manual_until {
            if input.now < until {
                return TickDecision::Suppressed(SuppressReason::ManualOverride);
            }
            self.manual_until = None;
        }
        if input.direction_changing {
            return TickDecision::Suppressed(SuppressReason::DirectionChange);
        }
        if input.desired == 0 {
            self.state.accumulator = 0.0;
            return TickDecision::Suppressed(SuppressReason::Stopped);
        }

        let rate = self.rate_for(self.state.last_raw_sample) * self.cfg.gain;
        self.state.accumulator += rate * self.cfg.tick.as_secs_f64();
        if self.state.accumulator.abs() < 1.0 {
            return TickDecision::Hold;
        }
        let whole = self.state.accumulator.trunc();
        self.state.accumulator -= whole;
        #[allow(clippy::cast_possible_truncation)]
        let step = whole as i32;

        let magnitude = input
            .desired
            .abs()
            .saturating_add(step)
            .clamp(self.cfg.min_magnitude, self.cfg.max_magnitude);
        let to = magnitude * input.desired.signum();
        if to == input.desired {
            TickDecision::Hold
        } else {
            TickDecision::Adjust {
                from: input.desired,
                to,
            }
        }
    }
}
