//! Runtime configuration for the hub control pipeline.
//!
//! These are the structs the core components consume. They are separate from
//! the TOML schema in `hubctl_config`; see `conversions` for the bridge.

use std::time::Duration;

use crate::codec::command::MAX_POWER_LIMIT;
use crate::codec::{LogicalCommand, SensorMode};
use crate::error::ValidationError;

/// Drive motor addressing and the wire style used for speed changes.
#[derive(Debug, Clone)]
pub struct MotorCfg {
    pub port: u8,
    /// Ports stopped by an emergency stop.
    pub estop_ports: Vec<u8>,
    /// Send speeds as WriteDirectModeData instead of StartSpeed.
    pub direct_mode: bool,
    pub max_power: u8,
    pub use_profile: u8,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            port: 0,
            estop_ports: vec![0, 1, 2],
            direct_mode: true,
            max_power: MAX_POWER_LIMIT,
            use_profile: 0,
        }
    }
}

impl MotorCfg {
    /// Speed command for the drive motor in the configured style.
    pub fn speed_command(&self, speed: i32) -> Result<LogicalCommand, ValidationError> {
        self.speed_command_on(self.port, speed)
    }

    pub fn speed_command_on(&self, port: u8, speed: i32) -> Result<LogicalCommand, ValidationError> {
        if self.direct_mode {
            LogicalCommand::direct_speed(port, speed)
        } else {
            let cmd = LogicalCommand::SetSpeed {
                port,
                speed,
                max_power: self.max_power,
                use_profile: self.use_profile,
            };
            cmd.validate()?;
            Ok(cmd)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SensorCfg {
    pub port: u8,
    pub mode: SensorMode,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            port: 0x12,
            mode: SensorMode::Rgb,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatcherCfg {
    /// Port whose speed is tracked for redundant-write suppression.
    pub motor_port: u8,
    /// Bounded wait on the normal queue before idling.
    pub normal_wait: Duration,
}

impl Default for DispatcherCfg {
    fn default() -> Self {
        Self {
            motor_port: 0,
            normal_wait: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StabilizerCfg {
    pub enabled: bool,
    pub threshold: usize,
    pub capacity: usize,
}

impl Default for StabilizerCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: crate::stabilizer::DEFAULT_THRESHOLD,
            capacity: crate::stabilizer::DEFAULT_CAPACITY,
        }
    }
}

/// Inclusive 8-bit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBand {
    pub min: u8,
    pub max: u8,
}

impl ChannelBand {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    #[inline]
    pub const fn contains(self, v: u8) -> bool {
        v >= self.min && v <= self.max
    }

    pub const fn midpoint(self) -> u8 {
        self.min.midpoint(self.max)
    }
}

/// Per-channel band test used to classify an RGB reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbBand {
    pub red: ChannelBand,
    pub green: ChannelBand,
    pub blue: ChannelBand,
}

impl RgbBand {
    #[inline]
    pub const fn contains(&self, r: u8, g: u8, b: u8) -> bool {
        self.red.contains(r) && self.green.contains(g) && self.blue.contains(b)
    }

    /// A reading in the middle of every channel band.
    pub const fn midpoint(&self) -> (u8, u8, u8) {
        (self.red.midpoint(), self.green.midpoint(), self.blue.midpoint())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerAction {
    /// Stop, then restore the previous speed after the dwell.
    #[default]
    StopThenResume,
    /// Stop and stay stopped.
    Stop,
}

#[derive(Debug, Clone)]
pub struct TriggerBinding {
    pub name: String,
    pub band: RgbBand,
    pub action: TriggerAction,
}

#[derive(Debug, Clone)]
pub struct TriggerCfg {
    pub enabled: bool,
    /// How long a match must persist before acting.
    pub required: Duration,
    pub cooldown: Duration,
    pub post_resume_block: Duration,
    /// Stop length before the resume fires.
    pub dwell: Duration,
    pub bindings: Vec<TriggerBinding>,
}

impl Default for TriggerCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            required: Duration::from_millis(150),
            cooldown: Duration::from_millis(3000),
            post_resume_block: Duration::from_millis(2000),
            dwell: Duration::from_millis(2000),
            bindings: vec![TriggerBinding {
                name: "red".to_string(),
                band: RgbBand {
                    red: ChannelBand::new(120, 255),
                    green: ChannelBand::new(0, 70),
                    blue: ChannelBand::new(0, 70),
                },
                action: TriggerAction::StopThenResume,
            }],
        }
    }
}

/// Inclusive raw-sample range mapped to a signed rate in speed units per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBand {
    pub min: i32,
    pub max: i32,
    pub rate: f64,
}

impl RateBand {
    pub const fn new(min: i32, max: i32, rate: f64) -> Self {
        Self { min, max, rate }
    }
}

#[derive(Debug, Clone)]
pub struct MapperCfg {
    pub enabled: bool,
    pub tick: Duration,
    pub gain: f64,
    pub min_magnitude: i32,
    pub max_magnitude: i32,
    /// Mapper stays quiet this long after a manual speed change.
    pub manual_override: Duration,
    /// The analog source counts as disconnected after this long without a sample.
    pub disconnect_after: Duration,
    /// Raw ranges not covered by any band map to rate 0.
    pub bands: Vec<RateBand>,
}

impl Default for MapperCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            tick: Duration::from_millis(200),
            gain: 1.0,
            min_magnitude: 30,
            max_magnitude: 100,
            manual_override: Duration::from_millis(1500),
            disconnect_after: Duration::from_millis(1000),
            bands: vec![
                RateBand::new(0, 299, -10.0),
                RateBand::new(300, 449, -5.0),
                RateBand::new(450, 574, 0.0),
                RateBand::new(575, 724, 5.0),
                RateBand::new(725, 1023, 10.0),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DirectionCfg {
    /// Pause between the stop and the reversed restart.
    pub pause: Duration,
}

impl Default for DirectionCfg {
    fn default() -> Self {
        Self {
            pause: Duration::from_millis(400),
        }
    }
}

/// Everything the `Hub` needs, with defaults for every part.
#[derive(Debug, Clone, Default)]
pub struct RuntimeCfg {
    pub motor: MotorCfg,
    pub sensor: SensorCfg,
    pub dispatcher: DispatcherCfg,
    pub stabilizer: StabilizerCfg,
    pub trigger: TriggerCfg,
    pub mapper: MapperCfg,
    pub direction: DirectionCfg,
}
