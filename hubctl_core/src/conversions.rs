//! `From` implementations bridging `hubctl_config` types to `hubctl_core` types.

use std::time::Duration;

use crate::codec::SensorMode;
use crate::config::{
    ChannelBand, DirectionCfg, DispatcherCfg, MapperCfg, MotorCfg, RateBand, RgbBand,
    RuntimeCfg, SensorCfg, StabilizerCfg, TriggerAction, TriggerBinding, TriggerCfg,
};

const fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

const fn band((min, max): (u8, u8)) -> ChannelBand {
    ChannelBand::new(min, max)
}

// ── Hub ──────────────────────────────────────────────────────────────────────

impl From<hubctl_config::SensorMode> for SensorMode {
    fn from(m: hubctl_config::SensorMode) -> Self {
        match m {
            hubctl_config::SensorMode::Rgb => Self::Rgb,
            hubctl_config::SensorMode::ColorIndex => Self::ColorIndex,
        }
    }
}

impl From<&hubctl_config::HubCfg> for MotorCfg {
    fn from(c: &hubctl_config::HubCfg) -> Self {
        Self {
            port: c.motor_port,
            estop_ports: c.estop_ports.clone(),
            direct_mode: c.direct_mode,
            max_power: c.max_power,
            use_profile: c.use_profile,
        }
    }
}

impl From<&hubctl_config::HubCfg> for SensorCfg {
    fn from(c: &hubctl_config::HubCfg) -> Self {
        Self {
            port: c.color_sensor_port,
            mode: c.sensor_mode.into(),
        }
    }
}

// ── Dispatcher / stabilizer ──────────────────────────────────────────────────

impl From<&hubctl_config::Config> for DispatcherCfg {
    fn from(c: &hubctl_config::Config) -> Self {
        Self {
            motor_port: c.hub.motor_port,
            normal_wait: ms(c.dispatcher.normal_wait_ms),
        }
    }
}

impl From<&hubctl_config::StabilizerCfg> for StabilizerCfg {
    fn from(c: &hubctl_config::StabilizerCfg) -> Self {
        Self {
            enabled: c.enabled,
            threshold: c.threshold,
            capacity: c.capacity,
        }
    }
}

// ── Trigger ──────────────────────────────────────────────────────────────────

impl From<&hubctl_config::TriggerBinding> for TriggerBinding {
    fn from(b: &hubctl_config::TriggerBinding) -> Self {
        Self {
            name: b.name.clone(),
            band: RgbBand {
                red: band(b.red),
                green: band(b.green),
                blue: band(b.blue),
            },
            action: match b.action {
                hubctl_config::BindingAction::StopResume => TriggerAction::StopThenResume,
                hubctl_config::BindingAction::Stop => TriggerAction::Stop,
            },
        }
    }
}

impl From<&hubctl_config::TriggerCfg> for TriggerCfg {
    fn from(c: &hubctl_config::TriggerCfg) -> Self {
        Self {
            enabled: c.enabled,
            required: ms(c.required_ms),
            cooldown: ms(c.cooldown_ms),
            post_resume_block: ms(c.post_resume_block_ms),
            dwell: ms(c.dwell_ms),
            bindings: c.bindings.iter().map(TriggerBinding::from).collect(),
        }
    }
}

// ── Mapper / direction ───────────────────────────────────────────────────────

impl From<&hubctl_config::MapperCfg> for MapperCfg {
    fn from(c: &hubctl_config::MapperCfg) -> Self {
        Self {
            enabled: c.enabled,
            tick: ms(c.tick_ms),
            gain: c.gain,
            min_magnitude: c.min_magnitude,
            max_magnitude: c.max_magnitude,
            manual_override: ms(c.manual_override_ms),
            disconnect_after: ms(c.disconnect_after_ms),
            bands: c
                .bands
                .iter()
                .map(|b| RateBand::new(b.min, b.max, b.rate))
                .collect(),
        }
    }
}

impl From<&hubctl_config::DirectionCfg> for DirectionCfg {
    fn from(c: &hubctl_config::DirectionCfg) -> Self {
        Self {
            pause: ms(c.pause_ms),
        }
    }
}

// ── Whole config ─────────────────────────────────────────────────────────────

impl From<&hubctl_config::Config> for RuntimeCfg {
    fn from(c: &hubctl_config::Config) -> Self {
        Self {
            motor: (&c.hub).into(),
            sensor: (&c.hub).into(),
            dispatcher: c.into(),
            stabilizer: (&c.stabilizer).into(),
            trigger: (&c.trigger).into(),
            mapper: (&c.mapper).into(),
            direction: (&c.direction).into(),
        }
    }
}
