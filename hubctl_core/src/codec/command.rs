//! Outbound logical commands and protocol constants.

use crate::error::ValidationError;

/// Hub id carried in every frame; multi-hub addressing is not used.
pub const HUB_ID: u8 = 0x00;

/// Message type bytes (frame offset 2).
pub mod msg {
    pub const HUB_PROPERTIES: u8 = 0x01;
    pub const HUB_ACTIONS: u8 = 0x02;
    pub const HUB_ALERTS: u8 = 0x03;
    pub const HUB_ATTACHED_IO: u8 = 0x04;
    pub const GENERIC_ERROR: u8 = 0x05;
    pub const PORT_INFO_REQUEST: u8 = 0x21;
    pub const PORT_INPUT_FORMAT_SETUP: u8 = 0x41;
    pub const PORT_VALUE: u8 = 0x43;
    pub const PORT_VALUE_COMBINED: u8 = 0x44;
    pub const PORT_VALUE_SINGLE: u8 = 0x45;
    pub const PORT_INPUT_FORMAT: u8 = 0x47;
    pub const PORT_OUTPUT_COMMAND: u8 = 0x81;
    pub const PORT_OUTPUT_FEEDBACK: u8 = 0x82;
}

/// Port output sub-commands.
pub mod sub {
    pub const START_SPEED: u8 = 0x07;
    pub const START_SPEED_FOR_TIME: u8 = 0x09;
    pub const START_SPEED_FOR_DEGREES: u8 = 0x0B;
    pub const WRITE_DIRECT_MODE_DATA: u8 = 0x51;
}

/// Hub action codes.
pub mod hub_action {
    pub const DISCONNECT: u8 = 0x02;
    pub const SHUTDOWN: u8 = 0x2F;
    pub const VCC_PORT_ON: u8 = 0x30;
    pub const VCC_PORT_OFF: u8 = 0x31;
}

/// Startup/completion byte: execute immediately, request feedback.
pub const STARTUP_IMMEDIATE_FEEDBACK: u8 = 0x11;
/// Virtual port of the hub status LED.
pub const HUB_LED_PORT: u8 = 0x32;
/// Mode used for motor speed and LED color in direct-mode writes.
pub const DIRECT_SPEED_MODE: u8 = 0x00;
/// Hub property: advertising name.
pub const PROPERTY_ADVERTISING_NAME: u8 = 0x01;
/// Hub property operation: request an update.
pub const PROPERTY_REQUEST_UPDATE: u8 = 0x05;

pub const SPEED_MIN: i32 = -100;
pub const SPEED_MAX: i32 = 100;
pub const MAX_POWER_LIMIT: u8 = 100;

/// What the motor does once a timed or angle-limited run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndState {
    Float,
    Hold,
    #[default]
    Brake,
}

impl EndState {
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Float => 0,
            Self::Hold => 126,
            Self::Brake => 127,
        }
    }

    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Float),
            126 => Some(Self::Hold),
            127 => Some(Self::Brake),
            _ => None,
        }
    }
}

/// A command a producer wants delivered to the hub.
///
/// Byte-sized fields are range-checked by their type; `speed` and
/// `max_power` are checked by [`LogicalCommand::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalCommand {
    SetSpeed {
        port: u8,
        speed: i32,
        max_power: u8,
        use_profile: u8,
    },
    SetSpeedForTime {
        port: u8,
        speed: i32,
        max_power: u8,
        use_profile: u8,
        time_ms: u16,
        end_state: EndState,
    },
    SetSpeedForDegrees {
        port: u8,
        speed: i32,
        max_power: u8,
        use_profile: u8,
        degrees: i32,
        end_state: EndState,
    },
    WriteDirectMode {
        port: u8,
        mode: u8,
        data: Vec<u8>,
    },
    SetHubLed {
        color: u8,
    },
    HubAction {
        action: u8,
    },
    RequestPortInfo {
        port: u8,
        info_type: u8,
    },
    SetPortInputFormat {
        port: u8,
        mode: u8,
        delta: u32,
        notify: bool,
    },
    RequestHubProperty {
        property: u8,
        operation: u8,
    },
}

impl LogicalCommand {
    /// StartSpeed at full power without acceleration profile.
    pub fn set_speed(port: u8, speed: i32) -> Self {
        Self::SetSpeed {
            port,
            speed,
            max_power: MAX_POWER_LIMIT,
            use_profile: 0,
        }
    }

    /// Speed written as a single signed byte through WriteDirectModeData.
    pub fn direct_speed(port: u8, speed: i32) -> Result<Self, ValidationError> {
        check_speed(speed)?;
        Ok(Self::WriteDirectMode {
            port,
            mode: DIRECT_SPEED_MODE,
            data: vec![signed_byte(speed)],
        })
    }

    /// Request the hub's advertising name.
    pub fn request_hub_name() -> Self {
        Self::RequestHubProperty {
            property: PROPERTY_ADVERTISING_NAME,
            operation: PROPERTY_REQUEST_UPDATE,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::SetSpeed {
                speed, max_power, ..
            }
            | Self::SetSpeedForTime {
                speed, max_power, ..
            }
            | Self::SetSpeedForDegrees {
                speed, max_power, ..
            } => {
                check_speed(*speed)?;
                if *max_power > MAX_POWER_LIMIT {
                    return Err(ValidationError::MaxPower(*max_power));
                }
                Ok(())
            }
            Self::WriteDirectMode { data, .. } if data.is_empty() => {
                Err(ValidationError::EmptyModeData)
            }
            _ => Ok(()),
        }
    }

    /// Speed this command sets on `port`, if it is a plain speed command.
    ///
    /// Timed and angle-limited runs are not counted: they end on their own.
    pub fn speed_on(&self, motor_port: u8) -> Option<i32> {
        match self {
            Self::SetSpeed { port, speed, .. } if *port == motor_port => Some(*speed),
            Self::WriteDirectMode { port, mode, data }
                if *port == motor_port && *mode == DIRECT_SPEED_MODE && data.len() == 1 =>
            {
                Some(i32::from(i8::from_le_bytes([data[0]])))
            }
            _ => None,
        }
    }
}

#[inline]
fn check_speed(speed: i32) -> Result<(), ValidationError> {
    if (SPEED_MIN..=SPEED_MAX).contains(&speed) {
        Ok(())
    } else {
        Err(ValidationError::Speed(speed))
    }
}

/// Two's-complement byte of a small signed value: `(v + 256) mod 256`.
#[inline]
pub fn signed_byte(v: i32) -> u8 {
    // rem_euclid keeps the result in 0..256 for negative inputs.
    u8::try_from(v.rem_euclid(256)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0x00)]
    #[case(50, 0x32)]
    #[case(-1, 0xFF)]
    #[case(-100, 0x9C)]
    #[case(100, 0x64)]
    fn signed_byte_is_twos_complement(#[case] v: i32, #[case] expect: u8) {
        assert_eq!(signed_byte(v), expect);
    }

    #[test]
    fn direct_speed_rejects_out_of_range() {
        assert_eq!(
            LogicalCommand::direct_speed(0, 101),
            Err(ValidationError::Speed(101))
        );
    }

    #[test]
    fn speed_on_reads_back_direct_mode_byte() {
        let cmd = LogicalCommand::direct_speed(0, -40).unwrap();
        assert_eq!(cmd.speed_on(0), Some(-40));
        assert_eq!(cmd.speed_on(1), None);
        let led = LogicalCommand::SetHubLed { color: 3 };
        assert_eq!(led.speed_on(HUB_LED_PORT), None);
    }

    #[test]
    fn end_state_bytes() {
        for s in [EndState::Float, EndState::Hold, EndState::Brake] {
            assert_eq!(EndState::from_byte(s.as_byte()), Some(s));
        }
        assert_eq!(EndState::default().as_byte(), 127);
    }
}
