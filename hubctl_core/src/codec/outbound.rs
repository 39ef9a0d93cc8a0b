//! Reader for frames this crate sends: the inverse of [`super::encode`].
//!
//! Used to render captured outbound traffic. A direct-mode write of one byte
//! to the hub LED port in mode 0 reads back as [`LogicalCommand::SetHubLed`].

use super::command::{DIRECT_SPEED_MODE, EndState, HUB_LED_PORT, LogicalCommand, msg, sub};
use crate::error::DecodeError;

/// Parse one outbound frame back into the command that produced it.
///
/// Returns `Ok(None)` for message types this crate never sends, for a length
/// byte that disagrees with the slice, and for layouts of the wrong size.
pub fn decode_command(bytes: &[u8]) -> Result<Option<LogicalCommand>, DecodeError> {
    if bytes.len() < 3 {
        return Err(DecodeError::TooShort {
            needed: 3,
            got: bytes.len(),
        });
    }
    if usize::from(bytes[0]) != bytes.len() {
        return Ok(None);
    }
    let b = bytes;
    let cmd = match (b[2], b.len()) {
        (msg::PORT_OUTPUT_COMMAND, n) if n >= 6 => output_command(b),
        (msg::HUB_ACTIONS, 4) => Some(LogicalCommand::HubAction { action: b[3] }),
        (msg::PORT_INFO_REQUEST, 5) => Some(LogicalCommand::RequestPortInfo {
            port: b[3],
            info_type: b[4],
        }),
        (msg::PORT_INPUT_FORMAT_SETUP, 10) => Some(LogicalCommand::SetPortInputFormat {
            port: b[3],
            mode: b[4],
            delta: u32::from_le_bytes([b[5], b[6], b[7], b[8]]),
            notify: b[9] != 0,
        }),
        (msg::HUB_PROPERTIES, 5) => Some(LogicalCommand::RequestHubProperty {
            property: b[3],
            operation: b[4],
        }),
        _ => None,
    };
    Ok(cmd)
}

#[inline]
fn speed(b: u8) -> i32 {
    i32::from(i8::from_ne_bytes([b]))
}

// [len, hub, 0x81, port, startup, subcommand, ...]
fn output_command(b: &[u8]) -> Option<LogicalCommand> {
    let port = b[3];
    let body = &b[6..];
    match (b[5], body) {
        (sub::START_SPEED, &[s, max_power, use_profile]) => Some(LogicalCommand::SetSpeed {
            port,
            speed: speed(s),
            max_power,
            use_profile,
        }),
        (sub::START_SPEED_FOR_TIME, &[t0, t1, s, max_power, end, use_profile]) => {
            Some(LogicalCommand::SetSpeedForTime {
                port,
                speed: speed(s),
                max_power,
                use_profile,
                time_ms: u16::from_le_bytes([t0, t1]),
                end_state: EndState::from_byte(end)?,
            })
        }
        (sub::START_SPEED_FOR_DEGREES, &[d0, d1, d2, d3, s, max_power, end, use_profile]) => {
            Some(LogicalCommand::SetSpeedForDegrees {
                port,
                speed: speed(s),
                max_power,
                use_profile,
                degrees: i32::from_le_bytes([d0, d1, d2, d3]),
                end_state: EndState::from_byte(end)?,
            })
        }
        (sub::WRITE_DIRECT_MODE_DATA, &[DIRECT_SPEED_MODE, color]) if port == HUB_LED_PORT => {
            Some(LogicalCommand::SetHubLed { color })
        }
        (sub::WRITE_DIRECT_MODE_DATA, &[mode, ref data @ ..]) if !data.is_empty() => {
            Some(LogicalCommand::WriteDirectMode {
                port,
                mode,
                data: data.to_vec(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::command::hub_action;
    use crate::codec::encode;
    use rstest::rstest;

    #[rstest]
    #[case::timed(LogicalCommand::SetSpeedForTime {
        port: 1, speed: -35, max_power: 80, use_profile: 0, time_ms: 2500, end_state: EndState::Hold,
    })]
    #[case::degrees(LogicalCommand::SetSpeedForDegrees {
        port: 0, speed: 60, max_power: 100, use_profile: 3, degrees: -720, end_state: EndState::Float,
    })]
    #[case::direct(LogicalCommand::WriteDirectMode { port: 2, mode: 0, data: vec![0xCE] })]
    #[case::led(LogicalCommand::SetHubLed { color: 9 })]
    #[case::action(LogicalCommand::HubAction { action: hub_action::SHUTDOWN })]
    #[case::port_info(LogicalCommand::RequestPortInfo { port: 0x12, info_type: 1 })]
    #[case::notify_off(LogicalCommand::SetPortInputFormat { port: 0x12, mode: 0, delta: 1, notify: false })]
    #[case::hub_name(LogicalCommand::request_hub_name())]
    fn reads_back_what_encode_wrote(#[case] cmd: LogicalCommand) {
        let frame = encode(&cmd).unwrap();
        assert_eq!(decode_command(frame.as_bytes()).unwrap(), Some(cmd));
    }

    #[rstest]
    #[case::length_mismatch(&[0x09, 0x00, 0x81, 0x00, 0x11, 0x07, 0x32, 0x64])]
    #[case::inbound_feedback(&[0x05, 0x00, 0x82, 0x00, 0x0A])]
    #[case::unknown_end_state(&[0x0C, 0x00, 0x81, 0x00, 0x11, 0x09, 0xE8, 0x03, 0x32, 0x64, 0x05, 0x00])]
    #[case::empty_direct_write(&[0x07, 0x00, 0x81, 0x00, 0x11, 0x51, 0x00])]
    fn other_frames_are_not_commands(#[case] raw: &[u8]) {
        assert_eq!(decode_command(raw).unwrap(), None);
    }

    #[test]
    fn under_three_bytes_is_an_error() {
        assert!(decode_command(&[0x02, 0x00]).is_err());
    }
}
