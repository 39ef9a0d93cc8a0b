use super::command::{
    HUB_ID, HUB_LED_PORT, LogicalCommand, STARTUP_IMMEDIATE_FEEDBACK, msg, signed_byte, sub,
};
use super::frame::Frame;
use crate::error::ValidationError;

/// Encode one command into a wire frame.
///
/// Validation runs first, so an error never leaves a partial frame behind.
pub fn encode(cmd: &LogicalCommand) -> Result<Frame, ValidationError> {
    cmd.validate()?;
    let mut p: Vec<u8> = Vec::with_capacity(16);
    match cmd {
        LogicalCommand::SetSpeed {
            port,
            speed,
            max_power,
            use_profile,
        } => {
            output_header(&mut p, *port, sub::START_SPEED);
            p.extend_from_slice(&[signed_byte(*speed), *max_power, *use_profile]);
        }
        LogicalCommand::SetSpeedForTime {
            port,
            speed,
            max_power,
            use_profile,
            time_ms,
            end_state,
        } => {
            output_header(&mut p, *port, sub::START_SPEED_FOR_TIME);
            p.extend_from_slice(&time_ms.to_le_bytes());
            p.extend_from_slice(&[
                signed_byte(*speed),
                *max_power,
                end_state.as_byte(),
                *use_profile,
            ]);
        }
        LogicalCommand::SetSpeedForDegrees {
            port,
            speed,
            max_power,
            use_profile,
            degrees,
            end_state,
        } => {
            output_header(&mut p, *port, sub::START_SPEED_FOR_DEGREES);
            p.extend_from_slice(&degrees.to_le_bytes());
            p.extend_from_slice(&[
                signed_byte(*speed),
                *max_power,
                end_state.as_byte(),
                *use_profile,
            ]);
        }
        LogicalCommand::WriteDirectMode { port, mode, data } => {
            output_header(&mut p, *port, sub::WRITE_DIRECT_MODE_DATA);
            p.push(*mode);
            p.extend_from_slice(data);
        }
        LogicalCommand::SetHubLed { color } => {
            output_header(&mut p, HUB_LED_PORT, sub::WRITE_DIRECT_MODE_DATA);
            p.extend_from_slice(&[0x00, *color]);
        }
        LogicalCommand::HubAction { action } => {
            p.extend_from_slice(&[HUB_ID, msg::HUB_ACTIONS, *action]);
        }
        LogicalCommand::RequestPortInfo { port, info_type } => {
            p.extend_from_slice(&[HUB_ID, msg::PORT_INFO_REQUEST, *port, *info_type]);
        }
        LogicalCommand::SetPortInputFormat {
            port,
            mode,
            delta,
            notify,
        } => {
            p.extend_from_slice(&[HUB_ID, msg::PORT_INPUT_FORMAT_SETUP, *port, *mode]);
            p.extend_from_slice(&delta.to_le_bytes());
            p.push(u8::from(*notify));
        }
        LogicalCommand::RequestHubProperty {
            property,
            operation,
        } => {
            p.extend_from_slice(&[HUB_ID, msg::HUB_PROPERTIES, *property, *operation]);
        }
    }
    Frame::from_payload(&p)
}

#[inline]
fn output_header(p: &mut Vec<u8>, port: u8, subcommand: u8) {
    p.extend_from_slice(&[
        HUB_ID,
        msg::PORT_OUTPUT_COMMAND,
        port,
        STARTUP_IMMEDIATE_FEEDBACK,
        subcommand,
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::command::{EndState, hub_action};
    use rstest::rstest;

    #[rstest]
    #[case::start_speed(
        LogicalCommand::SetSpeed { port: 0, speed: 50, max_power: 100, use_profile: 0 },
        &[0x09, 0x00, 0x81, 0x00, 0x11, 0x07, 0x32, 0x64, 0x00]
    )]
    #[case::reverse_speed(
        LogicalCommand::set_speed(1, -50),
        &[0x09, 0x00, 0x81, 0x01, 0x11, 0x07, 0xCE, 0x64, 0x00]
    )]
    #[case::speed_for_time(
        LogicalCommand::SetSpeedForTime {
            port: 0, speed: 50, max_power: 100, use_profile: 0,
            time_ms: 2000, end_state: EndState::Brake,
        },
        &[0x0C, 0x00, 0x81, 0x00, 0x11, 0x09, 0xD0, 0x07, 0x32, 0x64, 0x7F, 0x00]
    )]
    #[case::speed_for_degrees(
        LogicalCommand::SetSpeedForDegrees {
            port: 0, speed: -30, max_power: 80, use_profile: 1,
            degrees: 360, end_state: EndState::Hold,
        },
        &[0x0E, 0x00, 0x81, 0x00, 0x11, 0x0B, 0x68, 0x01, 0x00, 0x00, 0xE2, 0x50, 0x7E, 0x01]
    )]
    #[case::direct_mode(
        LogicalCommand::WriteDirectMode { port: 0, mode: 0, data: vec![0x32] },
        &[0x08, 0x00, 0x81, 0x00, 0x11, 0x51, 0x00, 0x32]
    )]
    #[case::hub_led(
        LogicalCommand::SetHubLed { color: 9 },
        &[0x08, 0x00, 0x81, 0x32, 0x11, 0x51, 0x00, 0x09]
    )]
    #[case::hub_action(
        LogicalCommand::HubAction { action: hub_action::SHUTDOWN },
        &[0x04, 0x00, 0x02, 0x2F]
    )]
    #[case::port_info(
        LogicalCommand::RequestPortInfo { port: 0x12, info_type: 0x01 },
        &[0x05, 0x00, 0x21, 0x12, 0x01]
    )]
    #[case::input_format(
        LogicalCommand::SetPortInputFormat { port: 0x12, mode: 3, delta: 1, notify: true },
        &[0x0A, 0x00, 0x41, 0x12, 0x03, 0x01, 0x00, 0x00, 0x00, 0x01]
    )]
    #[case::hub_name(
        LogicalCommand::request_hub_name(),
        &[0x05, 0x00, 0x01, 0x01, 0x05]
    )]
    fn encodes_known_layouts(#[case] cmd: LogicalCommand, #[case] expect: &[u8]) {
        let frame = encode(&cmd).unwrap();
        assert_eq!(frame.as_bytes(), expect);
        assert_eq!(usize::from(frame.as_bytes()[0]), frame.len());
    }

    #[rstest]
    #[case(101, 100, ValidationError::Speed(101))]
    #[case(-101, 100, ValidationError::Speed(-101))]
    #[case(10, 101, ValidationError::MaxPower(101))]
    fn rejects_out_of_range(#[case] speed: i32, #[case] max_power: u8, #[case] err: ValidationError) {
        let cmd = LogicalCommand::SetSpeed {
            port: 0,
            speed,
            max_power,
            use_profile: 0,
        };
        assert_eq!(encode(&cmd), Err(err));
    }

    #[test]
    fn rejects_empty_direct_mode_payload() {
        let cmd = LogicalCommand::WriteDirectMode {
            port: 0,
            mode: 0,
            data: Vec::new(),
        };
        assert_eq!(encode(&cmd), Err(ValidationError::EmptyModeData));
    }
}
