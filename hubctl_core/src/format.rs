//! Human-readable renderings of commands, events and raw frames.
//!
//! Kept apart from the codec so log text never influences wire bytes.

use std::fmt::{self, Write as _};

use crate::codec::command::{HUB_LED_PORT, hub_action, msg};
use crate::codec::decode::feedback;
use crate::codec::{DecodedEvent, LogicalCommand};

const COLOR_NAMES: [&str; 11] = [
    "Black",
    "Pink",
    "Purple",
    "Blue",
    "Light Blue",
    "Cyan",
    "Green",
    "Yellow",
    "Orange",
    "Red",
    "White",
];

/// Name of a color index (0..=10), or `"Unknown"`.
pub fn color_name(index: u8) -> &'static str {
    COLOR_NAMES
        .get(usize::from(index))
        .copied()
        .unwrap_or("Unknown")
}

/// Name of a message type byte.
pub fn message_type_name(t: u8) -> &'static str {
    match t {
        msg::HUB_PROPERTIES => "HUB_PROPERTIES",
        msg::HUB_ACTIONS => "HUB_ACTIONS",
        msg::HUB_ALERTS => "HUB_ALERTS",
        msg::HUB_ATTACHED_IO => "HUB_ATTACHED_IO",
        msg::GENERIC_ERROR => "GENERIC_ERROR",
        msg::PORT_INFO_REQUEST => "PORT_INFO",
        msg::PORT_INPUT_FORMAT_SETUP => "PORT_INPUT_FORMAT_SETUP",
        msg::PORT_VALUE => "PORT_VALUE",
        msg::PORT_VALUE_COMBINED => "PORT_VALUE_COMBINED",
        msg::PORT_VALUE_SINGLE => "PORT_VALUE_SINGLE",
        msg::PORT_INPUT_FORMAT => "PORT_INPUT_FORMAT",
        msg::PORT_OUTPUT_COMMAND => "PORT_OUTPUT_CMD",
        msg::PORT_OUTPUT_FEEDBACK => "FEEDBACK",
        _ => "UNKNOWN",
    }
}

/// Names of the bits set in an output feedback byte, lowest bit first.
pub fn feedback_flag_names(flags: u8) -> Vec<&'static str> {
    [
        (feedback::IN_PROGRESS, "in-progress"),
        (feedback::COMPLETED, "completed"),
        (feedback::DISCARDED, "discarded"),
        (feedback::IDLE, "idle"),
        (feedback::BUSY, "busy"),
    ]
    .into_iter()
    .filter(|(bit, _)| flags & bit != 0)
    .map(|(_, name)| name)
    .collect()
}

fn hub_action_name(action: u8) -> &'static str {
    match action {
        hub_action::DISCONNECT => "disconnect",
        hub_action::SHUTDOWN => "shutdown",
        hub_action::VCC_PORT_ON => "vcc-on",
        hub_action::VCC_PORT_OFF => "vcc-off",
        _ => "unknown",
    }
}

/// Lowercase hex without separators, e.g. `0400022f`.
pub fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Parse hex produced by [`hex`]; spaces, colons and a `0x` prefix are tolerated.
pub fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let digits: Vec<u8> = s
        .bytes()
        .filter(|c| !matches!(c, b' ' | b':' | b'-' | b'_'))
        .collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = char::from(pair[0]).to_digit(16)?;
            let lo = char::from(pair[1]).to_digit(16)?;
            u8::try_from(hi * 16 + lo).ok()
        })
        .collect()
}

impl fmt::Display for LogicalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetSpeed {
                port,
                speed,
                max_power,
                ..
            } => write!(f, "StartSpeed port={port} speed={speed} max_power={max_power}"),
            Self::SetSpeedForTime {
                port,
                speed,
                time_ms,
                end_state,
                ..
            } => write!(
                f,
                "StartSpeedForTime port={port} speed={speed} time={time_ms}ms end={end_state:?}"
            ),
            Self::SetSpeedForDegrees {
                port,
                speed,
                degrees,
                end_state,
                ..
            } => write!(
                f,
                "StartSpeedForDegrees port={port} speed={speed} degrees={degrees} end={end_state:?}"
            ),
            Self::WriteDirectMode { port, mode, data } if *port == HUB_LED_PORT => {
                write!(f, "WriteDirectMode led mode={mode} data={}", hex(data))
            }
            Self::WriteDirectMode { port, mode, data } => {
                write!(f, "WriteDirectMode port={port} mode={mode} data={}", hex(data))
            }
            Self::SetHubLed { color } => write!(f, "HubLed color={color} ({})", color_name(*color)),
            Self::HubAction { action } => {
                write!(f, "HubAction 0x{action:02X} ({})", hub_action_name(*action))
            }
            Self::RequestPortInfo { port, info_type } => {
                write!(f, "PortInfoRequest port=0x{port:02X} info={info_type}")
            }
            Self::SetPortInputFormat {
                port,
                mode,
                delta,
                notify,
            } => write!(
                f,
                "PortInputFormatSetup port=0x{port:02X} mode={mode} delta={delta} notify={notify}"
            ),
            Self::RequestHubProperty {
                property,
                operation,
            } => write!(f, "HubProperty property=0x{property:02X} op=0x{operation:02X}"),
        }
    }
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortAttached {
                port,
                io_type: Some(t),
            } => write!(f, "port 0x{port:02X} attached io_type=0x{t:04X}"),
            Self::PortAttached { port, io_type: None } => write!(f, "port 0x{port:02X} attached"),
            Self::PortDetached { port } => write!(f, "port 0x{port:02X} detached"),
            Self::PortValueColor {
                port,
                index: Some(i),
            } => write!(f, "port 0x{port:02X} color {i} ({})", color_name(*i)),
            Self::PortValueColor { port, index: None } => {
                write!(f, "port 0x{port:02X} no color")
            }
            Self::PortValueRgb { port, r, g, b } => {
                write!(f, "port 0x{port:02X} rgb=({r}, {g}, {b})")
            }
            Self::OutputFeedback { port, flags } => write!(
                f,
                "port 0x{port:02X} feedback 0x{flags:02X} [{}]",
                feedback_flag_names(*flags).join(", ")
            ),
            Self::HubProperty {
                property,
                operation,
                payload,
            } => {
                let text = String::from_utf8_lossy(payload);
                write!(
                    f,
                    "hub property 0x{property:02X} op=0x{operation:02X} value={text:?}"
                )
            }
            Self::GenericError { command, code } => write!(
                f,
                "generic error for {} code=0x{code:02X}",
                message_type_name(*command)
            ),
            Self::Unrecognized { raw } => {
                let name = raw.get(2).map_or("UNKNOWN", |t| message_type_name(*t));
                write!(f, "unrecognized {name} {}", hex(raw))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "Black")]
    #[case(4, "Light Blue")]
    #[case(9, "Red")]
    #[case(10, "White")]
    #[case(11, "Unknown")]
    fn names_colors(#[case] index: u8, #[case] name: &str) {
        assert_eq!(color_name(index), name);
    }

    #[test]
    fn feedback_names_follow_bits() {
        assert_eq!(feedback_flag_names(0x0A), vec!["completed", "idle"]);
        assert!(feedback_flag_names(0).is_empty());
    }

    #[test]
    fn hex_round_trips_with_separators() {
        assert_eq!(hex(&[0x09, 0x00, 0xCE]), "0900ce");
        assert_eq!(parse_hex("09 00 CE"), Some(vec![0x09, 0x00, 0xCE]));
        assert_eq!(parse_hex("0x09:00"), Some(vec![0x09, 0x00]));
        assert_eq!(parse_hex("0g"), None);
        assert_eq!(parse_hex("090"), None);
    }

    #[test]
    fn renders_commands_and_events() {
        let cmd = LogicalCommand::set_speed(0, -50);
        assert_eq!(cmd.to_string(), "StartSpeed port=0 speed=-50 max_power=100");
        let ev = DecodedEvent::PortValueColor {
            port: 0x12,
            index: Some(9),
        };
        assert_eq!(ev.to_string(), "port 0x12 color 9 (Red)");
        let raw = DecodedEvent::Unrecognized {
            raw: vec![0x04, 0x00, 0x03, 0x01],
        };
        assert_eq!(raw.to_string(), "unrecognized HUB_ALERTS 04000301");
    }
}
