use std::collections::BTreeMap;

use super::command::msg;
use crate::error::DecodeError;

/// Color index reported when the sensor sees nothing.
pub const NO_COLOR: u8 = 0xFF;
/// Highest valid color index (White).
pub const MAX_COLOR_INDEX: u8 = 10;

/// Output feedback bit flags.
pub mod feedback {
    pub const IN_PROGRESS: u8 = 0x01;
    pub const COMPLETED: u8 = 0x02;
    pub const DISCARDED: u8 = 0x04;
    pub const IDLE: u8 = 0x08;
    pub const BUSY: u8 = 0x10;
}

/// An inbound notification after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    PortAttached {
        port: u8,
        io_type: Option<u16>,
    },
    PortDetached {
        port: u8,
    },
    /// `index` is `None` when the sensor reports no color.
    PortValueColor {
        port: u8,
        index: Option<u8>,
    },
    /// Channels already scaled to 0..=255.
    PortValueRgb {
        port: u8,
        r: u8,
        g: u8,
        b: u8,
    },
    OutputFeedback {
        port: u8,
        flags: u8,
    },
    HubProperty {
        property: u8,
        operation: u8,
        payload: Vec<u8>,
    },
    GenericError {
        command: u8,
        code: u8,
    },
    Unrecognized {
        raw: Vec<u8>,
    },
}

/// How port-value payloads of a sensor port are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorMode {
    /// Mode 0: one color index byte.
    ColorIndex,
    /// Mode 3: raw RGB, 16-bit or 8-bit per channel.
    #[default]
    Rgb,
}

impl SensorMode {
    /// Device mode number written in the input format setup.
    pub const fn mode_number(self) -> u8 {
        match self {
            Self::ColorIndex => 0,
            Self::Rgb => 3,
        }
    }
}

/// Per-port sensor modes consulted when decoding port values.
#[derive(Debug, Clone, Default)]
pub struct PortModes {
    fallback: SensorMode,
    ports: BTreeMap<u8, SensorMode>,
}

impl PortModes {
    pub fn new(fallback: SensorMode) -> Self {
        Self {
            fallback,
            ports: BTreeMap::new(),
        }
    }

    pub fn with_port(mut self, port: u8, mode: SensorMode) -> Self {
        self.ports.insert(port, mode);
        self
    }

    pub fn mode_of(&self, port: u8) -> SensorMode {
        self.ports.get(&port).copied().unwrap_or(self.fallback)
    }
}

/// Decode with every port in RGB mode.
pub fn decode(bytes: &[u8]) -> Result<DecodedEvent, DecodeError> {
    decode_with(bytes, &PortModes::default())
}

/// Decode one inbound frame.
///
/// Fewer than three bytes is an error. Unknown message types and known types
/// that are too short for their layout come back as `Unrecognized`.
pub fn decode_with(bytes: &[u8], modes: &PortModes) -> Result<DecodedEvent, DecodeError> {
    if bytes.len() < 3 {
        return Err(DecodeError::TooShort {
            needed: 3,
            got: bytes.len(),
        });
    }
    let event = match bytes[2] {
        msg::HUB_ATTACHED_IO => attached_io(bytes),
        msg::PORT_VALUE | msg::PORT_VALUE_SINGLE | msg::PORT_INPUT_FORMAT => {
            port_value(bytes, modes)
        }
        msg::PORT_OUTPUT_FEEDBACK if bytes.len() >= 5 => Some(DecodedEvent::OutputFeedback {
            port: bytes[3],
            flags: bytes[4],
        }),
        msg::HUB_PROPERTIES if bytes.len() >= 5 => Some(DecodedEvent::HubProperty {
            property: bytes[3],
            operation: bytes[4],
            payload: bytes[5..].to_vec(),
        }),
        msg::GENERIC_ERROR if bytes.len() >= 5 => Some(DecodedEvent::GenericError {
            command: bytes[3],
            code: bytes[4],
        }),
        _ => None,
    };
    Ok(event.unwrap_or_else(|| DecodedEvent::Unrecognized {
        raw: bytes.to_vec(),
    }))
}

fn attached_io(b: &[u8]) -> Option<DecodedEvent> {
    if b.len() < 5 {
        return None;
    }
    let port = b[3];
    match b[4] {
        0 => Some(DecodedEvent::PortDetached { port }),
        1 => {
            let io_type = (b.len() >= 7).then(|| u16::from_le_bytes([b[5], b[6]]));
            Some(DecodedEvent::PortAttached { port, io_type })
        }
        _ => None,
    }
}

fn port_value(b: &[u8], modes: &PortModes) -> Option<DecodedEvent> {
    let port = *b.get(3)?;
    match modes.mode_of(port) {
        SensorMode::ColorIndex => {
            let first = *b.get(4)?;
            let index = if first <= MAX_COLOR_INDEX {
                Some(first)
            } else if first == NO_COLOR {
                None
            } else {
                // Some hubs place the index two bytes further on.
                let alt = *b.get(6)?;
                if alt > MAX_COLOR_INDEX {
                    return None;
                }
                Some(alt)
            };
            Some(DecodedEvent::PortValueColor { port, index })
        }
        SensorMode::Rgb if b.len() >= 10 => {
            let ch = |i: usize| scale_channel(u16::from_le_bytes([b[i], b[i + 1]]));
            Some(DecodedEvent::PortValueRgb {
                port,
                r: ch(4),
                g: ch(6),
                b: ch(8),
            })
        }
        SensorMode::Rgb if b.len() >= 7 => Some(DecodedEvent::PortValueRgb {
            port,
            r: b[4],
            g: b[5],
            b: b[6],
        }),
        SensorMode::Rgb => None,
    }
}

/// 10-bit raw channel to 0..=255.
#[inline]
fn scale_channel(raw: u16) -> u8 {
    u8::try_from(raw / 4).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn color_modes() -> PortModes {
        PortModes::new(SensorMode::Rgb).with_port(0x12, SensorMode::ColorIndex)
    }

    #[rstest]
    #[case(&[])]
    #[case(&[0x03])]
    #[case(&[0x03, 0x00])]
    fn under_three_bytes_is_an_error(#[case] raw: &[u8]) {
        assert_eq!(
            decode(raw),
            Err(DecodeError::TooShort {
                needed: 3,
                got: raw.len()
            })
        );
    }

    #[rstest]
    #[case::attached(&[0x0F, 0x00, 0x04, 0x12, 0x01, 0x25, 0x00], DecodedEvent::PortAttached { port: 0x12, io_type: Some(0x0025) })]
    #[case::attached_short(&[0x05, 0x00, 0x04, 0x12, 0x01], DecodedEvent::PortAttached { port: 0x12, io_type: None })]
    #[case::detached(&[0x05, 0x00, 0x04, 0x01, 0x00], DecodedEvent::PortDetached { port: 0x01 })]
    #[case::feedback(&[0x05, 0x00, 0x82, 0x00, 0x0A], DecodedEvent::OutputFeedback { port: 0x00, flags: 0x0A })]
    #[case::generic_error(&[0x05, 0x00, 0x05, 0x81, 0x06], DecodedEvent::GenericError { command: 0x81, code: 0x06 })]
    #[case::hub_name(
        &[0x08, 0x00, 0x01, 0x01, 0x06, b'T', b'r', b'n'],
        DecodedEvent::HubProperty { property: 0x01, operation: 0x06, payload: b"Trn".to_vec() }
    )]
    fn decodes_known_frames(#[case] raw: &[u8], #[case] expect: DecodedEvent) {
        assert_eq!(decode(raw).unwrap(), expect);
    }

    #[rstest]
    #[case::short_attach(&[0x04, 0x00, 0x04, 0x12])]
    #[case::short_feedback(&[0x04, 0x00, 0x82, 0x00])]
    #[case::short_port_value(&[0x03, 0x00, 0x45])]
    #[case::short_rgb(&[0x06, 0x00, 0x45, 0x12, 0x10, 0x20])]
    #[case::unknown_type(&[0x04, 0x00, 0x99, 0x00])]
    #[case::odd_attach_event(&[0x05, 0x00, 0x04, 0x12, 0x07])]
    fn short_or_unknown_frames_are_unrecognized(#[case] raw: &[u8]) {
        assert_eq!(
            decode(raw).unwrap(),
            DecodedEvent::Unrecognized { raw: raw.to_vec() }
        );
    }

    #[rstest]
    #[case::index_at_byte_4(&[0x05, 0x00, 0x45, 0x12, 0x09], Some(9))]
    #[case::no_color(&[0x05, 0x00, 0x45, 0x12, 0xFF], None)]
    #[case::index_at_byte_6(&[0x07, 0x00, 0x45, 0x12, 0x40, 0x00, 0x03], Some(3))]
    fn color_index_layouts(#[case] raw: &[u8], #[case] index: Option<u8>) {
        assert_eq!(
            decode_with(raw, &color_modes()).unwrap(),
            DecodedEvent::PortValueColor { port: 0x12, index }
        );
    }

    #[test]
    fn garbage_color_index_is_unrecognized() {
        let raw = [0x05, 0x00, 0x45, 0x12, 0x40];
        assert!(matches!(
            decode_with(&raw, &color_modes()).unwrap(),
            DecodedEvent::Unrecognized { .. }
        ));
    }

    #[test]
    fn sixteen_bit_rgb_is_scaled_and_capped() {
        // r = 400 -> 100, g = 1023 -> 255, b = 2000 -> capped at 255
        let raw = [0x0A, 0x00, 0x45, 0x12, 0x90, 0x01, 0xFF, 0x03, 0xD0, 0x07];
        assert_eq!(
            decode(&raw).unwrap(),
            DecodedEvent::PortValueRgb {
                port: 0x12,
                r: 100,
                g: 255,
                b: 255
            }
        );
    }

    #[test]
    fn eight_bit_rgb_is_taken_verbatim() {
        let raw = [0x07, 0x00, 0x45, 0x12, 0xC8, 0x20, 0x10];
        assert_eq!(
            decode(&raw).unwrap(),
            DecodedEvent::PortValueRgb {
                port: 0x12,
                r: 200,
                g: 32,
                b: 16
            }
        );
    }
}
