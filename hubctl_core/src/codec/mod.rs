//! Frame encoder/decoder for the supported subset of the hub wire protocol.
//!
//! Pure functions only: no I/O, no logging. Human-readable renderings live in
//! [`crate::format`].

pub mod command;
pub mod decode;
pub mod encode;
pub mod frame;
pub mod outbound;

pub use command::{EndState, LogicalCommand, signed_byte};
pub use decode::{DecodedEvent, PortModes, SensorMode, decode, decode_with};
pub use encode::encode;
pub use frame::Frame;
pub use outbound::decode_command;
