//! Device adapters for the hub controller.
//!
//! - [`sim`]: simulated hub link, color sensor and analog knob for
//!   development and end-to-end tests.
//! - [`analog`]: the flex-sensor board's line protocol (`STOP`, `DIR`, raw
//!   integers), readable from any `BufRead` or, with the `serial` feature,
//!   straight from a serial port.
pub mod analog;
pub mod error;
pub mod sim;

pub use analog::{LineAnalogSource, parse_line};
pub use error::HwError;
pub use sim::{ColorSegment, Reading, SensorFeed, SimHubHandle, SimulatedColorSensor, SimulatedHub, SimulatedKnob};

#[cfg(feature = "serial")]
pub use analog::open_serial;
