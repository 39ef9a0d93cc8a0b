#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Command arbitration and sensor automation for an LWP3 hub (transport-agnostic).
//!
//! All I/O goes through the `hubctl_traits` seams (`Transport`,
//! `AnalogSource`, `Clock`, `Scheduler`), so every component here can be
//! driven by simulated devices.
//!
//! ## Architecture
//!
//! - **Codec**: pure encode/decode between `LogicalCommand`/`DecodedEvent` and frames (`codec`)
//! - **Formatter**: human-readable names and `Display` impls (`format`)
//! - **Dispatcher**: priority, coalesced and normal tiers in front of one writer (`dispatcher`)
//! - **Stabilizer**: majority vote over color-index readings (`stabilizer`)
//! - **Trigger**: detect, sustain, act and cool down on RGB readings (`trigger`, `automation`)
//! - **Mapper**: analog samples to incremental speed steps (`mapper`, `analog`)
//! - **Hub**: the facade wiring all of the above (`hub`)
//!
//! Only the dispatcher loop writes to the transport; every producer goes
//! through a `DispatcherHandle`.

pub mod analog;
pub mod automation;
pub mod codec;
pub mod config;
pub mod conversions;
pub mod dispatcher;
pub mod error;
pub mod format;
pub mod hub;
pub mod link;
pub mod mapper;
pub mod mocks;
pub mod scheduler;
pub mod stabilizer;
pub mod trigger;

pub use analog::{AnalogRunner, AnalogSampler, Button};
pub use automation::{TriggerAutomation, TriggerObserver};
pub use codec::{
    DecodedEvent, EndState, Frame, LogicalCommand, PortModes, SensorMode, decode, decode_command,
    decode_with, encode,
};
pub use config::RuntimeCfg;
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherHandle, SpeedState, Tier};
pub use error::{BuildError, DecodeError, HubError, Result, ValidationError};
pub use hub::{ColorObserver, Hub, HubBuilder};
pub use link::LinkState;
pub use mapper::{AnalogSpeedMapper, MappingState, SuppressReason, TickDecision};
pub use scheduler::ThreadScheduler;
pub use stabilizer::ColorStabilizer;
pub use trigger::{TriggerMachine, TriggerState};
