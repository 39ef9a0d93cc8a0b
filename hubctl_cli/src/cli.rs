//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use hubctl_core::codec::command::hub_action;
use hubctl_core::{EndState, SensorMode};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub const DEFAULT_CONFIG: &str = "etc/hubctl.toml";

#[derive(Parser, Debug)]
#[command(name = "hubctl", version, about = "LWP3 hub controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Print results and errors as JSON, log as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encode a command and print its frame as hex
    Encode {
        #[command(subcommand)]
        kind: EncodeKind,
    },
    /// Decode a hex frame received from (or, with --outbound, sent to) a hub
    Decode {
        /// Frame bytes, e.g. "07 00 45 12 c8 20 10"
        hex: String,
        /// How port value frames are interpreted
        #[arg(long, value_enum, default_value = "rgb")]
        mode: ModeArg,
        /// Read the frame as a command sent to the hub
        #[arg(long)]
        outbound: bool,
    },
    /// Run the full pipeline against a simulated hub, sensor and knob
    Simulate(SimulateArgs),
    /// Validate the config and start a hub against the simulator
    SelfCheck,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Stop after this many seconds (Ctrl-C stops earlier)
    #[arg(long, default_value_t = 10)]
    pub seconds: u64,
    /// Initial cruise speed
    #[arg(long, default_value_t = 50, allow_hyphen_values = true)]
    pub speed: i32,
    /// Read analog board lines from a file instead of the simulated knob
    #[arg(long, value_name = "FILE")]
    pub analog_file: Option<PathBuf>,
    /// Read the analog board from a serial port
    #[cfg(feature = "serial")]
    #[arg(long, value_name = "PORT", conflicts_with = "analog_file")]
    pub serial: Option<String>,
    /// Baud rate for --serial
    #[cfg(feature = "serial")]
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
}

#[derive(Subcommand, Debug)]
pub enum EncodeKind {
    /// Start the motor at a speed
    Speed {
        #[arg(allow_hyphen_values = true)]
        speed: i32,
        #[arg(long, default_value_t = 0)]
        port: u8,
        #[arg(long, default_value_t = 100)]
        max_power: u8,
        /// Encode as WriteDirectModeData instead of StartSpeed
        #[arg(long, action = ArgAction::SetTrue)]
        direct: bool,
    },
    /// Run the motor for a fixed time
    Timed {
        #[arg(allow_hyphen_values = true)]
        speed: i32,
        time_ms: u16,
        #[arg(long, default_value_t = 0)]
        port: u8,
        #[arg(long, default_value_t = 100)]
        max_power: u8,
        #[arg(long, value_enum, default_value = "brake")]
        end_state: EndArg,
    },
    /// Run the motor for a number of degrees
    Degrees {
        #[arg(allow_hyphen_values = true)]
        speed: i32,
        #[arg(allow_hyphen_values = true)]
        degrees: i32,
        #[arg(long, default_value_t = 0)]
        port: u8,
        #[arg(long, default_value_t = 100)]
        max_power: u8,
        #[arg(long, value_enum, default_value = "brake")]
        end_state: EndArg,
    },
    /// Set the hub LED color index
    Led { color: u8 },
    /// Hub-level action
    Action {
        #[arg(value_enum)]
        action: ActionArg,
    },
    /// Request port information
    PortInfo {
        port: u8,
        #[arg(default_value_t = 1)]
        info_type: u8,
    },
    /// Subscribe to a sensor port
    InputFormat {
        port: u8,
        mode: u8,
        #[arg(long, default_value_t = 1)]
        delta: u32,
        /// Disable notifications
        #[arg(long, action = ArgAction::SetTrue)]
        no_notify: bool,
    },
    /// Request the hub's advertising name
    HubName,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    Rgb,
    ColorIndex,
}

impl From<ModeArg> for SensorMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Rgb => Self::Rgb,
            ModeArg::ColorIndex => Self::ColorIndex,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EndArg {
    Float,
    Hold,
    Brake,
}

impl From<EndArg> for EndState {
    fn from(e: EndArg) -> Self {
        match e {
            EndArg::Float => Self::Float,
            EndArg::Hold => Self::Hold,
            EndArg::Brake => Self::Brake,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ActionArg {
    Disconnect,
    Shutdown,
    VccOn,
    VccOff,
}

impl ActionArg {
    pub const fn code(self) -> u8 {
        match self {
            Self::Disconnect => hub_action::DISCONNECT,
            Self::Shutdown => hub_action::SHUTDOWN,
            Self::VccOn => hub_action::VCC_PORT_ON,
            Self::VccOff => hub_action::VCC_PORT_OFF,
        }
    }
}
