use thiserror::Error;

/// Out-of-range command parameter, detected before any byte is produced.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("speed {0} outside [-100, 100]")]
    Speed(i32),
    #[error("max_power {0} outside [0, 100]")]
    MaxPower(u8),
    #[error("direct mode data must carry at least one byte")]
    EmptyModeData,
    #[error("frame of {0} bytes exceeds the single-byte length limit")]
    FrameTooLong(usize),
}

/// Inbound bytes too short to carry a frame header.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: need {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },
}

#[derive(Debug, Error, Clone)]
pub enum HubError {
    #[error("invalid command: {0}")]
    Validation(#[from] ValidationError),
    #[error("undecodable frame: {0}")]
    Decode(#[from] DecodeError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("dispatcher is shut down")]
    Closed,
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing transport")]
    MissingTransport,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
