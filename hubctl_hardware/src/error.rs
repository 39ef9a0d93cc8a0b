use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("link is down")]
    Disconnected,
    #[error("no data before timeout")]
    Timeout,
    #[error("unparseable line from analog board: {0:?}")]
    Parse(String),
    #[error("serial error: {0}")]
    Serial(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
