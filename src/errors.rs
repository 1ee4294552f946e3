use thiserror::Error;

/// Errors surfaced while (re)configuring a stream.
///
/// Controllers that return one of these leave their previous session state
/// untouched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid grid geometry: {0}")]
    InvalidGeometry(String),
    #[error("Invalid sensor limits: {0}")]
    InvalidSensorLimits(String),
    #[error("Invalid tuning: {0}")]
    InvalidTuning(String),
    #[error("Tuning file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse tuning file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize tuning: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors raised when a raw accelerator buffer cannot back the declared layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("Statistics buffer too short: need {needed} bytes, got {actual}")]
    BufferTooShort { needed: usize, actual: usize },
    #[error("Statistics buffer length {0} is not a whole number of items")]
    MisalignedBuffer(usize),
}
