use thiserror::Error;

/// Errors raised by the monitoring core (roster, devices, session)
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Unknown person: {0}")]
    UnknownPerson(String),

    #[error("Person already exists: {0}")]
    DuplicatePerson(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Device already registered: {0}")]
    DuplicateDevice(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors that can occur while reading or writing persisted blobs
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Errors that can occur when signalling a notification sink
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
