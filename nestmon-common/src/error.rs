use thiserror::Error;

/// Common error type for nestmon components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    #[error("Invalid value for configuration key {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias using nestmon's Error.
pub type Result<T> = std::result::Result<T, Error>;
