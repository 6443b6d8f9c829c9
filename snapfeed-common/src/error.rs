//! Common error types for snapfeed

use thiserror::Error;

/// Common result type for snapfeed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across snapfeed services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML file could not be parsed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}
