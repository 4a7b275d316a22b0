//! Crate-wide error type and exit code mapping.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy. Only `Configuration` and `Routing` are meant to abort the
/// process outright; the rest are either recoverable or map to a distinct
/// exit code at the top level (see [`Error::exit_code`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("message routing error: {0}")]
    Routing(String),

    #[error("component not found: {0}")]
    MissingComponent(String),

    #[error("already set: {0}")]
    AlreadySet(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn configuration<S: Into<String>>(s: S) -> Self {
        Error::Configuration(s.into())
    }

    pub fn missing_component<S: Into<String>>(s: S) -> Self {
        Error::MissingComponent(s.into())
    }

    /// Process exit codes: 0 normal, 1 keyboard interrupt, 2
    /// device-not-found, 3 other exception.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Cancelled => 1,
            Error::DeviceNotFound(_) => 2,
            _ => 3,
        }
    }
}
