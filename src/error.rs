//! Pairguard Error Types

use thiserror::Error;

/// Result type alias for Pairguard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pairguard error types
///
/// Heartbeat loss, split-brain and election ties are ordinary state
/// transitions and never show up here.
#[derive(Error, Debug)]
pub enum Error {
    // Arbiter errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cluster state not initialized")]
    NotInitialized,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Heartbeat serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable code, used by the HTTP API
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::NotInitialized => "NOT_INITIALIZED",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG",
            Error::Network(_) => "NETWORK",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Io(_) => "IO",
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Check if the caller supplied something unusable (as opposed to a local fault)
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}
