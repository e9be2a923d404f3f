//! WolfRing Error Types

use thiserror::Error;

/// Result type alias for WolfRing operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfRing error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to render configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Unexpected HTTP status {status} from {address}")]
    UnexpectedStatus { address: String, status: u16 },

    // Encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionTimeout(_)
                | Error::ConnectionFailed { .. }
                | Error::Network(_)
        )
    }

    /// Build a transport error from a failed HTTP call
    pub fn from_http(address: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::ConnectionTimeout(address.to_string())
        } else if let Some(status) = err.status() {
            Error::UnexpectedStatus {
                address: address.to_string(),
                status: status.as_u16(),
            }
        } else if err.is_connect() {
            Error::ConnectionFailed {
                address: address.to_string(),
                reason: err.to_string(),
            }
        } else {
            Error::Network(format!("{}: {}", address, err))
        }
    }
}
