//! Error handling for the camlink agent
//!
//! The agent imposes a deliberate taxonomy: configuration problems and
//! broker connectivity abort startup, device failures end the grab loop,
//! malformed inbound messages are logged and dropped.

use crate::camera::CameraError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error (missing/invalid env, unparseable parameter file)
    #[error("Config error: {0}")]
    Config(String),

    /// Broker or cloud connectivity error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Camera device error
    #[error("Device error: {0}")]
    Device(#[from] CameraError),

    /// Undecodable or schema-violating inbound message
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (closed channel, poisoned lock)
    #[error("Internal error: {0}")]
    Internal(String),
}
