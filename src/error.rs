//! # Error Types
//!
//! Custom error types for Power Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Power Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Sensor radio stack refused or failed an operation
    #[error("Sensor link error: {0}")]
    Link(String),

    /// Outbound broadcast profile failed to accept a frame
    #[error("Broadcast error: {0}")]
    Broadcast(String),

    /// Telemetry record serialization errors
    #[error("Telemetry encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Power Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
