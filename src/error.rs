//! Error types for roombridge.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Meeting client lifecycle
    #[error("Failed to initialize meeting client: {message}")]
    ClientInit { message: String },

    #[error("Failed to join meeting room: {message}")]
    JoinRoom { message: String },

    // Subscriptions
    #[error("Audio subscription failed for participant {participant}: {message}")]
    Subscription {
        participant: String,
        message: String,
    },

    // Audio format
    #[error("Unsupported audio format: {message}")]
    AudioFormatUnsupported { message: String },

    // Cross-domain handoff
    #[error("Audio handoff failed: {message}")]
    Handoff { message: String },

    #[error("Audio handoff timed out after {timeout_ms}ms, frame dropped")]
    HandoffTimeout { timeout_ms: u64 },

    #[error("Pipeline intake closed")]
    IntakeClosed,

    #[error("Transport closed")]
    TransportClosed,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, BridgeError>;
