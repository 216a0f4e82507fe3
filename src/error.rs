//! Error types for the aria gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the aria gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Wire framing error (malformed header, bad lengths)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Event schema error (unknown tag, malformed data JSON)
    #[error("event error: {0}")]
    Event(String),

    /// Session state violation
    #[error("session error: {0}")]
    Session(String),

    /// Speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Transcription error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// LLM generation error
    #[error("generation error: {0}")]
    Generation(String),

    /// Settings validation error
    #[error("validation error: {0}")]
    Validation(String),

    /// Synthesis deadline expired
    #[error("timeout: {0}")]
    Timeout(String),

    /// Invalid audio format
    #[error("invalid audio format: {0}")]
    AudioFormat(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
