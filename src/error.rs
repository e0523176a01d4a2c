//! Error types for the leasebot library.
//!
//! Backend and transport failures are usually recovered inside the funnel
//! (fallback reply, skipped extraction); the variants here are what reaches the
//! caller when recovery is not possible.

use thiserror::Error;

/// Errors that can occur in the leasing funnel.
#[derive(Error, Debug)]
pub enum FunnelError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The AI completion backend failed or returned nothing usable
    #[error("AI backend error: {0}")]
    Backend(String),

    /// The outbound SMS provider rejected or failed a send
    #[error("SMS transport error: {0}")]
    Transport(String),

    /// No lead exists for the given phone number or id
    #[error("Lead not found: {0}")]
    LeadNotFound(String),

    /// No property exists for the given id
    #[error("Property not found: {0}")]
    PropertyNotFound(i64),

    /// Phone number could not be normalised to E.164
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    /// Inbound message body failed validation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A status string outside the funnel vocabulary
    #[error("Invalid lead status: {0}")]
    InvalidStatus(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `FunnelError`
pub type Result<T> = std::result::Result<T, FunnelError>;

impl From<anyhow::Error> for FunnelError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<reqwest::Error> for FunnelError {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<tokio::task::JoinError> for FunnelError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(format!("blocking task failed: {err}"))
    }
}
