//! Error types.
//!
//! Protocol-level invalidations (unknown handler, stale cursor, session
//! mismatch) are not errors: they are the `Reload` variants of the response
//! types. This enum covers configuration, encoding and user handler
//! failures, which the collaborator handles generically.

use thiserror::Error;

/// Boxed error returned by user handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of a mutation handler.
pub type HandlerResult = std::result::Result<(), BoxError>;

#[derive(Error, Debug)]
pub enum Error {
    /// Configuration failed validation.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Configuration file could not be parsed.
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encoding error: {0}")]
    MessagePack(#[from] rmp_serde::encode::Error),

    /// A mutation handler returned an error.
    #[error("Handler {id} failed: {source}")]
    Handler {
        id: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
