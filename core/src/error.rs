//! Error types for the VetCare client core.
//!
//! # Design
//! Every failure an operation can hit is normalized into one `ApiError`
//! variant, and the variant's display text is the message a screen shows.
//! `NotFound` keeps its own variant because callers often treat "the entity
//! is gone" differently from other protocol failures.

use thiserror::Error;

/// Message used when the server flags a failure without explaining it.
pub const REJECTED_FALLBACK: &str = "request rejected by server";

/// Every failure category an operation can end in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Connectivity loss, timeout, DNS or TLS failure.
    #[error("network error: {0}")]
    Transport(String),

    /// The server returned 404.
    #[error("HTTP 404: {message}")]
    NotFound { message: String },

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 2xx status, but the body or its `data` field was missing or null.
    #[error("empty response from {operation}")]
    EmptyResponse { operation: &'static str },

    /// 2xx status with `success: false` in the envelope.
    #[error("{0}")]
    Rejected(String),

    /// The response body could not be decoded into the expected type.
    #[error("malformed response: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("could not encode request: {0}")]
    Serialization(String),

    /// A local precondition failed before any request was sent.
    #[error("{0}")]
    InvalidInput(String),

    /// A panic caught at the operation boundary.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ApiError {
    /// Build a `Rejected` error, falling back to a generic message when the
    /// server sent none.
    pub fn rejected(message: Option<String>) -> Self {
        match message {
            Some(message) if !message.trim().is_empty() => ApiError::Rejected(message),
            _ => ApiError::Rejected(REJECTED_FALLBACK.to_string()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}
