//! Error types for QMP message decoding.

use thiserror::Error;

/// Result alias for wire-level operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding QMP messages.
///
/// All of these indicate that the peer sent something we cannot interpret.
/// None of them are transient: a target that emits a malformed line once
/// cannot be trusted to keep the fault timeline consistent.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Line is not valid JSON, or a JSON value did not match the expected
    /// shape.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Top-level JSON value is not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// Object carries none of the keys that identify a QMP message.
    #[error("unrecognized message with keys [{keys}]")]
    UnknownMessage {
        /// Comma-separated keys found in the object
        keys: String,
    },

    /// Event payload lacks a field required for its event name.
    #[error("malformed {event} event: {reason}")]
    MalformedEvent {
        /// Event name
        event: String,
        /// What was missing or mistyped
        reason: String,
    },
}
