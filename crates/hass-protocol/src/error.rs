//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding a frame
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not well-formed JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Frame is JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// A field required for this message kind is absent
    #[error("Missing field '{field}' in {kind} message")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// A field is present but has the wrong shape
    #[error("Invalid field '{field}' in {kind} message: expected {expected}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}
