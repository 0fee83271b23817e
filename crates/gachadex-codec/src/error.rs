//! Error types for the decode pipeline.

use thiserror::Error;

/// Errors that can occur while decoding one event payload or account.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload truncated: needed {need} bytes, {have} remaining")]
    Truncated { need: usize, have: usize },

    #[error("missing field: {field}")]
    MissingField { field: String },

    #[error("field '{field}' has unexpected type (expected {expected})")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    #[error("invalid tier byte: {0}")]
    InvalidTier(u8),

    #[error("invalid option tag: {0}")]
    InvalidOptionTag(u8),

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("account discriminator mismatch (expected {expected})")]
    WrongAccount { expected: &'static str },

    #[error("{0}")]
    Other(String),
}
