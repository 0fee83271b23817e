//! Oracle client error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}
