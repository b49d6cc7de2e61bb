//! Error types for carrier portal operations

use common::AccountError;

/// Errors from label protocol and account calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("carrier returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid carrier response: {0}")]
    Decode(String),

    #[error("invalid session header {0}")]
    InvalidHeader(String),

    #[error(transparent)]
    Account(#[from] AccountError),
}

impl Error {
    /// The classified account error, if this failure carries one.
    pub fn account_error(&self) -> Option<&AccountError> {
        match self {
            Error::Account(e) => Some(e),
            _ => None,
        }
    }
}

/// Postage purchase refused or failed. Carries the remote reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("funding failed: {0}")]
pub struct FundingError(pub String);

/// Result alias for carrier operations.
pub type Result<T> = std::result::Result<T, Error>;
