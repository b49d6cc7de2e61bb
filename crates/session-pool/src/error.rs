//! Error types for store operations

use common::{AccountError, AccountErrorKind, ValidationError};

/// Errors from account, session and ledger stores.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Account error kind, if this is a classified account failure.
    pub fn account_kind(&self) -> Option<AccountErrorKind> {
        match self {
            Error::Account(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
