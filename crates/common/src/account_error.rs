//! Account and session failure taxonomy
//!
//! Every account/session failure carries an explicit kind so callers can
//! branch on it (delete a dead credential, report to a requester, exit at
//! startup) instead of inspecting message text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classified account/session failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountErrorKind {
    /// No account collection exists in the store.
    NoAccountsFound,
    /// The collection exists but holds no usable (enabled) account.
    NoValidAccount,
    /// The portal rejected the credentials; the account is considered dead.
    CannotLogin,
    /// No fresh session is available.
    NoSessionFound,
    /// The label protocol refused to create a label.
    LabelCreationFailed,
    /// Anything else, including transient transport failures.
    Error,
}

impl AccountErrorKind {
    /// Default human-readable text for the kind.
    pub fn default_message(self) -> &'static str {
        match self {
            AccountErrorKind::NoAccountsFound => "No accounts found!",
            AccountErrorKind::NoValidAccount => "No valid account found to process label",
            AccountErrorKind::CannotLogin => "Cannot login to carrier portal",
            AccountErrorKind::NoSessionFound => "No session found!",
            AccountErrorKind::LabelCreationFailed => "Failed to create label",
            AccountErrorKind::Error => "An error occured",
        }
    }

    /// Stable label for logs and metrics.
    pub fn label(self) -> &'static str {
        match self {
            AccountErrorKind::NoAccountsFound => "no_accounts_found",
            AccountErrorKind::NoValidAccount => "no_valid_account",
            AccountErrorKind::CannotLogin => "cannot_login",
            AccountErrorKind::NoSessionFound => "no_session_found",
            AccountErrorKind::LabelCreationFailed => "label_creation_failed",
            AccountErrorKind::Error => "error",
        }
    }
}

impl fmt::Display for AccountErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An account/session failure with its kind and a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AccountError {
    pub kind: AccountErrorKind,
    pub message: String,
}

impl AccountError {
    pub fn new(kind: AccountErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error carrying the kind's default message.
    pub fn of(kind: AccountErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    pub fn cannot_login(username: &str) -> Self {
        Self::new(
            AccountErrorKind::CannotLogin,
            format!("{}: {username}", AccountErrorKind::CannotLogin.default_message()),
        )
    }

    pub fn label_creation_failed(message: impl Into<String>) -> Self {
        Self::new(AccountErrorKind::LabelCreationFailed, message)
    }

    /// Generic, possibly transient failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(AccountErrorKind::Error, message)
    }

    pub fn is(&self, kind: AccountErrorKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_uses_default_message() {
        let err = AccountError::of(AccountErrorKind::NoAccountsFound);
        assert_eq!(err.to_string(), "No accounts found!");
        assert!(err.is(AccountErrorKind::NoAccountsFound));
    }

    #[test]
    fn cannot_login_names_the_user() {
        let err = AccountError::cannot_login("bob");
        assert_eq!(err.kind, AccountErrorKind::CannotLogin);
        assert!(err.to_string().ends_with(": bob"), "got: {err}");
    }

    #[test]
    fn kind_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&AccountErrorKind::LabelCreationFailed).unwrap();
        assert_eq!(json, "\"LABEL_CREATION_FAILED\"");
    }
}
