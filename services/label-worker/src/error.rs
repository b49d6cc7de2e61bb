//! Service-specific error types

use thiserror::Error;

/// Outcome of a failed job, deciding whether the queue may retry it.
///
/// `Transient` failures consume the queue's retry budget; `Permanent`
/// failures are terminal regardless of remaining budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("{0}")]
    Permanent(String),

    #[error("{0}")]
    Transient(String),
}

impl JobError {
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::Transient(_))
    }
}

/// Failure talking to an external collaborator (webhook, explainer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_displays_message() {
        assert_eq!(JobError::Permanent("dead account".into()).to_string(), "dead account");
        assert!(JobError::Transient("timeout".into()).is_transient());
        assert!(!JobError::Permanent("x".into()).is_transient());
    }
}
