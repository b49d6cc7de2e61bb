//! Classification of CreateIndicium failures
//!
//! The portal reports label refusals as free text in `ErrorDescription`.
//! Rules are matched case-insensitively in a fixed priority order; the first
//! rule whose phrase appears wins. Anything unmatched is a generic failure
//! that carries the portal's own description.

use common::AccountError;

/// Why the portal refused to create an indicium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelFailure {
    InsufficientFunds,
    BillingInactive,
    ServiceRestricted,
    CredentialExpired,
    MonthlyLimitReached,
    Other(String),
}

/// Ordered phrase rules. Order matters: "insufficient" outranks "limit".
const RULES: &[(&str, LabelFailure)] = &[
    ("insufficient", LabelFailure::InsufficientFunds),
    (
        "due to the current status of your account",
        LabelFailure::BillingInactive,
    ),
    ("only", LabelFailure::ServiceRestricted),
    ("expired", LabelFailure::CredentialExpired),
    ("limit", LabelFailure::MonthlyLimitReached),
];

/// Classify a step-1 error description.
pub fn classify_indicium_error(description: &str) -> LabelFailure {
    let lower = description.to_lowercase();
    for (pattern, failure) in RULES {
        if lower.contains(pattern) {
            return failure.clone();
        }
    }
    LabelFailure::Other(description.to_string())
}

impl LabelFailure {
    /// User-facing message for the failure.
    pub fn message(&self) -> String {
        match self {
            LabelFailure::InsufficientFunds => {
                "Insufficient funds on account. Please check the account or change it and try again."
                    .to_string()
            }
            LabelFailure::BillingInactive => {
                "Failed: Account billing inactivity, cannot be used.".to_string()
            }
            LabelFailure::ServiceRestricted => {
                "This account can not be used for usual Ground or Priority.".to_string()
            }
            LabelFailure::CredentialExpired => {
                "Cookie expired. Please check the account or change it and try again.".to_string()
            }
            LabelFailure::MonthlyLimitReached => {
                "This account has reached monthly print limit.".to_string()
            }
            LabelFailure::Other(description) => {
                format!("Failed to create two up label: {description}")
            }
        }
    }

    /// Every classification surfaces as `LABEL_CREATION_FAILED`.
    pub fn into_error(self) -> AccountError {
        AccountError::label_creation_failed(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AccountErrorKind;

    #[test]
    fn insufficient_funds() {
        let failure = classify_indicium_error("insufficient funds available");
        assert_eq!(failure, LabelFailure::InsufficientFunds);
        let err = failure.into_error();
        assert_eq!(err.kind, AccountErrorKind::LabelCreationFailed);
        assert!(err.message.contains("Insufficient funds"));
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(
            classify_indicium_error("Your Session Has EXPIRED"),
            LabelFailure::CredentialExpired
        );
    }

    #[test]
    fn billing_inactive() {
        let text = "Printing is unavailable due to the current status of your account.";
        assert_eq!(classify_indicium_error(text), LabelFailure::BillingInactive);
    }

    #[test]
    fn service_restriction() {
        assert_eq!(
            classify_indicium_error("This account may only print First-Class"),
            LabelFailure::ServiceRestricted
        );
    }

    #[test]
    fn monthly_limit() {
        assert_eq!(
            classify_indicium_error("Monthly print limit reached"),
            LabelFailure::MonthlyLimitReached
        );
    }

    #[test]
    fn priority_order_prefers_earlier_rule() {
        // Matches both "insufficient" and "limit".
        assert_eq!(
            classify_indicium_error("insufficient balance, credit limit hit"),
            LabelFailure::InsufficientFunds
        );
        // Matches both "only" and "expired".
        assert_eq!(
            classify_indicium_error("only valid sessions; yours expired"),
            LabelFailure::ServiceRestricted
        );
    }

    #[test]
    fn unmatched_is_generic_with_description() {
        let failure = classify_indicium_error("Address could not be verified");
        assert_eq!(
            failure.message(),
            "Failed to create two up label: Address could not be verified"
        );
    }

    #[test]
    fn empty_description_is_generic() {
        assert_eq!(
            classify_indicium_error(""),
            LabelFailure::Other(String::new())
        );
    }
}
