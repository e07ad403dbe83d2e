// src/classify.rs

//! Mapping of transport failures onto the categories the engine acts on.
//!
//! - `Canceled` never reaches the user; the operation is treated as a clean
//!   abort.
//! - `NotFound` means the paragraph behind a cell is gone; the user is asked
//!   whether to recreate it rather than being shown a raw error.
//! - Everything else is surfaced as one readable message while local state
//!   is left untouched.

use crate::client::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    LocalNetworkIssue,
    Unauthorized,
    Forbidden,
    NotFound,
    MissingSecurityManager,
    ServerError,
    Canceled,
}

/// What the engine does with an error of a given category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Silent,
    PromptRecreate,
    Surface,
}

pub fn classify(err: &TransportError) -> ErrorCategory {
    match err {
        TransportError::Canceled => ErrorCategory::Canceled,
        TransportError::NoResponse { .. } => ErrorCategory::LocalNetworkIssue,
        TransportError::Status { status: 401, .. } => ErrorCategory::Unauthorized,
        TransportError::Status { status: 403, .. } => ErrorCategory::Forbidden,
        TransportError::Status { status: 404, .. } => ErrorCategory::NotFound,
        TransportError::Status {
            status: 500,
            message,
        } if mentions_security_manager(message) => ErrorCategory::MissingSecurityManager,
        TransportError::Status { .. } | TransportError::Malformed(_) => ErrorCategory::ServerError,
    }
}

fn mentions_security_manager(message: &str) -> bool {
    message.to_lowercase().contains("securitymanager")
        || message.to_lowercase().contains("security manager")
}

impl ErrorCategory {
    pub fn disposition(self) -> Disposition {
        match self {
            ErrorCategory::Canceled => Disposition::Silent,
            ErrorCategory::NotFound => Disposition::PromptRecreate,
            ErrorCategory::LocalNetworkIssue
            | ErrorCategory::Unauthorized
            | ErrorCategory::Forbidden
            | ErrorCategory::MissingSecurityManager
            | ErrorCategory::ServerError => Disposition::Surface,
        }
    }

    /// One line suitable for a notification.
    pub fn describe(self, err: &TransportError) -> String {
        match self {
            ErrorCategory::LocalNetworkIssue => {
                format!("{err}; the notebook server could not be reached")
            }
            ErrorCategory::Unauthorized => {
                "you do not have permission to access this note; log in again".to_string()
            }
            ErrorCategory::Forbidden => format!("access forbidden: {err}"),
            ErrorCategory::NotFound => format!("paragraph no longer exists on the server: {err}"),
            ErrorCategory::MissingSecurityManager => {
                "the server has no security manager configured; anonymous access is disabled"
                    .to_string()
            }
            ErrorCategory::ServerError => format!("server error: {err}"),
            ErrorCategory::Canceled => "request canceled".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn maps_statuses_to_categories() {
        let cases = [
            (TransportError::Canceled, ErrorCategory::Canceled),
            (
                TransportError::no_response("/api", "refused"),
                ErrorCategory::LocalNetworkIssue,
            ),
            (TransportError::status(401, "no"), ErrorCategory::Unauthorized),
            (TransportError::status(403, "no"), ErrorCategory::Forbidden),
            (TransportError::status(404, "gone"), ErrorCategory::NotFound),
            (
                TransportError::status(500, "UnavailableSecurityManagerException"),
                ErrorCategory::MissingSecurityManager,
            ),
            (TransportError::status(500, "boom"), ErrorCategory::ServerError),
            (TransportError::status(409, "conflict"), ErrorCategory::ServerError),
            (TransportError::Malformed("eof".into()), ErrorCategory::ServerError),
        ];
        for (err, expected) in cases {
            assert_eq!(classify(&err), expected, "{err:?}");
        }
    }

    #[test]
    fn dispositions() {
        assert_eq!(ErrorCategory::Canceled.disposition(), Disposition::Silent);
        assert_eq!(
            ErrorCategory::NotFound.disposition(),
            Disposition::PromptRecreate
        );
        assert_eq!(
            ErrorCategory::Unauthorized.disposition(),
            Disposition::Surface
        );
    }

    fn any_transport_error() -> impl Strategy<Value = TransportError> {
        prop_oneof![
            Just(TransportError::Canceled),
            (".*", ".*").prop_map(|(u, m)| TransportError::no_response(u, m)),
            (0u16..1000, ".*").prop_map(|(s, m)| TransportError::status(s, m)),
            ".*".prop_map(TransportError::Malformed),
        ]
    }

    proptest! {
        #[test]
        fn classification_is_stable_and_non_success(err in any_transport_error()) {
            let category = classify(&err);
            prop_assert_eq!(category, classify(&err.clone()));
            if let TransportError::Status { status, .. } = &err {
                if (500..600).contains(status) && *status != 500 {
                    prop_assert_eq!(category, ErrorCategory::ServerError);
                }
            }
            prop_assert!(!category.describe(&err).is_empty());
        }
    }
}
