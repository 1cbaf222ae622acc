//! Maps raw submission failures to a typed [`ErrorInfo`].
//!
//! This table is the only place that decides whether a failure is worth
//! retrying. Rules are evaluated in priority order, first match wins:
//!
//! 1. no connectivity at call time -> `Offline` (no timer, wait for reconnect)
//! 2. 4xx carrying field errors -> `Validation`
//! 3. 429 or 5xx -> `TransientServer` (endpoint hint or default delay)
//! 4. timeout, reset or refused connection -> `TransientNetwork`
//! 5. anything else -> `Unknown`

use std::time::Duration;

use crate::models::{ErrorInfo, ErrorKind, SuggestedAction};
use crate::services::submission_client::{SubmissionFailure, TransportKind};

pub const DEFAULT_RETRY_DELAY_MS: u64 = 3000;

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    default_retry_delay: Duration,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_RETRY_DELAY_MS))
    }
}

impl ErrorClassifier {
    pub fn new(default_retry_delay: Duration) -> Self {
        Self {
            default_retry_delay,
        }
    }

    /// Total: every failure yields an `ErrorInfo`.
    pub fn classify(&self, failure: &SubmissionFailure) -> ErrorInfo {
        let default_delay = self.default_retry_delay.as_millis() as u64;
        let message = failure.to_string();

        match failure {
            SubmissionFailure::Offline => info_for(ErrorKind::Offline, message),
            SubmissionFailure::Rejected {
                status,
                field_errors,
                ..
            } if (400..500).contains(status) && !field_errors.is_empty() => {
                info_for(ErrorKind::Validation, message)
            }
            SubmissionFailure::Rejected {
                status,
                retry_after,
                ..
            } if *status == 429 || (500..600).contains(status) => {
                let delay = retry_after
                    .map(|hint| hint.as_millis() as u64)
                    .unwrap_or(default_delay);
                info_for(ErrorKind::TransientServer, message).with_retry_delay(delay)
            }
            SubmissionFailure::Transport { kind, .. }
                if matches!(
                    kind,
                    TransportKind::Timeout | TransportKind::ConnectionReset | TransportKind::Connect
                ) =>
            {
                info_for(ErrorKind::TransientNetwork, message).with_retry_delay(default_delay)
            }
            _ => info_for(ErrorKind::Unknown, message),
        }
    }

    pub fn can_retry(&self, failure: &SubmissionFailure) -> bool {
        self.classify(failure).can_retry
    }
}

/// Classifies with the default retry delay.
pub fn classify(failure: &SubmissionFailure) -> ErrorInfo {
    ErrorClassifier::default().classify(failure)
}

/// Fixed retry policy and user message per kind.
pub fn info_for(kind: ErrorKind, message: impl Into<String>) -> ErrorInfo {
    let (can_retry, suggested_action) = match kind {
        ErrorKind::Offline => (true, SuggestedAction::AutoSave),
        ErrorKind::TransientServer | ErrorKind::TransientNetwork => (true, SuggestedAction::Retry),
        ErrorKind::Validation | ErrorKind::Unknown => (false, SuggestedAction::None),
    };

    ErrorInfo {
        kind,
        message: message.into(),
        user_message: kind.user_message().to_string(),
        can_retry,
        retry_delay_ms: None,
        suggested_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn rejected(status: u16, fields: &[(&str, &str)]) -> SubmissionFailure {
        SubmissionFailure::Rejected {
            status,
            message: "rejected".to_string(),
            field_errors: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            retry_after: None,
        }
    }

    #[test]
    fn offline_suggests_auto_save_without_delay() {
        let info = classify(&SubmissionFailure::Offline);

        assert_eq!(info.kind, ErrorKind::Offline);
        assert!(info.can_retry);
        assert_eq!(info.retry_delay_ms, None);
        assert_eq!(info.suggested_action, SuggestedAction::AutoSave);
    }

    #[test]
    fn field_errors_are_validation_failures() {
        let info = classify(&rejected(422, &[("q1", "required")]));

        assert_eq!(info.kind, ErrorKind::Validation);
        assert!(!info.can_retry);
        assert_eq!(info.suggested_action, SuggestedAction::None);
    }

    #[test]
    fn server_errors_default_to_three_seconds() {
        let info = classify(&rejected(503, &[]));

        assert_eq!(info.kind, ErrorKind::TransientServer);
        assert!(info.can_retry);
        assert_eq!(info.retry_delay_ms, Some(3000));
    }

    #[test]
    fn rate_limit_honours_endpoint_hint() {
        let failure = SubmissionFailure::Rejected {
            status: 429,
            message: "slow down".to_string(),
            field_errors: HashMap::new(),
            retry_after: Some(Duration::from_secs(7)),
        };
        let info = classify(&failure);

        assert_eq!(info.kind, ErrorKind::TransientServer);
        assert_eq!(info.retry_delay_ms, Some(7000));
    }

    #[test]
    fn timeouts_are_transient_network() {
        let info = classify(&SubmissionFailure::Transport {
            kind: TransportKind::Timeout,
            message: "timed out".to_string(),
        });

        assert_eq!(info.kind, ErrorKind::TransientNetwork);
        assert!(info.can_retry);
        assert_eq!(info.retry_delay_ms, Some(3000));
        assert_eq!(info.suggested_action, SuggestedAction::Retry);
    }

    #[test]
    fn unrecognized_failures_are_unknown() {
        for failure in [
            rejected(404, &[]),
            rejected(400, &[]),
            SubmissionFailure::Malformed("no success flag".to_string()),
            SubmissionFailure::Transport {
                kind: TransportKind::Other,
                message: "tls".to_string(),
            },
        ] {
            let info = classify(&failure);
            assert_eq!(info.kind, ErrorKind::Unknown, "{:?}", failure);
            assert!(!info.can_retry);
        }
    }

    #[test]
    fn custom_default_delay_is_used() {
        let classifier = ErrorClassifier::new(Duration::from_millis(500));
        let info = classifier.classify(&rejected(500, &[]));

        assert_eq!(info.retry_delay_ms, Some(500));
    }
}
