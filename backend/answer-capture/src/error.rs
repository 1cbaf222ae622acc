use thiserror::Error;

use crate::models::{ErrorInfo, ErrorKind};
use crate::services::error_classifier;

/// Errors surfaced synchronously by the capture session's public operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("question '{question_id}' expects {expected}, got {actual}")]
    InvalidAnswer {
        question_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("question '{0}' is not part of this quiz")]
    UnknownQuestion(String),

    #[error("the current error does not allow a retry")]
    RetryNotAllowed,

    #[error("there is no failed submission to retry")]
    NothingToRetry,

    #[error("a submission is already in progress")]
    SubmissionInProgress,

    #[error("this attempt has already been submitted")]
    AlreadySubmitted,

    #[error("the capture session has been shut down")]
    SessionClosed,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::InvalidAnswer { .. } | CaptureError::UnknownQuestion(_) => {
                ErrorKind::Validation
            }
            _ => ErrorKind::Unknown,
        }
    }

    pub fn error_info(&self) -> ErrorInfo {
        error_classifier::info_for(self.kind(), self.to_string())
    }
}

/// Failures of the durable local store. Absorbed by the draft store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item of {size} bytes exceeds the {limit} byte quota")]
    QuotaExceeded { size: usize, limit: usize },

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
