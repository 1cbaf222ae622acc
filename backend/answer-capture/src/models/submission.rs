use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::answer::{AnswerEntry, AttemptId, ParticipantInfo};
use super::error_info::ErrorInfo;

/// Caller-supplied context for the final "finish" action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptContext {
    pub attempt_id: AttemptId,
    /// Stable across every retry of one submission cycle so the endpoint can
    /// deduplicate replays.
    pub idempotency_key: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: FinalPayload,
}

/// Request body sent to the Submission Endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub attempt_context: AttemptContext,
    pub answers: Vec<AnswerEntry>,
    pub participant_info: ParticipantInfo,
}

/// Response body of the Submission Endpoint, success or structured failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub field_errors: HashMap<String, String>,
}

/// Terminal value of one submission cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Success { response_id: String },
    Failure { error: ErrorInfo },
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionOutcome::Success { .. })
    }

    pub fn response_id(&self) -> Option<&str> {
        match self {
            SubmissionOutcome::Success { response_id } => Some(response_id),
            SubmissionOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            SubmissionOutcome::Success { .. } => None,
            SubmissionOutcome::Failure { error } => Some(error),
        }
    }
}
