use serde::{Deserialize, Serialize};

/// Self-clearing autosave indicator. `Idle` is the "null" state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutosaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// Submission state machine of a capture session.
///
/// `Idle -> Submitting -> {Success, Retrying, OfflineSaved, Error}`, where
/// `Retrying` loops back to `Submitting` once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPhase {
    #[default]
    Idle,
    Submitting,
    Retrying,
    Success,
    OfflineSaved,
    Error,
}

impl SubmissionPhase {
    pub fn is_busy(&self) -> bool {
        matches!(self, SubmissionPhase::Submitting | SubmissionPhase::Retrying)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionPhase::Idle => "idle",
            SubmissionPhase::Submitting => "submitting",
            SubmissionPhase::Retrying => "retrying",
            SubmissionPhase::Success => "success",
            SubmissionPhase::OfflineSaved => "offline_saved",
            SubmissionPhase::Error => "error",
        }
    }
}
