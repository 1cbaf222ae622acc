use serde::{Deserialize, Serialize};

/// Closed classification of a failure. Drives retry eligibility and messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Offline,
    Validation,
    TransientServer,
    TransientNetwork,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Offline => "offline",
            ErrorKind::Validation => "validation",
            ErrorKind::TransientServer => "transient_server",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Fixed, localizable text shown to the respondent.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Offline => {
                "You are offline. Your answers are saved on this device and will be submitted when the connection returns."
            }
            ErrorKind::Validation => {
                "Some answers could not be accepted. Please review them and try again."
            }
            ErrorKind::TransientServer => {
                "The server is busy right now. We will retry your submission shortly."
            }
            ErrorKind::TransientNetwork => {
                "The connection was interrupted. We will retry your submission shortly."
            }
            ErrorKind::Unknown => {
                "Something went wrong while submitting. Your answers are still on this device."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Retry,
    AutoSave,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub user_message: String,
    pub can_retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    pub suggested_action: SuggestedAction,
}

impl ErrorInfo {
    pub fn with_retry_delay(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = Some(delay_ms);
        self
    }
}
