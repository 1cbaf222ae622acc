use std::sync::Arc;

use crate::metrics::record_draft_operation;
use crate::models::{AttemptId, DraftSnapshot};
use crate::services::durable_store::DurableStore;

pub const DEFAULT_KEY_PREFIX: &str = "quiz_draft_";

/// Serializes drafts into the durable store. Never fails loudly: storage
/// problems become `false`/`None` and a warning.
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn DurableStore>,
    key_prefix: String,
}

impl DraftStore {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self::with_prefix(store, DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn DurableStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn key_for(&self, attempt_id: &AttemptId) -> String {
        format!("{}{}", self.key_prefix, attempt_id)
    }

    pub async fn save(&self, attempt_id: &AttemptId, draft: &DraftSnapshot) -> bool {
        let key = self.key_for(attempt_id);

        let json = match serde_json::to_string(draft) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(attempt_id = %attempt_id, error = %e, "Failed to serialize draft");
                record_draft_operation("save", false);
                return false;
            }
        };

        match self.store.set_item(&key, &json).await {
            Ok(()) => {
                tracing::debug!(
                    attempt_id = %attempt_id,
                    answers = draft.answers.len(),
                    bytes = json.len(),
                    "Draft saved"
                );
                record_draft_operation("save", true);
                true
            }
            Err(e) => {
                tracing::warn!(attempt_id = %attempt_id, error = %e, "Failed to save draft");
                record_draft_operation("save", false);
                false
            }
        }
    }

    /// Absent and corrupt entries both come back as `None`.
    pub async fn restore(&self, attempt_id: &AttemptId) -> Option<DraftSnapshot> {
        let key = self.key_for(attempt_id);

        let raw = match self.store.get_item(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                record_draft_operation("restore", true);
                return None;
            }
            Err(e) => {
                tracing::warn!(attempt_id = %attempt_id, error = %e, "Failed to read draft");
                record_draft_operation("restore", false);
                return None;
            }
        };

        match serde_json::from_str::<DraftSnapshot>(&raw) {
            Ok(draft) => {
                record_draft_operation("restore", true);
                Some(draft)
            }
            Err(e) => {
                tracing::warn!(
                    attempt_id = %attempt_id,
                    error = %e,
                    "Ignoring corrupt draft entry"
                );
                record_draft_operation("restore", false);
                None
            }
        }
    }

    /// Best effort, idempotent.
    pub async fn clear(&self, attempt_id: &AttemptId) {
        let key = self.key_for(attempt_id);
        match self.store.remove_item(&key).await {
            Ok(()) => {
                tracing::debug!(attempt_id = %attempt_id, "Draft cleared");
                record_draft_operation("clear", true);
            }
            Err(e) => {
                tracing::warn!(attempt_id = %attempt_id, error = %e, "Failed to clear draft");
                record_draft_operation("clear", false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerEntry, AnswerValue, Answers, ParticipantInfo};
    use crate::services::durable_store::MemoryStore;

    fn draft_with(question_id: &str, value: AnswerValue) -> DraftSnapshot {
        let mut answers = Answers::new();
        answers.insert(
            question_id.to_string(),
            AnswerEntry {
                question_id: question_id.to_string(),
                answer: value,
            },
        );
        DraftSnapshot::new(
            answers,
            ParticipantInfo {
                name: Some("Ada".to_string()),
                email: None,
            },
        )
    }

    #[tokio::test]
    async fn save_then_restore_returns_same_draft() {
        let memory = MemoryStore::new();
        let drafts = DraftStore::new(Arc::new(memory.clone()));
        let attempt = AttemptId::new("quiz-1");
        let draft = draft_with("q1", AnswerValue::Text("A".to_string()));

        assert!(drafts.save(&attempt, &draft).await);
        assert!(memory.raw("quiz_draft_quiz-1").is_some());
        assert_eq!(drafts.restore(&attempt).await, Some(draft));
    }

    #[tokio::test]
    async fn keys_are_namespaced_per_attempt() {
        let memory = MemoryStore::new();
        let drafts = DraftStore::new(Arc::new(memory.clone()));

        let first = draft_with("q1", AnswerValue::Bool(true));
        let second = draft_with("q1", AnswerValue::Bool(false));
        drafts.save(&AttemptId::new("quiz-a"), &first).await;
        drafts.save(&AttemptId::new("quiz-b"), &second).await;

        assert_eq!(memory.len(), 2);
        assert_eq!(drafts.restore(&AttemptId::new("quiz-a")).await, Some(first));
    }

    #[tokio::test]
    async fn corrupt_entries_are_treated_as_absent() {
        let memory = MemoryStore::new();
        memory.insert_raw("quiz_draft_quiz-1", "{not json");
        let drafts = DraftStore::new(Arc::new(memory));

        assert_eq!(drafts.restore(&AttemptId::new("quiz-1")).await, None);
    }

    #[tokio::test]
    async fn storage_failures_return_false() {
        let drafts = DraftStore::new(Arc::new(MemoryStore::with_quota(8)));
        let draft = draft_with("q1", AnswerValue::Text("long answer".to_string()));

        assert!(!drafts.save(&AttemptId::new("quiz-1"), &draft).await);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let memory = MemoryStore::new();
        let drafts = DraftStore::new(Arc::new(memory.clone()));
        let attempt = AttemptId::new("quiz-1");
        drafts
            .save(&attempt, &draft_with("q1", AnswerValue::Null))
            .await;

        drafts.clear(&attempt).await;
        drafts.clear(&attempt).await;

        assert!(memory.is_empty());
        assert_eq!(drafts.restore(&attempt).await, None);
    }
}
