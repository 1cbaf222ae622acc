use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identity of one respondent's pass at one quiz. Quiz id granularity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    pub fn new(quiz_id: impl Into<String>) -> Self {
        Self(quiz_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed union of answer payloads. `Null` means "unanswered".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Choices(Vec<String>),
    Mapping(BTreeMap<String, String>),
}

impl AnswerValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AnswerValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AnswerValue::Null => "null",
            AnswerValue::Bool(_) => "boolean",
            AnswerValue::Number(_) => "number",
            AnswerValue::Text(_) => "string",
            AnswerValue::Choices(_) => "string array",
            AnswerValue::Mapping(_) => "mapping",
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Text(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        AnswerValue::Text(value)
    }
}

impl From<bool> for AnswerValue {
    fn from(value: bool) -> Self {
        AnswerValue::Bool(value)
    }
}

impl From<f64> for AnswerValue {
    fn from(value: f64) -> Self {
        AnswerValue::Number(value)
    }
}

impl From<Vec<String>> for AnswerValue {
    fn from(value: Vec<String>) -> Self {
        AnswerValue::Choices(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntry {
    pub question_id: String,
    pub answer: AnswerValue,
}

/// At most one entry per question id.
pub type Answers = HashMap<String, AnswerEntry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ParticipantInfo {
    /// Shallow merge: fields present in `partial` overwrite, absent ones are kept.
    pub fn merge(&mut self, partial: ParticipantInfo) {
        if let Some(name) = partial.name {
            self.name = Some(name);
        }
        if let Some(email) = partial.email {
            self.email = Some(email);
        }
    }
}

/// Wholesale copy of the session state written by one autosave cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
    pub answers: Answers,
    #[serde(default)]
    pub participant_info: ParticipantInfo,
    pub saved_at: DateTime<Utc>,
}

impl DraftSnapshot {
    pub fn new(answers: Answers, participant_info: ParticipantInfo) -> Self {
        Self {
            answers,
            participant_info,
            saved_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_value_uses_natural_json_shapes() {
        let parsed: Vec<AnswerValue> =
            serde_json::from_value(json!([null, true, 3.5, "A", ["a", "b"], {"k": "v"}])).unwrap();

        assert_eq!(parsed[0], AnswerValue::Null);
        assert_eq!(parsed[1], AnswerValue::Bool(true));
        assert_eq!(parsed[2], AnswerValue::Number(3.5));
        assert_eq!(parsed[3], AnswerValue::Text("A".to_string()));
        assert_eq!(
            parsed[4],
            AnswerValue::Choices(vec!["a".to_string(), "b".to_string()])
        );
        assert!(matches!(parsed[5], AnswerValue::Mapping(ref m) if m["k"] == "v"));
    }

    #[test]
    fn participant_merge_keeps_absent_fields() {
        let mut info = ParticipantInfo {
            name: Some("Ada".to_string()),
            email: None,
        };
        info.merge(ParticipantInfo {
            name: None,
            email: Some("ada@example.com".to_string()),
        });

        assert_eq!(info.name.as_deref(), Some("Ada"));
        assert_eq!(info.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn draft_snapshot_serializes_camel_case() {
        let draft = DraftSnapshot::new(Answers::new(), ParticipantInfo::default());
        let value = serde_json::to_value(&draft).unwrap();

        assert!(value.get("participantInfo").is_some());
        assert!(value.get("savedAt").is_some());
    }
}
