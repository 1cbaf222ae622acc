use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::answer::AnswerValue;

/// Expected shape of a question's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerShape {
    Text,
    Choices,
    Number,
    Boolean,
    Mapping,
    Any,
}

impl AnswerShape {
    pub fn accepts(&self, value: &AnswerValue) -> bool {
        match (self, value) {
            (_, AnswerValue::Null) => true,
            (AnswerShape::Any, AnswerValue::Number(n)) => n.is_finite(),
            (AnswerShape::Any, _) => true,
            (AnswerShape::Text, AnswerValue::Text(_)) => true,
            (AnswerShape::Choices, AnswerValue::Choices(_)) => true,
            (AnswerShape::Number, AnswerValue::Number(n)) => n.is_finite(),
            (AnswerShape::Boolean, AnswerValue::Bool(_)) => true,
            (AnswerShape::Mapping, AnswerValue::Mapping(_)) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnswerShape::Text => "string",
            AnswerShape::Choices => "string array",
            AnswerShape::Number => "finite number",
            AnswerShape::Boolean => "boolean",
            AnswerShape::Mapping => "mapping",
            AnswerShape::Any => "any answer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: String,
    pub shape: AnswerShape,
}

/// The questions of one quiz, keyed by question id.
#[derive(Debug, Clone, Default)]
pub struct QuestionSet {
    shapes: HashMap<String, AnswerShape>,
}

impl QuestionSet {
    pub fn new(questions: impl IntoIterator<Item = QuestionSpec>) -> Self {
        Self {
            shapes: questions.into_iter().map(|q| (q.id, q.shape)).collect(),
        }
    }

    pub fn shape_of(&self, question_id: &str) -> Option<AnswerShape> {
        self.shapes.get(question_id).copied()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
