pub mod answer;
pub mod error_info;
pub mod question;
pub mod status;
pub mod submission;

pub use answer::{AnswerEntry, AnswerValue, Answers, AttemptId, DraftSnapshot, ParticipantInfo};
pub use error_info::{ErrorInfo, ErrorKind, SuggestedAction};
pub use question::{AnswerShape, QuestionSet, QuestionSpec};
pub use status::{AutosaveStatus, SubmissionPhase};
pub use submission::{
    AttemptContext, FinalPayload, SubmissionOutcome, SubmissionRequest, SubmissionResponse,
};
