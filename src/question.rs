//! Question: created exclusively by the AI Proxy via the State Machine.
//! Immutable once persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::Mode;

/// Question type, one per interview mode plus the MCQ/FIB question shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Behavioral,
    Coding,
    Scenario,
    Mcq,
    Fib,
}

impl QuestionType {
    /// The mode a generated question of this type counts against, for
    /// rotation/sampling bookkeeping. MCQ/FIB are drawn from whichever mode
    /// generated them and don't have a mode of their own.
    pub fn as_mode(self) -> Option<Mode> {
        match self {
            QuestionType::Behavioral => Some(Mode::Behavioral),
            QuestionType::Coding => Some(Mode::Coding),
            QuestionType::Scenario => Some(Mode::Scenario),
            QuestionType::Mcq | QuestionType::Fib => None,
        }
    }
}

/// Generator metadata, shaped per question type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionMetadata {
    Plain,
    Mcq { options: Vec<String> },
    Fib { slots: Vec<String> },
    Coding {
        function_name: String,
        signature: String,
        tests: Vec<CodingTestCase>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingTestCase {
    pub input: String,
    pub expected_output: String,
}

/// A draft produced by the AI Proxy, not yet assigned an ordinal or id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub question_type: QuestionType,
    pub text: String,
    pub metadata: QuestionMetadata,
}

/// A persisted, immutable question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub session_id: Uuid,
    /// 1-based, gapless within a session.
    pub ordinal: u32,
    pub question_type: QuestionType,
    pub text: String,
    pub metadata: QuestionMetadata,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn from_draft(session_id: Uuid, ordinal: u32, draft: QuestionDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            ordinal,
            question_type: draft.question_type,
            text: draft.text,
            metadata: draft.metadata,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_to_question_assigns_ordinal_and_id() {
        let draft = QuestionDraft {
            question_type: QuestionType::Behavioral,
            text: "Tell me about a time...".into(),
            metadata: QuestionMetadata::Plain,
        };
        let session_id = Uuid::new_v4();
        let q = Question::from_draft(session_id, 1, draft);
        assert_eq!(q.ordinal, 1);
        assert_eq!(q.session_id, session_id);
    }

    #[test]
    fn question_type_maps_to_mode() {
        assert_eq!(QuestionType::Coding.as_mode(), Some(Mode::Coding));
        assert_eq!(QuestionType::Mcq.as_mode(), None);
    }
}
