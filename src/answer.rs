//! Answer: at most one per question id. Immutable once persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The shape of the submitted payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerPayload {
    Voice {
        transcript: String,
        media_ref: Option<String>,
    },
    Text {
        text: String,
    },
    Code {
        source: String,
        language: String,
    },
    Mcq {
        selected_index: u32,
    },
    Fib {
        filled_slots: Vec<String>,
    },
}

/// An immutable, persisted answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub session_id: Uuid,
    pub question_id: Uuid,
    pub payload: AnswerPayload,
    /// Slice of the live transcript captured while the candidate answered,
    /// independent of the final payload (e.g. a voice answer's payload
    /// holds the finalized transcript; this holds the running one).
    pub live_transcript_slice: Option<String>,
    pub time_spent_seconds: u32,
    pub submitted_at: DateTime<Utc>,
}

impl Answer {
    pub fn new(
        session_id: Uuid,
        question_id: Uuid,
        payload: AnswerPayload,
        live_transcript_slice: Option<String>,
        time_spent_seconds: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            question_id,
            payload,
            live_transcript_slice,
            time_spent_seconds,
            submitted_at: Utc::now(),
        }
    }

    /// A short plain-text rendering used by the fallback scoring heuristic
    /// and by the review endpoint.
    pub fn text_content(&self) -> String {
        match &self.payload {
            AnswerPayload::Voice { transcript, .. } => transcript.clone(),
            AnswerPayload::Text { text } => text.clone(),
            AnswerPayload::Code { source, .. } => source.clone(),
            AnswerPayload::Mcq { selected_index } => format!("option {selected_index}"),
            AnswerPayload::Fib { filled_slots } => filled_slots.join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_renders_each_variant() {
        let a = Answer::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AnswerPayload::Text {
                text: "hello".into(),
            },
            None,
            12,
        );
        assert_eq!(a.text_content(), "hello");
    }
}
