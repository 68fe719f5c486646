//! The end-of-session summary: rubric scores, per-question review, and the
//! anti-cheat verdict, assembled by the AI Proxy at finalize time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anticheat::{Severity, StrikeAction};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricScore {
    pub dimension: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionReview {
    pub question_id: Uuid,
    pub ordinal: u32,
    pub score: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeTimelineEntry {
    pub severity: Severity,
    pub event_type: String,
    pub action: StrikeAction,
    pub occurred_at: DateTime<Utc>,
}

/// The anti-cheat engine's final verdict on session integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityVerdict {
    Clean,
    MinorConcerns,
    Flagged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub session_id: Uuid,
    pub rubric_scores: Vec<RubricScore>,
    pub overall_score: f64,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub question_reviews: Vec<QuestionReview>,
    pub integrity_verdict: IntegrityVerdict,
    pub strike_timeline: Vec<StrikeTimelineEntry>,
    pub generated_at: DateTime<Utc>,
}

impl Summary {
    /// Weighted overall score from per-dimension rubric scores, using
    /// [`crate::policy::RUBRIC_WEIGHTS`].
    pub fn weighted_overall(rubric_scores: &[RubricScore]) -> f64 {
        let mut total = 0.0;
        for weight in crate::policy::RUBRIC_WEIGHTS {
            if let Some(score) = rubric_scores
                .iter()
                .find(|r| r.dimension == weight.dimension)
            {
                total += score.score * weight.weight;
            }
        }
        total
    }

    pub fn integrity_verdict_for(strike_minor_count: u32, strike_major_count: u32) -> IntegrityVerdict {
        if strike_major_count > 0 {
            IntegrityVerdict::Flagged
        } else if strike_minor_count > 0 {
            IntegrityVerdict::MinorConcerns
        } else {
            IntegrityVerdict::Clean
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_overall_matches_hand_computed_value() {
        let scores = vec![
            RubricScore {
                dimension: "communication".into(),
                score: 8.0,
            },
            RubricScore {
                dimension: "technical_accuracy".into(),
                score: 6.0,
            },
            RubricScore {
                dimension: "problem_solving".into(),
                score: 7.0,
            },
            RubricScore {
                dimension: "confidence".into(),
                score: 9.0,
            },
        ];
        let overall = Summary::weighted_overall(&scores);
        let expected = 8.0 * 0.25 + 6.0 * 0.35 + 7.0 * 0.25 + 9.0 * 0.15;
        assert!((overall - expected).abs() < 1e-9);
    }

    #[test]
    fn integrity_verdict_prioritizes_major_over_minor() {
        assert_eq!(
            Summary::integrity_verdict_for(2, 1),
            IntegrityVerdict::Flagged
        );
        assert_eq!(
            Summary::integrity_verdict_for(1, 0),
            IntegrityVerdict::MinorConcerns
        );
        assert_eq!(Summary::integrity_verdict_for(0, 0), IntegrityVerdict::Clean);
    }
}
