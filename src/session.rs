//! Session: the root aggregate. Every other record is orphaned without one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Interview mode a candidate may be asked questions from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Behavioral,
    Coding,
    Scenario,
    Random,
}

/// Difficulty selection. `Adaptive` is resolved to a concrete per-question
/// difficulty by the AI Proxy; the session's own field is never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Adaptive,
}

/// Candidate experience, in whole years plus a remainder of months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    pub years: u32,
    pub months: u32,
}

/// Immutable configuration captured at session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub role_category: String,
    pub experience: Experience,
    pub modes: Vec<Mode>,
    pub question_count: u32,
    pub duration_limit_minutes: u32,
    pub language: String,
    pub accent: Option<String>,
    pub difficulty: Difficulty,
    pub job_description: Option<String>,
    pub resume_reference: Option<String>,
    pub company_targets: Vec<String>,
    pub include_curated_questions: bool,
    pub allow_ai_generated: bool,
    pub allow_mcq: bool,
    pub allow_fib: bool,
    pub consent_recording: bool,
    pub consent_anti_cheat: bool,
    pub consent_timestamp: DateTime<Utc>,
}

/// Validation errors for [`SessionConfig`], checked once at creation time.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("question_count must be between 5 and 20, got {0}")]
    QuestionCount(u32),
    #[error("duration_limit must be between 15 and 90 minutes, got {0}")]
    DurationLimit(u32),
    #[error("modes must not be empty")]
    EmptyModes,
    #[error("both consent flags are required to create a session")]
    MissingConsent,
}

impl SessionConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if !(5..=20).contains(&self.question_count) {
            return Err(ConfigValidationError::QuestionCount(self.question_count));
        }
        if !(15..=90).contains(&self.duration_limit_minutes) {
            return Err(ConfigValidationError::DurationLimit(
                self.duration_limit_minutes,
            ));
        }
        if self.modes.is_empty() {
            return Err(ConfigValidationError::EmptyModes);
        }
        if !self.consent_recording || !self.consent_anti_cheat {
            return Err(ConfigValidationError::MissingConsent);
        }
        Ok(())
    }
}

/// The session's mutable lifecycle state. The state machine is the sole
/// mutator of this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    PendingPrecheck,
    Ready,
    Active,
    Paused,
    Completed,
    Ended,
}

impl SessionState {
    /// Terminal states accept no further writes.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Ended)
    }
}

/// The session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub config: SessionConfig,
    pub state: SessionState,
    pub asked_count: u32,
    pub answered_count: u32,
    pub strike_minor_count: u32,
    pub strike_major_count: u32,
    /// Tail of the anti-cheat event chain: sequence number of the last
    /// accepted event (0 if none yet).
    pub tail_seq: u64,
    /// Hex-encoded hash of the last accepted event's canonical encoding
    /// (empty string if no event has been accepted yet).
    pub tail_hash: String,
    /// Bumped every time the state machine transitions out of `Active`.
    /// Embedded in minted AIPT/UPT token ids so a stale token (minted under
    /// a previous generation) fails verification even before it expires.
    pub token_generation: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(owner_id: Uuid, config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            config,
            state: SessionState::PendingPrecheck,
            asked_count: 0,
            answered_count: 0,
            strike_minor_count: 0,
            strike_major_count: 0,
            tail_seq: 0,
            tail_hash: String::new(),
            token_generation: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// `answeredCount <= askedCount <= questionCount` invariant, checked
    /// after every counter mutation in debug builds by callers.
    pub fn counters_are_consistent(&self) -> bool {
        self.answered_count <= self.asked_count
            && self.asked_count <= self.config.question_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> SessionConfig {
        SessionConfig {
            role_category: "QA".into(),
            experience: Experience {
                years: 5,
                months: 0,
            },
            modes: vec![Mode::Behavioral],
            question_count: 2,
            duration_limit_minutes: 30,
            language: "en-us".into(),
            accent: None,
            difficulty: Difficulty::Adaptive,
            job_description: None,
            resume_reference: None,
            company_targets: vec![],
            include_curated_questions: true,
            allow_ai_generated: true,
            allow_mcq: false,
            allow_fib: false,
            consent_recording: true,
            consent_anti_cheat: true,
            consent_timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_session_starts_pending_precheck() {
        let s = Session::new(Uuid::new_v4(), sample_config());
        assert_eq!(s.state, SessionState::PendingPrecheck);
        assert_eq!(s.tail_seq, 0);
        assert!(s.tail_hash.is_empty());
    }

    #[test]
    fn validate_rejects_out_of_range_question_count() {
        let mut cfg = sample_config();
        cfg.question_count = 3;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::QuestionCount(3))
        ));
    }

    #[test]
    fn validate_requires_both_consents() {
        let mut cfg = sample_config();
        cfg.consent_anti_cheat = false;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::MissingConsent)
        ));
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Ended.is_terminal());
        assert!(!SessionState::Active.is_terminal());
    }
}
