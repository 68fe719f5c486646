//! Request/response DTOs for the HTTP gateway, plus the standard error
//! envelope. Domain types (`Session`, `Question`, ...) never derive the
//! wire format directly in handlers beyond `serde` — this module is where
//! a DTO intentionally diverges from its domain counterpart (e.g. hiding
//! internal ids, flattening an enum for the client).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anticheat::{AntiCheatEventInput, EventType};
use crate::session::{Difficulty, Experience, Mode, SessionConfig, SessionState};
use crate::summary::Summary;

// ============================================================================
// Error envelope
// ============================================================================

/// Standard API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            request_id: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Stable error codes, one per row of the error taxonomy. Mirrors
/// [`crate::error::AppError::kind`] but upper-cased, matching the teacher's
/// `SCREAMING_SNAKE_CASE` wire convention for codes (`error_codes` in
/// `dashflow-registry/src/api/types.rs`).
pub mod error_codes {
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
    pub const TOKEN_WRONG_AUDIENCE: &str = "TOKEN_WRONG_AUDIENCE";
    pub const TOKEN_WRONG_SESSION: &str = "TOKEN_WRONG_SESSION";
    pub const TOKEN_ALREADY_USED: &str = "TOKEN_ALREADY_USED";
    pub const INVALID_STATE: &str = "INVALID_STATE";
    pub const CHAIN_BROKEN: &str = "CHAIN_BROKEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub user_token: String,
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub role_category: String,
    pub experience: Experience,
    pub modes: Vec<Mode>,
    pub question_count: u32,
    pub duration_limit_minutes: u32,
    pub language: String,
    #[serde(default)]
    pub accent: Option<String>,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub job_description: Option<String>,
    #[serde(default)]
    pub resume_reference: Option<String>,
    #[serde(default)]
    pub company_targets: Vec<String>,
    #[serde(default)]
    pub include_curated_questions: bool,
    #[serde(default)]
    pub allow_ai_generated: bool,
    #[serde(default)]
    pub allow_mcq: bool,
    #[serde(default)]
    pub allow_fib: bool,
    pub consent_recording: bool,
    pub consent_anti_cheat: bool,
}

impl CreateSessionRequest {
    pub fn into_config(self) -> SessionConfig {
        SessionConfig {
            role_category: self.role_category,
            experience: self.experience,
            modes: self.modes,
            question_count: self.question_count,
            duration_limit_minutes: self.duration_limit_minutes,
            language: self.language,
            accent: self.accent,
            difficulty: self.difficulty,
            job_description: self.job_description,
            resume_reference: self.resume_reference,
            company_targets: self.company_targets,
            include_curated_questions: self.include_curated_questions,
            allow_ai_generated: self.allow_ai_generated,
            allow_mcq: self.allow_mcq,
            allow_fib: self.allow_fib,
            consent_recording: self.consent_recording,
            consent_anti_cheat: self.consent_anti_cheat,
            consent_timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub state: SessionState,
    pub asked_count: u32,
    pub answered_count: u32,
    pub question_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&crate::session::Session> for SessionResponse {
    fn from(s: &crate::session::Session) -> Self {
        Self {
            id: s.id,
            state: s.state,
            asked_count: s.asked_count,
            answered_count: s.answered_count,
            question_count: s.config.question_count,
            created_at: s.created_at,
        }
    }
}

/// Returned from session creation: the session plus the IST token minted
/// for it, since every subsequent call needs that token and there is no
/// separate "mint my own IST" endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCreateResponse {
    pub session: SessionResponse,
    pub ist_token: String,
    pub expires_at: DateTime<Utc>,
}

/// `GET /interview/{id}/state`'s response. spec.md §6 names exactly
/// `{state, askedCount}`; the strike/tail counters are supplemental and kept
/// for a richer client-side progress display.
#[derive(Debug, Clone, Serialize)]
pub struct StateResponse {
    pub state: SessionState,
    pub asked_count: u32,
    pub tail_seq: u64,
    pub strike_minor_count: u32,
    pub strike_major_count: u32,
}

impl From<&crate::session::Session> for StateResponse {
    fn from(s: &crate::session::Session) -> Self {
        Self {
            state: s.state,
            asked_count: s.asked_count,
            tail_seq: s.tail_seq,
            strike_minor_count: s.strike_minor_count,
            strike_major_count: s.strike_major_count,
        }
    }
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// `/token/refresh`'s response: only the capability tokens still applicable
/// in the session's current state are present (spec.md §6: "Returns
/// `{ist?, wst?}` (only the ones still applicable in current state)").
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshTokenResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ist: Option<TokenResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wst: Option<TokenResponse>,
}

/// Returned from `/start`: the capability tokens for the live-interview
/// phase. Minting these does not itself move the session out of `Ready` —
/// per spec.md §6, that happens lazily on the first `/next-question` call.
#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub wst_token: String,
    pub aipt_token: String,
    pub upt_token: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Precheck
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PrecheckRequest {
    pub camera_ok: bool,
    pub microphone_ok: bool,
    pub fullscreen_ok: bool,
    pub network_ok: bool,
    /// Anti-cheat events carried alongside the pre-check submission,
    /// ingested through the same chain-verification path as
    /// `/anti-cheat` (spec.md §6: "Persists events through the engine
    /// first").
    #[serde(default)]
    pub events: Vec<AntiCheatEventInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrecheckResponse {
    pub can_proceed: bool,
    pub failing_checks: Vec<&'static str>,
}

// ============================================================================
// Interview flow
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct QuestionResponse {
    pub id: Uuid,
    pub ordinal: u32,
    pub question_type: crate::question::QuestionType,
    pub text: String,
    pub metadata: crate::question::QuestionMetadata,
}

impl From<crate::question::Question> for QuestionResponse {
    fn from(q: crate::question::Question) -> Self {
        Self {
            id: q.id,
            ordinal: q.ordinal,
            question_type: q.question_type,
            text: q.text,
            metadata: q.metadata,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    pub payload: crate::answer::AnswerPayload,
    #[serde(default)]
    pub live_transcript_slice: Option<String>,
    pub time_spent_seconds: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerAckResponse {
    pub answer_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeEvalRequest {
    pub question_id: Uuid,
    pub source: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeEvalResponse {
    pub passed: bool,
    pub test_results: Vec<CodeEvalTestResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeEvalTestResult {
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
}

// ============================================================================
// Anti-cheat
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AntiCheatBatchRequest {
    pub events: Vec<AntiCheatEventInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AntiCheatBatchResponse {
    pub accepted: usize,
    pub tail_seq: u64,
    pub tail_hash: String,
}

/// `GET /interview/{id}/anti-cheat/tail`'s response. spec.md §6/§8 name
/// these fields `{seq, hash}` (distinct from the batch-submission response
/// above, which uses `tailSeq`/`tailHash`).
#[derive(Debug, Clone, Serialize)]
pub struct AntiCheatTailResponse {
    pub seq: u64,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrikeResponse {
    pub event_type: EventType,
    pub severity: crate::anticheat::Severity,
    pub action: crate::anticheat::StrikeAction,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Finalize / summary / review
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeResponse {
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse(pub Summary);

/// A question paired with its (optional, if not yet answered) answer, for
/// the per-question review endpoint. Distinct from [`SummaryResponse`],
/// which carries the AI Proxy's rubric verdict rather than raw content.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewEntry {
    pub question: QuestionResponse,
    pub answer_text: Option<String>,
    pub time_spent_seconds: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewResponse {
    pub entries: Vec<ReviewEntry>,
}

// ============================================================================
// Media upload
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub blob_ref: String,
}
