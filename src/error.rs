//! Error taxonomy for the interview backend.
//!
//! Every component (token authority, session store, state machine,
//! anti-cheat engine, AI proxy) raises [`AppError`]. The gateway is the only
//! place that converts an `AppError` into an HTTP response; component code
//! never constructs a status code.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;

/// Stable error kinds, one per row of the error taxonomy.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum AppError {
    /// Missing or invalid session cookie.
    #[error("unauthenticated")]
    Unauthenticated,

    /// No token was supplied where one is required.
    #[error("token missing")]
    TokenMissing,

    /// Token signature or structure is invalid.
    #[error("token invalid: {0}")]
    TokenInvalid(String),

    /// Token's `exp` has passed.
    #[error("token expired")]
    TokenExpired,

    /// Token's audience does not match what the endpoint requires.
    #[error("token wrong audience: expected {expected}, got {actual}")]
    TokenWrongAudience { expected: String, actual: String },

    /// Token is bound to a different session than the path parameter.
    #[error("token wrong session")]
    TokenWrongSession,

    /// A one-shot token (UPT) was presented a second time.
    #[error("token already used")]
    TokenAlreadyUsed,

    /// Operation not permitted in the session's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Anti-cheat batch failed the sequence/hash check.
    #[error("chain broken at seq {tail_seq}")]
    ChainBroken { tail_seq: u64, tail_hash: String },

    /// Session, question, or answer id unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate answer for a question, or a second session create race.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Request body or query failed schema/range validation.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Per-session concurrency guard (e.g. two next-question calls racing).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Unexpected internal failure. Never leaks store/provider error strings
    /// verbatim to the client.
    #[error("internal error")]
    Internal(String),
}

impl AppError {
    /// Stable string identifier used in the client-visible error body and in
    /// structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::TokenMissing => "token_missing",
            AppError::TokenInvalid(_) => "token_invalid",
            AppError::TokenExpired => "token_expired",
            AppError::TokenWrongAudience { .. } => "token_wrong_audience",
            AppError::TokenWrongSession => "token_wrong_session",
            AppError::TokenAlreadyUsed => "token_already_used",
            AppError::InvalidState(_) => "invalid_state",
            AppError::ChainBroken { .. } => "chain_broken",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::RateLimited(_) => "rate_limited",
            AppError::Internal(_) => "internal",
        }
    }
}

#[cfg(feature = "server")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use crate::api::types::{error_codes, ApiError};
        use axum::http::StatusCode;
        use axum::Json;

        let status = match &self {
            AppError::Unauthenticated | AppError::TokenMissing => StatusCode::UNAUTHORIZED,
            AppError::TokenInvalid(_)
            | AppError::TokenExpired
            | AppError::TokenWrongAudience { .. }
            | AppError::TokenWrongSession
            | AppError::TokenAlreadyUsed => StatusCode::UNAUTHORIZED,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::ChainBroken { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let code = match self.kind() {
            "unauthenticated" => error_codes::UNAUTHENTICATED,
            "token_missing" => error_codes::TOKEN_MISSING,
            "token_invalid" => error_codes::TOKEN_INVALID,
            "token_expired" => error_codes::TOKEN_EXPIRED,
            "token_wrong_audience" => error_codes::TOKEN_WRONG_AUDIENCE,
            "token_wrong_session" => error_codes::TOKEN_WRONG_SESSION,
            "token_already_used" => error_codes::TOKEN_ALREADY_USED,
            "invalid_state" => error_codes::INVALID_STATE,
            "chain_broken" => error_codes::CHAIN_BROKEN,
            "not_found" => error_codes::NOT_FOUND,
            "already_exists" => error_codes::ALREADY_EXISTS,
            "validation_failed" => error_codes::VALIDATION_FAILED,
            "rate_limited" => error_codes::RATE_LIMITED,
            _ => error_codes::INTERNAL_ERROR,
        };

        let mut body = ApiError::new(code, self.to_string());
        if let AppError::ChainBroken { tail_seq, tail_hash } = &self {
            body = body.with_details(serde_json::json!({
                "tailSeq": tail_seq,
                "tailHash": tail_hash,
            }));
        }

        (status, Json(body)).into_response()
    }
}
