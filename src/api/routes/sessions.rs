//! Session lifecycle endpoints: create, precheck, start, ask/answer, code
//! evaluation, finalize, and the read-only summary/review/state views.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::aiproxy::{QuestionRequest, SummaryRequest};
use crate::answer::Answer;
use crate::api::middleware::{extract_claims, verify_session_token, verify_user_session_access};
use crate::api::routes::anticheat::ingest_batch;
use crate::api::state::AppState;
use crate::api::types::*;
use crate::error::{AppError, Result};
use crate::question::QuestionMetadata;
use crate::session::{Session, SessionState};
use crate::state_machine::Transition;
use crate::summary::{StrikeTimelineEntry, Summary};
use crate::tokens::Audience;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/interview/sessions", post(create_session))
        .route("/interview/:id/precheck", post(precheck))
        .route("/interview/:id/start", post(start))
        .route("/interview/:id/next-question", post(next_question))
        .route("/interview/:id/answer", post(submit_answer))
        .route("/interview/:id/code-eval", post(code_eval))
        .route("/interview/:id/finalize", post(finalize))
        .route("/interview/:id/summary", get(get_summary))
        .route("/interview/:id/review", get(get_review))
        .route("/interview/:id/state", get(get_state))
}

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionCreateResponse>> {
    let claims = extract_claims(&state, &headers, Audience::User, None, None)?;

    let config = request.into_config();
    config
        .validate()
        .map_err(|e| AppError::ValidationFailed(e.to_string()))?;

    let session = Session::new(claims.user_id, config);
    state.store.create_session(session.clone()).await?;

    let lifetime = Audience::Ist.max_lifetime();
    let token = state.tokens.mint(
        Audience::Ist,
        claims.user_id,
        Some(session.id),
        Some(session.token_generation),
        lifetime,
    );

    Ok(Json(SessionCreateResponse {
        session: SessionResponse::from(&session),
        ist_token: token.as_str().to_string(),
        expires_at: Utc::now() + lifetime,
    }))
}

async fn precheck(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<PrecheckRequest>,
) -> Result<Json<PrecheckResponse>> {
    verify_session_token(&state, &headers, Audience::Acet, session_id).await?;

    if !request.events.is_empty() {
        ingest_batch(&state, session_id, request.events).await?;
    }

    // Re-fetch after ingesting events: a strike in this same batch (e.g. a
    // fullscreen exit) may have already moved the session out of
    // `PendingPrecheck`, and that must win over the checks below.
    let session = state.store.get_session(session_id).await?;

    let mut failing_checks = Vec::new();
    if !request.camera_ok {
        failing_checks.push("camera");
    }
    if !request.microphone_ok {
        failing_checks.push("microphone");
    }
    if !request.fullscreen_ok {
        failing_checks.push("fullscreen");
    }
    if !request.network_ok {
        failing_checks.push("network");
    }
    let can_proceed = failing_checks.is_empty();

    // Last submission wins: a failed precheck is not recorded anywhere, so
    // a later call with all checks passing succeeds even after prior
    // failures. Once the session has already left `PendingPrecheck` this
    // is a no-op report rather than a second transition attempt.
    if can_proceed && session.state == SessionState::PendingPrecheck {
        state
            .state_machine
            .apply(session_id, Transition::CompletePrecheck)
            .await?;
    }

    Ok(Json(PrecheckResponse {
        can_proceed,
        failing_checks,
    }))
}

/// Mints the live-interview capability tokens (WST/AIPT/UPT) for a session
/// that has cleared its pre-check. Per spec.md §6 this does not itself
/// transition the session — `Ready → Active` happens lazily on the first
/// successful `/next-question` call, so a client that mints tokens but
/// never asks a question leaves the session sitting in `Ready`.
async fn start(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<StartResponse>> {
    let (session, claims) =
        verify_session_token(&state, &headers, Audience::Ist, session_id).await?;

    if session.state != SessionState::Ready {
        return Err(AppError::InvalidState(format!(
            "cannot start a session in state {:?}",
            session.state
        )));
    }

    let wst_lifetime = Audience::Wst.max_lifetime();
    let aipt_lifetime = Audience::Aipt.max_lifetime();
    let upt_lifetime = Audience::Upt.max_lifetime();
    let expires_at = Utc::now() + wst_lifetime.min(aipt_lifetime).min(upt_lifetime);

    let wst_token = state.tokens.mint(
        Audience::Wst,
        claims.user_id,
        Some(session_id),
        Some(session.token_generation),
        wst_lifetime,
    );
    let aipt_token = state.tokens.mint(
        Audience::Aipt,
        claims.user_id,
        Some(session_id),
        Some(session.token_generation),
        aipt_lifetime,
    );
    let upt_token = state.tokens.mint(
        Audience::Upt,
        claims.user_id,
        Some(session_id),
        Some(session.token_generation),
        upt_lifetime,
    );

    Ok(Json(StartResponse {
        wst_token: wst_token.as_str().to_string(),
        aipt_token: aipt_token.as_str().to_string(),
        upt_token: upt_token.as_str().to_string(),
        expires_at,
    }))
}

async fn next_question(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<QuestionResponse>> {
    let (session, _claims) =
        verify_session_token(&state, &headers, Audience::Aipt, session_id).await?;

    if session.state == SessionState::Ready {
        state
            .state_machine
            .apply(session_id, Transition::Start)
            .await?;
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &state.metrics {
            metrics.sessions_started_total.inc();
        }
    } else if session.state != SessionState::Active {
        return Err(AppError::InvalidState(format!(
            "cannot request the next question in state {:?}",
            session.state
        )));
    }

    let lock = state
        .next_question_locks
        .entry(session_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock
        .try_lock()
        .map_err(|_| AppError::RateLimited("already_in_flight".into()))?;

    if session.asked_count >= session.config.question_count {
        return Err(AppError::InvalidState(
            "question_count already reached".into(),
        ));
    }

    let previously_asked = state
        .store
        .list_questions(session_id)
        .await?
        .into_iter()
        .map(|q| q.text)
        .collect();

    let mode = crate::aiproxy::mode_for_slot(&session.config.modes, session_id, session.asked_count);
    let request = QuestionRequest {
        session_id,
        ordinal: session.asked_count + 1,
        mode,
        difficulty: session.config.difficulty,
        role_category: session.config.role_category.clone(),
        job_description: session.config.job_description.clone(),
        previously_asked,
    };
    let draft = state.ai_proxy.next_question(request).await;
    let question = state.store.append_question(session_id, draft).await?;

    state
        .events
        .publish(
            session_id,
            "QUESTION_CREATED",
            serde_json::to_value(&question).unwrap_or(serde_json::Value::Null),
        )
        .await;

    Ok(Json(question.into()))
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerAckResponse>> {
    let (session, _claims) =
        verify_session_token(&state, &headers, Audience::Ist, session_id).await?;

    if session.state != SessionState::Active {
        return Err(AppError::InvalidState(format!(
            "cannot submit an answer in state {:?}",
            session.state
        )));
    }

    let answer = Answer::new(
        session_id,
        request.question_id,
        request.payload,
        request.live_transcript_slice,
        request.time_spent_seconds,
    );
    let answer_id = answer.id;
    state.store.append_answer(answer).await?;

    state
        .events
        .publish(
            session_id,
            "ANSWER_RECORDED",
            serde_json::json!({ "questionId": request.question_id }),
        )
        .await;

    Ok(Json(AnswerAckResponse { answer_id }))
}

async fn code_eval(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<CodeEvalRequest>,
) -> Result<Json<CodeEvalResponse>> {
    verify_session_token(&state, &headers, Audience::Ist, session_id).await?;

    let questions = state.store.list_questions(session_id).await?;
    let question = questions
        .into_iter()
        .find(|q| q.id == request.question_id)
        .ok_or_else(|| AppError::NotFound(format!("question {}", request.question_id)))?;

    let QuestionMetadata::Coding {
        function_name,
        tests,
        ..
    } = question.metadata
    else {
        return Err(AppError::ValidationFailed(
            "question is not a coding question".into(),
        ));
    };

    let outcomes = crate::codeeval::evaluate(&function_name, &request.source, &tests);
    let passed = outcomes.iter().all(|o| o.passed);
    let test_results = outcomes
        .into_iter()
        .map(|o| CodeEvalTestResult {
            input: o.input,
            expected_output: o.expected_output,
            actual_output: o.actual_output,
            passed: o.passed,
        })
        .collect();

    Ok(Json(CodeEvalResponse {
        passed,
        test_results,
    }))
}

async fn finalize(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<FinalizeResponse>> {
    let (session, _claims) =
        verify_session_token(&state, &headers, Audience::Ist, session_id).await?;

    let new_state = state
        .state_machine
        .apply(session_id, Transition::Finalize)
        .await?;

    let questions = state.store.list_questions(session_id).await?;
    let answers = state.store.list_answers(session_id).await?;
    let scored_answers = answers.iter().map(crate::aiproxy::fallback_score).collect();
    let transcript = questions
        .iter()
        .map(|q| {
            let answer_text = answers
                .iter()
                .find(|a| a.question_id == q.id)
                .map(|a| a.text_content())
                .unwrap_or_default();
            (q.text.clone(), answer_text)
        })
        .collect();

    let summary_request = SummaryRequest {
        session_id,
        role_category: session.config.role_category.clone(),
        transcript,
    };
    let mut summary = state.ai_proxy.summarize(summary_request, scored_answers).await;

    let strikes = state.store.list_strikes(session_id).await?;
    summary.integrity_verdict =
        Summary::integrity_verdict_for(session.strike_minor_count, session.strike_major_count);
    summary.strike_timeline = strikes
        .into_iter()
        .map(|s| StrikeTimelineEntry {
            severity: s.severity,
            event_type: serde_json::to_value(s.event_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            action: s.action,
            occurred_at: s.created_at,
        })
        .collect();

    state.store.write_summary(session_id, summary.clone()).await?;

    state
        .events
        .publish(
            session_id,
            "FEEDBACK_CREATED",
            serde_json::to_value(&summary).unwrap_or(serde_json::Value::Null),
        )
        .await;

    Ok(Json(FinalizeResponse { state: new_state }))
}

async fn get_summary(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<SummaryResponse>> {
    verify_user_session_access(&state, &headers, session_id).await?;

    let summary = state
        .store
        .get_summary(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("summary for session {session_id}")))?;

    Ok(Json(SummaryResponse(summary)))
}

async fn get_review(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ReviewResponse>> {
    verify_user_session_access(&state, &headers, session_id).await?;

    let questions = state.store.list_questions(session_id).await?;
    let answers = state.store.list_answers(session_id).await?;

    let entries = questions
        .into_iter()
        .map(|q| {
            let answer = answers.iter().find(|a| a.question_id == q.id);
            ReviewEntry {
                answer_text: answer.map(|a| a.text_content()),
                time_spent_seconds: answer.map(|a| a.time_spent_seconds),
                question: q.into(),
            }
        })
        .collect();

    Ok(Json(ReviewResponse { entries }))
}

async fn get_state(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<StateResponse>> {
    let (session, _claims) = verify_user_session_access(&state, &headers, session_id).await?;
    Ok(Json(StateResponse::from(&session)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Difficulty, Experience, Mode, SessionConfig};

    fn sample_request() -> CreateSessionRequest {
        CreateSessionRequest {
            role_category: "Backend".into(),
            experience: Experience { years: 3, months: 0 },
            modes: vec![Mode::Behavioral],
            question_count: 5,
            duration_limit_minutes: 30,
            language: "en-us".into(),
            accent: None,
            difficulty: Difficulty::Medium,
            job_description: None,
            resume_reference: None,
            company_targets: vec![],
            include_curated_questions: true,
            allow_ai_generated: true,
            allow_mcq: false,
            allow_fib: false,
            consent_recording: true,
            consent_anti_cheat: true,
        }
    }

    #[test]
    fn sample_request_converts_to_a_valid_config() {
        let config: SessionConfig = sample_request().into_config();
        assert!(config.validate().is_ok());
    }
}
