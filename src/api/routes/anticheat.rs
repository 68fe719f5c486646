//! Anti-cheat event ingestion: verifies and appends a hash-chained batch,
//! evaluates the strike policy, and applies the resulting state transition
//! if any event escalated to a pause or an end.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::anticheat::{AntiCheatEventInput, EventType, StrikeAction};
use crate::api::middleware::{verify_session_token, verify_user_session_access};
use crate::api::state::AppState;
use crate::api::types::{AntiCheatBatchRequest, AntiCheatBatchResponse, AntiCheatTailResponse};
use crate::error::{AppError, Result};
use crate::session::SessionState;
use crate::state_machine::Transition;
use crate::tokens::Audience;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/interview/:id/anti-cheat", post(submit_batch))
        .route("/interview/:id/anti-cheat/tail", get(get_tail))
}

/// Verify, append, and fan out a batch of anti-cheat events, applying
/// whichever strike action results. Shared by `/anti-cheat` and by
/// `/precheck`, which carries its own events through the same
/// chain-verification path (spec.md §6).
pub(crate) async fn ingest_batch(
    state: &AppState,
    session_id: Uuid,
    events: Vec<AntiCheatEventInput>,
) -> Result<AntiCheatBatchResponse> {
    let (events, tail, strikes) = match state.store.append_anti_cheat_batch(session_id, events).await {
        Ok(v) => v,
        Err(err) => {
            #[cfg(feature = "metrics")]
            {
                if matches!(err, AppError::ChainBroken { .. }) {
                    if let Some(metrics) = &state.metrics {
                        metrics.chain_breaks_total.inc();
                    }
                }
            }
            return Err(err);
        }
    };

    for event in &events {
        state
            .events
            .publish(
                session_id,
                "anti_cheat_event",
                serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
            )
            .await;
    }

    for strike in &strikes {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &state.metrics {
            let event_type = label_for(&strike.event_type);
            let severity = label_for(&strike.severity);
            metrics
                .strikes_total
                .with_label_values(&[&event_type, &severity])
                .inc();
        }
        state
            .events
            .publish(
                session_id,
                "STRIKE_CREATED",
                serde_json::to_value(strike).unwrap_or(serde_json::Value::Null),
            )
            .await;
    }

    // The race-determinism property (spec.md §8): if this batch produced
    // more than one strike, only the single most severe action is applied,
    // and `End` always wins over `Pause`.
    let action = crate::anticheat::most_severe_action(&strikes);
    if action != StrikeAction::None {
        state
            .state_machine
            .apply(session_id, Transition::ApplyStrikeAction(action))
            .await?;
    }

    // An FS_EXIT's default (non-escalated) pause starts the 10 s auto-end
    // countdown (spec.md §4.4, §8 scenario 4); a later FS_READY both
    // rescinds the occurrence count (handled inside `evaluate_batch`) and,
    // if the session is still `Paused` on its account, resumes it outright.
    if strikes
        .iter()
        .any(|s| s.event_type == EventType::FsExit && s.action == StrikeAction::Pause)
    {
        spawn_fs_exit_countdown(state.clone(), session_id);
    }
    if events.iter().any(|e| e.event_type == EventType::FsReady) {
        let session = state.store.get_session(session_id).await?;
        if session.state == SessionState::Paused {
            state
                .state_machine
                .apply(session_id, Transition::Resume)
                .await?;
        }
    }

    Ok(AntiCheatBatchResponse {
        accepted: events.len(),
        tail_seq: tail.seq,
        tail_hash: tail.hash,
    })
}

/// Spawns the countdown for one FS_EXIT auto-pause. Fires exactly once
/// (spec.md §8's "fires exactly once otherwise"): if the session is still
/// `Paused` when the timer elapses, it has not been rescinded by an
/// `FS_READY` or otherwise resumed, so it auto-ends.
fn spawn_fs_exit_countdown(state: AppState, session_id: Uuid) {
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(
            crate::policy::FS_EXIT_COUNTDOWN_SECONDS,
        ))
        .await;

        let session = match state.store.get_session(session_id).await {
            Ok(session) => session,
            Err(_) => return,
        };
        if session.state != SessionState::Paused {
            return;
        }
        if let Err(err) = state
            .state_machine
            .apply(session_id, Transition::ApplyStrikeAction(StrikeAction::End))
            .await
        {
            tracing::warn!(%session_id, error = %err, "fs_exit countdown: failed to auto-end session");
        }
    });
}

async fn submit_batch(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<AntiCheatBatchRequest>,
) -> Result<Json<AntiCheatBatchResponse>> {
    verify_session_token(&state, &headers, Audience::Acet, session_id).await?;
    let response = ingest_batch(&state, session_id, request.events).await?;
    Ok(Json(response))
}

async fn get_tail(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<AntiCheatTailResponse>> {
    let (session, _claims) = verify_user_session_access(&state, &headers, session_id).await?;
    Ok(Json(AntiCheatTailResponse {
        seq: session.tail_seq,
        hash: session.tail_hash,
    }))
}

#[cfg(feature = "metrics")]
fn label_for(value: &impl serde::Serialize) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
