//! Issuing and refreshing session-scoped capability tokens beyond the IST
//! minted at session creation: ACET (anti-cheat), AIPT (AI proxy), and a
//! combined IST/WST refresh, all gated on presenting a still-valid IST for
//! the same session.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::middleware::verify_session_token;
use crate::api::state::AppState;
use crate::api::types::{RefreshTokenResponse, TokenResponse};
use crate::error::Result;
use crate::tokens::Audience;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/interview/:id/token/acet", post(mint_acet))
        .route("/interview/:id/token/aipt", post(mint_aipt))
        .route("/interview/:id/token/refresh", post(refresh))
}

async fn mint_scoped_raw(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    token_generation: u64,
    audience: Audience,
) -> TokenResponse {
    let lifetime = audience.max_lifetime();
    let token = state.tokens.mint(
        audience,
        user_id,
        Some(session_id),
        Some(token_generation),
        lifetime,
    );

    TokenResponse {
        token: token.as_str().to_string(),
        expires_at: chrono::Utc::now() + lifetime,
    }
}

async fn mint_scoped(
    state: &AppState,
    headers: &HeaderMap,
    session_id: Uuid,
    audience: Audience,
) -> Result<Json<TokenResponse>> {
    let (session, claims) =
        verify_session_token(state, headers, Audience::Ist, session_id).await?;
    Ok(Json(
        mint_scoped_raw(state, session_id, claims.user_id, session.token_generation, audience).await,
    ))
}

async fn mint_acet(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>> {
    mint_scoped(&state, &headers, session_id, Audience::Acet).await
}

async fn mint_aipt(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>> {
    mint_scoped(&state, &headers, session_id, Audience::Aipt).await
}

/// Reissue the live-interview capability tokens (IST, WST) still applicable
/// in the session's current state, each with a fresh token id (spec.md
/// §4.1: "never re-minted with a different expiry; refresh issues a fresh
/// token id"). A terminal session returns an empty object rather than an
/// error: the request does not revive the session, it just has nothing left
/// to refresh (spec.md §8 scenario 6). IST is not fenced by token
/// generation (only AIPT/UPT are, per spec.md §4.3), so a terminal
/// session's IST still passes `verify_session_token` here and this
/// handler's own state check is what returns the empty object.
async fn refresh(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<RefreshTokenResponse>> {
    let (session, claims) =
        verify_session_token(&state, &headers, Audience::Ist, session_id).await?;

    if session.state.is_terminal() {
        return Ok(Json(RefreshTokenResponse::default()));
    }

    let ist = mint_scoped_raw(
        &state,
        session_id,
        claims.user_id,
        session.token_generation,
        Audience::Ist,
    )
    .await;
    let wst = mint_scoped_raw(
        &state,
        session_id,
        claims.user_id,
        session.token_generation,
        Audience::Wst,
    )
    .await;

    Ok(Json(RefreshTokenResponse {
        ist: Some(ist),
        wst: Some(wst),
    }))
}
