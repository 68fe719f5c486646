//! `/auth/login`: exchange an email for a long-lived user token. There is
//! no password or identity provider in scope here (see SPEC_FULL.md's
//! Non-goals); this endpoint exists so the rest of the gateway has a real
//! bearer token to scope session creation to, the same way the teacher's
//! registry always operates behind a caller identity rather than an
//! anonymous one.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::api::types::{LoginRequest, LoginResponse};
use crate::error::{AppError, Result};
use crate::tokens::Audience;

pub fn router() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    if request.email.trim().is_empty() || !request.email.contains('@') {
        return Err(AppError::ValidationFailed("invalid email".into()));
    }

    let user_id = Uuid::new_v4();
    let token = state.tokens.mint(
        Audience::User,
        user_id,
        None,
        None,
        Audience::User.max_lifetime(),
    );

    Ok(Json(LoginResponse {
        user_id,
        user_token: token.as_str().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_rejects_missing_at_sign() {
        let state = AppState::new(&crate::config::Config::default());
        let err = login(
            State(state),
            Json(LoginRequest {
                email: "not-an-email".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }
}
