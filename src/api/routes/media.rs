//! Media upload: a one-shot UPT-token-gated blob accept endpoint, used for
//! voice-answer recordings. The path is session-scoped like every other
//! endpoint here so the same `verify_session_token` seam applies.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::routing::post;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::middleware::verify_session_token;
use crate::api::state::AppState;
use crate::api::types::UploadResponse;
use crate::error::Result;
use crate::tokens::Audience;

pub fn router() -> Router<AppState> {
    Router::new().route("/interview/:id/media/upload", post(upload))
}

async fn upload(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>> {
    let (_session, claims) =
        verify_session_token(&state, &headers, Audience::Upt, session_id).await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    // The token's own id is the one-shot consumption key: a UPT is minted
    // per upload, so presenting the same token twice is what `UploadStore`
    // rejects, not a separate idempotency key.
    let blob_ref = state.uploads.upload(claims.jti, body.to_vec(), content_type)?;

    Ok(Json(UploadResponse {
        blob_ref: blob_ref.0,
    }))
}
