//! Gateway middleware: request id, rate limiting, token extraction, CORS,
//! and (feature-gated) metrics. Grounded on
//! `dashflow-registry/src/api/middleware.rs`'s layering, generalized from
//! API-key auth to this gateway's audience-scoped bearer tokens.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::api::state::{AppState, AuthContext, RateLimitResult};
use crate::api::types::{error_codes, ApiError};
use crate::tokens::Audience;

#[derive(Clone, Debug)]
pub struct RequestId(pub String);

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let client_id = client_id(&headers);

    match state.rate_limiter.check_and_increment(&client_id).await {
        RateLimitResult::Allowed { remaining } => {
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
                response
                    .headers_mut()
                    .insert("x-ratelimit-remaining", value);
            }
            response
        }
        RateLimitResult::Limited { retry_after_secs } => {
            let error = ApiError::new(
                error_codes::RATE_LIMITED,
                format!("rate limit exceeded, retry after {retry_after_secs}s"),
            );
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
            response
        }
    }
}

fn client_id(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next() {
            return format!("ip:{}", ip.trim());
        }
    }
    "ip:unknown".to_string()
}

/// Extract the bearer token (if any), verify it against `expected_audience`
/// and the path's session id, and insert the resulting [`AuthContext`].
/// Does not itself reject unauthenticated requests — pair with a handler
/// that checks `AuthContext::token_claims` where a token is required.
pub fn extract_claims(
    state: &AppState,
    headers: &HeaderMap,
    expected_audience: Audience,
    session_id: Option<Uuid>,
    session_generation: Option<u64>,
) -> crate::error::Result<crate::tokens::TokenClaims> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(crate::error::AppError::TokenMissing)?;

    state
        .tokens
        .verify(token, expected_audience, session_id, session_generation)
}

/// Fetch the session (for its current `token_generation`) and verify a
/// session-scoped bearer token against it in one step. Every route handler
/// that needs a session-bound token (IST/ACET/AIPT/WST) goes through this
/// rather than calling `extract_claims` directly. `TokenAuthority::verify`
/// only rejects on a stale generation for AIPT/UPT (spec.md §4.3); IST,
/// WST, and ACET are session-bound but not generation-fenced, so they stay
/// valid across a pause even though this call always threads the current
/// generation through.
pub async fn verify_session_token(
    state: &AppState,
    headers: &HeaderMap,
    expected_audience: Audience,
    session_id: Uuid,
) -> crate::error::Result<(crate::session::Session, crate::tokens::TokenClaims)> {
    let session = state.store.get_session(session_id).await?;
    let claims = extract_claims(
        state,
        headers,
        expected_audience,
        Some(session_id),
        Some(session.token_generation),
    )?;
    Ok((session, claims))
}

/// Verify a User-audience bearer token and that its holder owns
/// `session_id`. User tokens are not session-bound in their claims (they
/// authorize "my own sessions" broadly), so the ownership check happens
/// here against the stored session rather than inside
/// [`crate::tokens::TokenAuthority::verify`]. A User token presented for a
/// session it does not own is treated the same as an unknown session, so
/// the response does not reveal whether the id exists.
pub async fn verify_user_session_access(
    state: &AppState,
    headers: &HeaderMap,
    session_id: Uuid,
) -> crate::error::Result<(crate::session::Session, crate::tokens::TokenClaims)> {
    let claims = extract_claims(state, headers, Audience::User, None, None)?;
    let session = state.store.get_session(session_id).await?;
    if session.owner_id != claims.user_id {
        return Err(crate::error::AppError::NotFound(format!(
            "session {session_id}"
        )));
    }
    Ok((session, claims))
}

pub async fn cors_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    if let Some(origin) = state.config.cors_origins.first() {
        if let Ok(value) = HeaderValue::from_str(origin) {
            response
                .headers_mut()
                .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization, X-Request-Id"),
        );
    }

    response
}

#[cfg(feature = "metrics")]
pub async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = std::time::Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    if let Some(metrics) = &state.metrics {
        metrics.http_requests_in_flight.inc();
    }

    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    if let Some(metrics) = &state.metrics {
        metrics.http_requests_in_flight.dec();
        metrics.record_http_request(&method, &path, status, duration);
    }

    response
}

#[cfg(feature = "metrics")]
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if Uuid::parse_str(segment).is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(not(feature = "metrics"))]
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    next.run(request).await
}

/// Unconditionally returns this (anonymous) context unless a downstream
/// handler replaces it after verifying a specific audience's token; there
/// is no single "the" auth scheme here the way there is an API key for the
/// teacher, since every endpoint requires a different token audience.
pub async fn auth_context_middleware(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(AuthContext::anonymous());
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_falls_back_to_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(client_id(&headers), "ip:unknown");
    }

    #[test]
    fn client_id_uses_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 5.6.7.8".parse().unwrap());
        assert_eq!(client_id(&headers), "ip:1.2.3.4");
    }
}
