//! Live event fan-out over WebSocket. A browser's native WebSocket client
//! cannot set an `Authorization` header on the handshake, so the WST is
//! accepted either way: as a bearer header (non-browser clients) or as a
//! `token` query parameter (browser clients), matching how the teacher's
//! `websocket_server` module accepts its session token.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::error::{AppError, Result};
use crate::tokens::Audience;

pub fn router() -> Router<AppState> {
    Router::new().route("/interview/:id/stream", get(stream))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    token: Option<String>,
    /// Replay all buffered events with an id greater than this on connect,
    /// so a reconnecting client doesn't re-render events it already saw.
    since: Option<u64>,
}

async fn stream(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let session = state.store.get_session(session_id).await?;

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| query.token.clone())
        .ok_or_else(|| AppError::TokenInvalid("missing stream token".into()))?;

    state
        .tokens
        .verify(&token, Audience::Wst, Some(session_id), Some(session.token_generation))?;

    let since = query.since.unwrap_or(0);
    let events = state.events.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, events, session_id, since)))
}

/// Event kinds that end the interview outright; per spec.md §4.3, leaving
/// `Active` for one of these "closes any open duplex streams with an
/// appropriate terminal frame" once the client has been told why.
fn is_terminal_kind(kind: &str) -> bool {
    matches!(kind, "SESSION_ENDED" | "SESSION_COMPLETED")
}

async fn handle_socket(mut socket: WebSocket, events: crate::eventbus::EventBus, session_id: Uuid, since: u64) {
    for event in events.replay_since(session_id, since).await {
        let kind = event.kind.clone();
        let Ok(text) = serde_json::to_string(&event) else { continue };
        if socket.send(Message::Text(text)).await.is_err() {
            return;
        }
        if is_terminal_kind(&kind) {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }

    let mut rx = events.subscribe(session_id);
    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Ok(event) => {
                        let kind = event.kind.clone();
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                        if is_terminal_kind(&kind) {
                            let _ = socket.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    // A slow subscriber fell more than `CHANNEL_CAPACITY`
                    // events behind the fastest publisher (spec.md §4.6:
                    // "slow subscribers are dropped"); close the connection
                    // with a `slow_consumer` reason rather than silently
                    // skipping ahead, so the client knows to reconnect with
                    // `?since=` instead of assuming it saw every event.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        let _ = socket
                            .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                                code: axum::extract::ws::close_code::AGAIN,
                                reason: "slow_consumer".into(),
                            })))
                            .await;
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
