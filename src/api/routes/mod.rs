//! Route tables, one module per resource group, merged into a single
//! router by [`router`]. Grounded on `dashflow-registry/src/api/routes.rs`'s
//! `api_router` composition pattern (one `Router` per resource, `.merge`d).

pub mod anticheat;
pub mod auth;
pub mod media;
pub mod sessions;
pub mod stream;
pub mod tokens;

use axum::Router;

use crate::api::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(sessions::router())
        .merge(tokens::router())
        .merge(anticheat::router())
        .merge(media::router())
        .merge(stream::router())
}
