//! Wires routes, middleware, and state into a runnable [`ApiServer`].
//! Grounded on `dashflow-registry/src/api/server.rs`'s `ApiConfig`/
//! `ApiServer`/`build_router`/`run`/`run_until` shape; the error-handler
//! layer the teacher adds outermost has no counterpart here since every
//! handler already returns `Result<_, AppError>` and `AppError` implements
//! `IntoResponse` itself (`error.rs`), so there is nothing left for a
//! catch-all layer to convert.

use std::net::SocketAddr;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::{middleware as mw, routes, state::AppState};
use crate::config::Config;
use crate::error::Result;

/// Server configuration: just the bind address plus the full process
/// [`Config`], since [`AppState::new`] needs the whole thing (token secret,
/// AI provider settings, ...), not only the gateway-facing subset.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub config: Config,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let config = Config::default();
        Self {
            bind_addr: config.bind_addr,
            config,
        }
    }
}

impl ApiConfig {
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }
}

pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
    router: Router,
}

impl ApiServer {
    pub fn new(config: ApiConfig) -> Self {
        let state = AppState::new(&config.config);
        let router = Self::build_router(&state);
        Self {
            config,
            state,
            router,
        }
    }

    pub fn with_state(state: AppState, config: ApiConfig) -> Self {
        let router = Self::build_router(&state);
        Self {
            config,
            state,
            router,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ApiConfig::default())
    }

    fn build_router(state: &AppState) -> Router {
        let api = routes::router().with_state(state.clone());

        let router = api
            .layer(middleware::from_fn_with_state(
                state.clone(),
                mw::cors_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                mw::rate_limit_middleware,
            ))
            .layer(middleware::from_fn(mw::auth_context_middleware))
            .layer(middleware::from_fn(mw::request_id_middleware));

        #[cfg(feature = "metrics")]
        let router = router.layer(middleware::from_fn_with_state(
            state.clone(),
            mw::metrics_middleware,
        ));
        #[cfg(not(feature = "metrics"))]
        let router = router.layer(middleware::from_fn(mw::metrics_middleware));

        // Applied last so it runs first: rejects oversized requests before
        // any other middleware or handler sees them.
        router.layer(RequestBodyLimitLayer::new(state.config.max_body_size))
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| crate::error::AppError::Internal(format!("failed to bind: {e}")))?;

        tracing::info!(addr = %self.config.bind_addr, "interview backend starting");

        axum::serve(listener, self.router)
            .await
            .map_err(|e| crate::error::AppError::Internal(format!("server error: {e}")))?;

        Ok(())
    }

    pub async fn run_until<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| crate::error::AppError::Internal(format!("failed to bind: {e}")))?;

        tracing::info!(addr = %self.config.bind_addr, "interview backend starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| crate::error::AppError::Internal(format!("server error: {e}")))?;

        tracing::info!("interview backend shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_config() -> ApiConfig {
        ApiConfig::default().with_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let server = ApiServer::new(test_config());
        let router = server.router();
        let request = Request::builder()
            .uri("/does-not-exist")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn body_size_limit_is_enforced() {
        let mut config = test_config();
        config.config.token_signing_secret = b"test".to_vec();
        let server = ApiServer::new(config);
        let router = server.router();

        let oversized = vec![b'x'; 30 * 1024 * 1024];
        let request = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(oversized))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
