//! Interview Backend Server
//!
//! Production HTTP/WebSocket API server for the mock-interview platform:
//! session lifecycle, the anti-cheat hash chain, token minting, AI-proxied
//! question generation and scoring, and media upload.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin interview_server --features server
//! ```
//!
//! # Environment Variables
//!
//! - `INTERVIEW_BIND_ADDR`: address to bind to (default: 127.0.0.1:4000)
//! - `INTERVIEW_TOKEN_SECRET`: symmetric token-signing secret (default: an
//!   insecure dev-only value; always set this in any non-local deployment)
//! - `INTERVIEW_COOKIE_SECURE`: `true`/`1` to mark cookies `Secure` (default: true)
//! - `INTERVIEW_CORS_ORIGINS`: comma-separated allowed origins (default: none)
//! - `INTERVIEW_AI_PROVIDER`: `openai` | `anthropic` | unset (default: unset, uses the deterministic fallback bank)
//! - `INTERVIEW_AI_PROVIDER_API_KEY`: provider credential, if a provider is configured
//! - `INTERVIEW_AI_TIMEOUT_MS`: hard timeout for a single AI provider call (default: 8000)
//! - `INTERVIEW_RATE_LIMIT_RPM`: per-client requests per minute (default: 120)
//! - `INTERVIEW_RETENTION_DAYS`: age at which a terminal session becomes sweeper-eligible (default: 90)
//! - `RUST_LOG`: tracing env-filter (default: interview_backend=info,tower_http=info)
//!
//! # API Endpoints
//!
//! - `POST /auth/login`
//! - `POST /interview/sessions`
//! - `POST /interview/:id/precheck`
//! - `POST /interview/:id/start`
//! - `POST /interview/:id/next-question`
//! - `POST /interview/:id/answer`
//! - `POST /interview/:id/code-eval`
//! - `POST /interview/:id/finalize`
//! - `GET  /interview/:id/summary`
//! - `GET  /interview/:id/review`
//! - `GET  /interview/:id/state`
//! - `POST /interview/:id/anti-cheat`
//! - `GET  /interview/:id/anti-cheat/tail`
//! - `POST /interview/:id/token/acet`
//! - `POST /interview/:id/token/aipt`
//! - `POST /interview/:id/token/refresh`
//! - `POST /interview/:id/media/upload`
//! - `GET  /interview/:id/stream` (WebSocket)

use std::process::ExitCode;

use interview_backend::api::state::AppState;
use interview_backend::config::Config;
use interview_backend::{ApiConfig, ApiServer};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("interview_backend=info,tower_http=info"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .json(),
    );

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {err}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = Config::from_env();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "interview backend starting"
    );
    info!(
        bind_addr = %config.bind_addr,
        ai_provider = ?config.ai_provider,
        rate_limit_rpm = config.rate_limit_rpm,
        retention_days = config.retention_days,
        "configuration loaded"
    );

    let state = AppState::new(&config);
    let _sweeper = interview_backend::retention::spawn(
        state.store.clone(),
        state.events.clone(),
        config.retention_days,
    );

    let api_config = ApiConfig {
        bind_addr: config.bind_addr,
        config,
    };
    let server = ApiServer::with_state(state, api_config);

    info!(addr = %server.addr(), "server starting");

    if let Err(err) = server.run_until(shutdown_signal()).await {
        error!(error = %err, "server error");
        return ExitCode::FAILURE;
    }

    info!("server shutdown complete");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}
