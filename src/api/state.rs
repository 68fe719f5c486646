//! Shared application state for all API handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::aiproxy::{AiProvider, AiProxy, AnthropicProvider};
use crate::config::{AiProviderKind, Config};
use crate::eventbus::EventBus;
use crate::state_machine::StateMachine;
use crate::store::{InMemoryStore, SessionStore};
use crate::tokens::TokenAuthority;
use crate::upload::UploadStore;

#[cfg(feature = "metrics")]
use crate::api::metrics::GatewayMetrics;

/// Server-facing configuration, distinct from [`Config`]'s environment
/// parsing: this is the subset the gateway actually consults per request.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_body_size: usize,
    pub rate_limit_rpm: u32,
    pub cors_origins: Vec<String>,
    pub cookie_secure: bool,
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_body_size: 25 * 1024 * 1024,
            rate_limit_rpm: config.rate_limit_rpm,
            cors_origins: config.cors_origins.clone(),
            cookie_secure: config.cookie_secure,
        }
    }
}

/// Shared application state, cloned cheaply (every field is an `Arc` or a
/// `Clone`-cheap handle) into every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub events: EventBus,
    pub tokens: Arc<TokenAuthority>,
    pub ai_proxy: Arc<AiProxy>,
    pub uploads: Arc<UploadStore>,
    pub state_machine: Arc<StateMachine>,
    pub config: Arc<ServerConfig>,
    pub rate_limiter: Arc<RateLimiterState>,
    /// Per-session exclusion guard for `next-question`: a second concurrent
    /// call for the same session is rejected outright (not queued) so the
    /// client sees a clear "already in flight" error instead of waiting
    /// behind the first call and risking a double-ordinal race.
    pub next_question_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    #[cfg(feature = "metrics")]
    pub metrics: Option<Arc<GatewayMetrics>>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStore::new());
        let events = EventBus::new();
        let tokens = Arc::new(TokenAuthority::new(config.token_signing_secret.clone()));
        let provider = ai_provider_from_config(config);
        let ai_proxy = Arc::new(AiProxy::new(provider, config.ai_provider_timeout));
        let uploads = Arc::new(UploadStore::new());
        let state_machine = Arc::new(StateMachine::new(store.clone(), events.clone()));
        let server_config = Arc::new(ServerConfig::from(config));
        let rate_limiter = Arc::new(RateLimiterState::new(RateLimiterConfig {
            requests_per_window: config.rate_limit_rpm,
            window_duration: Duration::from_secs(60),
        }));

        #[cfg(feature = "metrics")]
        let metrics = GatewayMetrics::new().map(Arc::new).ok();

        Self {
            store,
            events,
            tokens,
            ai_proxy,
            uploads,
            state_machine,
            config: server_config,
            rate_limiter,
            next_question_locks: Arc::new(DashMap::new()),
            #[cfg(feature = "metrics")]
            metrics,
        }
    }
}

/// Build the configured [`AiProvider`], if any. Only `Anthropic` has a real
/// HTTP-backed implementation in this repository (grounded on the
/// teacher's `dashflow-anthropic` crate, see `aiproxy::AnthropicProvider`);
/// `AiProviderKind::OpenAi` has no HTTP client here and falls back to the
/// deterministic bank the same as `AiProviderKind::None`, since fabricating
/// a second provider with no grounding in the corpus would defeat the
/// point of this exercise (see DESIGN.md).
fn ai_provider_from_config(config: &Config) -> Option<Arc<dyn AiProvider>> {
    match (&config.ai_provider, &config.ai_provider_api_key) {
        (AiProviderKind::Anthropic, Some(key)) => {
            Some(Arc::new(AnthropicProvider::new(key.clone())) as Arc<dyn AiProvider>)
        }
        _ => None,
    }
}

/// In-memory sliding-window rate limiter, one bucket per client key.
pub struct RateLimiterState {
    requests: RwLock<HashMap<String, RequestCount>>,
    config: RateLimiterConfig,
}

#[derive(Clone)]
struct RequestCount {
    count: u32,
    window_start: Instant,
}

#[derive(Clone)]
pub struct RateLimiterConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

pub enum RateLimitResult {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u32 },
}

impl RateLimiterState {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub async fn check_and_increment(&self, key: &str) -> RateLimitResult {
        let mut requests = self.requests.write().await;
        let now = Instant::now();

        let entry = requests.entry(key.to_string()).or_insert(RequestCount {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) > self.config.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        if entry.count > self.config.requests_per_window {
            let reset_at = entry.window_start + self.config.window_duration;
            let remaining_secs = reset_at.saturating_duration_since(now).as_secs();
            RateLimitResult::Limited {
                retry_after_secs: remaining_secs as u32,
            }
        } else {
            RateLimitResult::Allowed {
                remaining: self.config.requests_per_window - entry.count,
            }
        }
    }
}

/// A per-session identity used by auth context: which user, and (for
/// session-scoped endpoints) which session the caller authenticated for.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Option<Uuid>,
    pub token_claims: Option<crate::tokens::TokenClaims>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            token_claims: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_allows_then_limits() {
        let limiter = RateLimiterState::new(RateLimiterConfig {
            requests_per_window: 2,
            window_duration: Duration::from_secs(60),
        });

        assert!(matches!(
            limiter.check_and_increment("client").await,
            RateLimitResult::Allowed { remaining: 1 }
        ));
        assert!(matches!(
            limiter.check_and_increment("client").await,
            RateLimitResult::Allowed { remaining: 0 }
        ));
        assert!(matches!(
            limiter.check_and_increment("client").await,
            RateLimitResult::Limited { .. }
        ));
    }
}
