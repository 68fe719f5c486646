//! Environment-driven configuration.
//!
//! Mirrors the teacher's `env_string`-and-named-constants pattern
//! (`dashflow::core::config_loader::env_vars`, referenced from
//! `dashflow-registry/src/api/state.rs`): one constant per variable, a single
//! `Config::from_env()` entry point, and explicit defaults rather than
//! scattered `std::env::var` calls.

use std::net::SocketAddr;
use std::time::Duration;

/// Environment variable names, centralized so the rest of the crate never
/// hardcodes a string literal for a variable name.
pub mod env_vars {
    pub const BIND_ADDR: &str = "INTERVIEW_BIND_ADDR";
    pub const DATABASE_URL: &str = "INTERVIEW_DATABASE_URL";
    pub const TOKEN_SIGNING_SECRET: &str = "INTERVIEW_TOKEN_SECRET";
    pub const COOKIE_SECURE: &str = "INTERVIEW_COOKIE_SECURE";
    pub const CORS_ORIGINS: &str = "INTERVIEW_CORS_ORIGINS";
    pub const AI_PROVIDER: &str = "INTERVIEW_AI_PROVIDER";
    pub const AI_PROVIDER_API_KEY: &str = "INTERVIEW_AI_PROVIDER_API_KEY";
    pub const AI_PROVIDER_TIMEOUT_MS: &str = "INTERVIEW_AI_TIMEOUT_MS";
    pub const RATE_LIMIT_RPM: &str = "INTERVIEW_RATE_LIMIT_RPM";
    pub const RETENTION_DAYS: &str = "INTERVIEW_RETENTION_DAYS";

    pub fn env_string(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

use env_vars::*;

/// Which external provider the AI Proxy calls, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiProviderKind {
    /// No credentials configured; the proxy always uses the deterministic
    /// fallback bank. This is also what test builds use.
    None,
    OpenAi,
    Anthropic,
}

impl AiProviderKind {
    fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "openai" => AiProviderKind::OpenAi,
            "anthropic" => AiProviderKind::Anthropic,
            _ => AiProviderKind::None,
        }
    }
}

/// Top-level process configuration, read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP/duplex gateway binds to.
    pub bind_addr: SocketAddr,
    /// Connection string for the authoritative store. This repository's
    /// `SessionStore` trait has a single in-memory implementation today;
    /// the field is threaded through so a SQL-backed implementation is a
    /// drop-in replacement behind the same trait (see DESIGN.md).
    pub database_url: Option<String>,
    /// Symmetric secret the Token Authority signs and verifies with.
    pub token_signing_secret: Vec<u8>,
    /// Whether the session cookie is marked `Secure`.
    pub cookie_secure: bool,
    /// Allowed CORS origins. Empty means no CORS headers are added
    /// (no wildcard fallback, matching the teacher's CORS policy).
    pub cors_origins: Vec<String>,
    /// Selected AI provider.
    pub ai_provider: AiProviderKind,
    /// Provider API credential, if any. Never logged, never echoed.
    pub ai_provider_api_key: Option<String>,
    /// Hard timeout for a single AI provider call.
    pub ai_provider_timeout: Duration,
    /// Soft per-client rate limit.
    pub rate_limit_rpm: u32,
    /// Days after which a session becomes eligible for the retention
    /// sweeper to cascade-delete it.
    pub retention_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 4000)),
            database_url: None,
            token_signing_secret: b"dev-only-insecure-signing-secret".to_vec(),
            cookie_secure: true,
            cors_origins: Vec::new(),
            ai_provider: AiProviderKind::None,
            ai_provider_api_key: None,
            ai_provider_timeout: Duration::from_secs(8),
            rate_limit_rpm: 120,
            retention_days: 90,
        }
    }
}

impl Config {
    /// Build configuration from the process environment, falling back to
    /// [`Config::default`] for anything unset.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let bind_addr = env_string(BIND_ADDR)
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.bind_addr);

        let token_signing_secret = env_string(TOKEN_SIGNING_SECRET)
            .map(|s| s.into_bytes())
            .unwrap_or(defaults.token_signing_secret);

        let cookie_secure = env_string(COOKIE_SECURE)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.cookie_secure);

        let cors_origins = env_string(CORS_ORIGINS)
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let ai_provider = env_string(AI_PROVIDER)
            .map(|s| AiProviderKind::from_str(&s))
            .unwrap_or(AiProviderKind::None);

        let ai_provider_timeout = env_string(AI_PROVIDER_TIMEOUT_MS)
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.ai_provider_timeout);

        let rate_limit_rpm = env_string(RATE_LIMIT_RPM)
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_rpm);

        let retention_days = env_string(RETENTION_DAYS)
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.retention_days);

        Self {
            bind_addr,
            database_url: env_string(DATABASE_URL),
            token_signing_secret,
            cookie_secure,
            cors_origins,
            ai_provider,
            ai_provider_api_key: env_string(AI_PROVIDER_API_KEY),
            ai_provider_timeout,
            rate_limit_rpm,
            retention_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_cors_origins() {
        // SECURITY: no wildcard fallback; empty means CORS headers are omitted.
        assert!(Config::default().cors_origins.is_empty());
    }

    #[test]
    fn ai_provider_kind_parses_unknown_as_none() {
        assert_eq!(AiProviderKind::from_str("bogus"), AiProviderKind::None);
        assert_eq!(AiProviderKind::from_str("OpenAI"), AiProviderKind::OpenAi);
    }
}
