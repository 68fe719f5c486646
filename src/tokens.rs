//! Token Authority: mints and verifies audience-scoped, time-bounded,
//! session-bound capability tokens using a symmetric HMAC-SHA256 signature.
//!
//! The teacher signs package manifests asymmetrically with `ed25519_dalek`
//! (`dashflow-registry/src/signature.rs`); spec.md calls for a single shared
//! server secret instead, so this module keeps the teacher's "detached
//! signature over a canonical byte encoding" shape but swaps the primitive
//! for `hmac`+`sha2`, and verifies in constant time via `subtle` the same
//! way the teacher's signature check avoids short-circuiting comparisons.

use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// The capability an issued token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Long-lived user identity token, not session-bound.
    User,
    /// Interview session token: read/write session state and questions.
    Ist,
    /// Websocket/stream token: subscribe to the live event fan-out.
    Wst,
    /// AI-proxy token: request the next question or a summary.
    Aipt,
    /// Upload token: single-use, authorizes exactly one media upload.
    Upt,
    /// Anti-cheat event token: append to the event chain.
    Acet,
}

impl Audience {
    /// Maximum lifetime the Token Authority will mint for this audience,
    /// per spec.md §4.1's token table.
    pub fn max_lifetime(self) -> ChronoDuration {
        match self {
            Audience::User => ChronoDuration::hours(24),
            Audience::Ist => ChronoDuration::minutes(15),
            Audience::Wst => ChronoDuration::minutes(15),
            Audience::Aipt => ChronoDuration::minutes(15),
            Audience::Upt => ChronoDuration::minutes(15),
            Audience::Acet => ChronoDuration::minutes(15),
        }
    }

    /// Whether a token of this audience is bound to a specific session id.
    pub fn is_session_scoped(self) -> bool {
        !matches!(self, Audience::User)
    }

    /// Whether the token is consumed (single-use) on first successful use.
    pub fn is_single_use(self) -> bool {
        matches!(self, Audience::Upt)
    }
}

/// The claims carried by a token, signed as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub jti: Uuid,
    pub audience: Audience,
    pub user_id: Uuid,
    pub session_id: Option<Uuid>,
    /// The session's `token_generation` at mint time. A token whose
    /// generation no longer matches the session's current generation is
    /// rejected even if it has not expired, which is how the state machine
    /// invalidates every outstanding token on transition out of `Active`.
    pub session_generation: Option<u64>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenClaims {
    fn canonical_bytes(&self) -> Vec<u8> {
        let canonical = serde_json::json!({
            "jti": self.jti,
            "audience": self.audience,
            "userId": self.user_id,
            "sessionId": self.session_id,
            "sessionGeneration": self.session_generation,
            "issuedAt": self.issued_at,
            "expiresAt": self.expires_at,
        });
        serde_json::to_vec(&canonical).expect("canonical claims are always serializable")
    }
}

/// An opaque, signed bearer token: `base64url(claims_json).base64url(mac)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken(pub String);

impl SignedToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Mints and verifies tokens against a single shared secret.
pub struct TokenAuthority {
    secret: Vec<u8>,
}

impl TokenAuthority {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts a key of any length")
    }

    /// Mint a token for `audience`, bound to `session_id`/`session_generation`
    /// when the audience is session-scoped. `lifetime` must not exceed
    /// [`Audience::max_lifetime`]; callers that want the maximum should pass
    /// it directly rather than recompute it.
    pub fn mint(
        &self,
        audience: Audience,
        user_id: Uuid,
        session_id: Option<Uuid>,
        session_generation: Option<u64>,
        lifetime: ChronoDuration,
    ) -> SignedToken {
        let lifetime = lifetime.min(audience.max_lifetime());
        let now = Utc::now();
        let claims = TokenClaims {
            jti: Uuid::new_v4(),
            audience,
            user_id,
            session_id: if audience.is_session_scoped() {
                session_id
            } else {
                None
            },
            session_generation: if audience.is_session_scoped() {
                session_generation
            } else {
                None
            },
            issued_at: now,
            expires_at: now + lifetime,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &TokenClaims) -> SignedToken {
        let payload = claims.canonical_bytes();
        let mut mac = self.mac();
        mac.update(&payload);
        let tag = mac.finalize().into_bytes();

        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let encoded = format!("{}.{}", b64.encode(&payload), b64.encode(tag));
        SignedToken(encoded)
    }

    /// Verify signature, expiry, audience, session binding, and generation.
    /// Signature comparison is constant-time.
    pub fn verify(
        &self,
        token: &str,
        expected_audience: Audience,
        expected_session_id: Option<Uuid>,
        current_session_generation: Option<u64>,
    ) -> Result<TokenClaims> {
        let (payload_b64, tag_b64) = token
            .split_once('.')
            .ok_or_else(|| AppError::TokenInvalid("malformed token".into()))?;

        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let payload = b64
            .decode(payload_b64)
            .map_err(|_| AppError::TokenInvalid("bad payload encoding".into()))?;
        let tag = b64
            .decode(tag_b64)
            .map_err(|_| AppError::TokenInvalid("bad signature encoding".into()))?;

        let mut mac = self.mac();
        mac.update(&payload);
        let expected_tag = mac.finalize().into_bytes();

        if expected_tag.ct_eq(tag.as_slice()).unwrap_u8() != 1 {
            return Err(AppError::TokenInvalid("signature mismatch".into()));
        }

        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|_| AppError::TokenInvalid("malformed claims".into()))?;

        if claims.expires_at <= Utc::now() {
            return Err(AppError::TokenExpired);
        }

        if claims.audience != expected_audience {
            return Err(AppError::TokenWrongAudience {
                expected: format!("{expected_audience:?}"),
                actual: format!("{:?}", claims.audience),
            });
        }

        if expected_audience.is_session_scoped() {
            if claims.session_id != expected_session_id {
                return Err(AppError::TokenWrongSession);
            }
            // Only AIPT/UPT are fenced by generation (spec.md §4.3: leaving
            // `Active` "immediately invalidates outstanding AIPT and UPT
            // tokens"). IST/WST/ACET stay valid across a pause so a
            // rescinding ACET batch and a stream reconnect can still reach
            // the session while it sits `Paused`.
            if matches!(expected_audience, Audience::Aipt | Audience::Upt)
                && claims.session_generation != current_session_generation
            {
                return Err(AppError::TokenExpired);
            }
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new(b"test-secret".to_vec())
    }

    #[test]
    fn mint_then_verify_round_trips() {
        let authority = authority();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let token = authority.mint(
            Audience::Ist,
            user_id,
            Some(session_id),
            Some(0),
            ChronoDuration::hours(1),
        );
        let claims = authority
            .verify(token.as_str(), Audience::Ist, Some(session_id), Some(0))
            .unwrap();
        assert_eq!(claims.user_id, user_id);
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let authority = authority();
        let user_id = Uuid::new_v4();
        let token = authority.mint(Audience::Ist, user_id, None, None, ChronoDuration::hours(1));
        let err = authority
            .verify(token.as_str(), Audience::Wst, None, None)
            .unwrap_err();
        assert!(matches!(err, AppError::TokenWrongAudience { .. }));
    }

    #[test]
    fn stale_generation_is_rejected_even_if_unexpired() {
        let authority = authority();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let token = authority.mint(
            Audience::Aipt,
            user_id,
            Some(session_id),
            Some(0),
            ChronoDuration::minutes(5),
        );
        let err = authority
            .verify(token.as_str(), Audience::Aipt, Some(session_id), Some(1))
            .unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));
    }

    #[test]
    fn generation_fence_only_applies_to_aipt_and_upt() {
        // spec.md §4.3: leaving `Active` "immediately invalidates outstanding
        // AIPT and UPT tokens" — IST/WST/ACET must stay valid across a pause
        // so a rescinding anti-cheat batch or a stream reconnect still works.
        let authority = authority();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        for audience in [Audience::Ist, Audience::Wst, Audience::Acet] {
            let token = authority.mint(
                audience,
                user_id,
                Some(session_id),
                Some(0),
                ChronoDuration::minutes(15),
            );
            let claims = authority
                .verify(token.as_str(), audience, Some(session_id), Some(1))
                .unwrap();
            assert_eq!(claims.user_id, user_id);
        }

        for audience in [Audience::Aipt, Audience::Upt] {
            let token = authority.mint(
                audience,
                user_id,
                Some(session_id),
                Some(0),
                ChronoDuration::minutes(15),
            );
            let err = authority
                .verify(token.as_str(), audience, Some(session_id), Some(1))
                .unwrap_err();
            assert!(matches!(err, AppError::TokenExpired));
        }
    }

    #[test]
    fn wrong_session_is_rejected() {
        let authority = authority();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let other_session = Uuid::new_v4();
        let token = authority.mint(
            Audience::Wst,
            user_id,
            Some(session_id),
            Some(0),
            ChronoDuration::hours(1),
        );
        let err = authority
            .verify(token.as_str(), Audience::Wst, Some(other_session), Some(0))
            .unwrap_err();
        assert!(matches!(err, AppError::TokenWrongSession));
    }

    #[test]
    fn tampered_payload_fails_signature_check() {
        let authority = authority();
        let user_id = Uuid::new_v4();
        let token = authority.mint(Audience::User, user_id, None, None, ChronoDuration::days(1));
        let mut tampered = token.0.clone();
        tampered.push('x');
        let err = authority
            .verify(&tampered, Audience::User, None, None)
            .unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid(_)));
    }

    #[test]
    fn lifetime_is_capped_at_audience_max() {
        let authority = authority();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let token = authority.mint(
            Audience::Aipt,
            user_id,
            Some(session_id),
            Some(0),
            ChronoDuration::days(30),
        );
        let claims = authority
            .verify(token.as_str(), Audience::Aipt, Some(session_id), Some(0))
            .unwrap();
        let lifetime = claims.expires_at - claims.issued_at;
        assert!(lifetime <= Audience::Aipt.max_lifetime());
    }
}
