use crate::AppState;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("could not issue token: {0}")]
    Issue(#[from] jsonwebtoken::errors::Error),
}

/// Turns a bearer token into the account id it was issued for.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, token: &str) -> Result<String, AuthError>;
}

// ── JWT ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
}

/// HS256 JWT authenticator. The account id travels in the `sub` claim.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }

    /// Sign a token for `account_id` that expires after the configured ttl.
    pub fn issue(&self, account_id: &str) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let claims = Claims {
            sub: account_id.to_owned(),
            exp: (now + self.ttl).as_secs(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<String, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!("rejected bearer token: {}", e);
            AuthError::Unauthenticated
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        Ok(data.claims.sub)
    }
}

// ── AuthAccount extractor ──────────────────────────────────────────────────

/// Extractor for the authenticated account id.
///
/// Reads `Authorization: Bearer <token>` and asks the configured
/// [`Authenticator`]; a missing or bad token short-circuits with 401 before
/// the handler runs.
pub struct AuthAccount(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthAccount
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing bearer token"))?;

        state
            .authenticator
            .authenticate(token)
            .map(AuthAccount)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid or expired token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_authenticate() {
        let auth = JwtAuthenticator::new(b"secret", Duration::from_secs(60));
        let token = auth.issue("42").unwrap();
        assert_eq!(auth.authenticate(&token).unwrap(), "42");
    }

    #[test]
    fn foreign_and_garbage_tokens_are_rejected() {
        let ours = JwtAuthenticator::new(b"secret", Duration::from_secs(60));
        let theirs = JwtAuthenticator::new(b"other", Duration::from_secs(60));
        let token = theirs.issue("42").unwrap();

        assert!(matches!(
            ours.authenticate(&token),
            Err(AuthError::Unauthenticated)
        ));
        assert!(matches!(
            ours.authenticate("not.a.jwt"),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let auth = JwtAuthenticator::new(b"secret", Duration::from_secs(60));
        let claims = Claims {
            sub: "42".into(),
            // Well past the default 60s leeway.
            exp: 1_000,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &auth.encoding).unwrap();
        assert!(auth.authenticate(&token).is_err());
    }
}
