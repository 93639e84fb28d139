use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::claims::Claims,
    config::{ConfigError, JwtConfig},
    state::AppState,
};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("token lifetime {0:?} is out of range")]
    Lifetime(Duration),
}

/// Signing and verification keys plus the claims every token must carry.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Result<Self, ConfigError> {
        if cfg.secret.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if cfg.ttl.is_zero() || expiry(OffsetDateTime::now_utc(), cfg.ttl).is_none() {
            return Err(ConfigError::Invalid {
                key: "JWT_EXPIRES_IN",
                value: format!("{}s", cfg.ttl.as_secs()),
            });
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: cfg.ttl,
        })
    }

    pub fn sign(&self, user_id: Uuid) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let exp = expiry(now, self.ttl).ok_or(TokenError::Lifetime(self.ttl))?;
        let claims = Claims {
            id: user_id,
            iat: timestamp(now)?,
            exp: timestamp(exp)?,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        self.encode(&claims)
    }

    /// A token for `user_id` that expired an hour ago.
    #[cfg(test)]
    pub(crate) fn sign_expired(&self, user_id: Uuid) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            id: user_id,
            iat: timestamp(now - TimeDuration::hours(2))?,
            exp: timestamp(now - TimeDuration::hours(1))?,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        let token =
            encode(&Header::default(), claims, &self.encoding).map_err(TokenError::Signing)?;
        debug!(user_id = %claims.id, "jwt signed");
        Ok(token)
    }

    /// Checks signature, expiry, issuer and audience; returns the user id.
    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data =
            decode::<Claims>(token, &self.decoding, &validation).map_err(TokenError::Invalid)?;
        debug!(user_id = %data.claims.id, "jwt verified");
        Ok(data.claims.id)
    }
}

fn expiry(now: OffsetDateTime, ttl: Duration) -> Option<OffsetDateTime> {
    let ttl = TimeDuration::try_from(ttl).ok()?;
    now.checked_add(ttl)
}

fn timestamp(at: OffsetDateTime) -> Result<usize, TokenError> {
    usize::try_from(at.unix_timestamp()).map_err(|_| TokenError::Lifetime(Duration::ZERO))
}

#[cfg(test)]
pub(crate) fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test-secret".into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
        ttl: Duration::from_secs(7 * 24 * 60 * 60),
    }
}
