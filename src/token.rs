//! Signed, expiring session tokens (HS256 JWT).

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{auth::Rejection, error::AppError, models::Role};

/// Clock
///
/// Source of "now" for token issuance and expiry checks. Injected so expiry can be
/// tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// ManualClock
///
/// A clock that only moves when told to. Second precision, like the claims.
#[derive(Debug)]
pub struct ManualClock {
    seconds: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            seconds: AtomicI64::new(start.timestamp()),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        self.seconds.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.seconds.load(Ordering::SeqCst), 0).unwrap_or_default()
    }
}

/// Claims
///
/// The payload signed into every session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id.
    pub sub: Uuid,
    pub username: String,
    /// Role at issuance. Informational only; authorization reads the stored role.
    pub role: Role,
    /// Issued At (iat), unix seconds.
    pub iat: i64,
    /// Expiration Time (exp), unix seconds. Always strictly after `iat`.
    pub exp: i64,
}

/// Signing-key misconfiguration. Detected at construction and fatal at startup.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing secret must not be empty")]
    EmptySecret,
    #[error("token lifetime must be at least one second, got {0}s")]
    InvalidLifetime(i64),
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        AppError::Internal(e.to_string())
    }
}

/// TokenCodec
///
/// Issues and verifies session tokens with a process-wide secret. Immutable after
/// construction, so one `Arc<TokenCodec>` is shared by every request without locking.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(secret: &str, lifetime: TimeDelta) -> Result<Self, TokenError> {
        Self::with_clock(secret, lifetime, Arc::new(SystemClock))
    }

    pub fn with_clock(
        secret: &str,
        lifetime: TimeDelta,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        if lifetime.num_seconds() < 1 {
            return Err(TokenError::InvalidLifetime(lifetime.num_seconds()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
            clock,
        })
    }

    /// issue
    ///
    /// Signs a claims bundle valid from now until now + lifetime.
    pub fn issue(&self, user_id: Uuid, username: &str, role: Role) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// parse
    ///
    /// Verifies a token and returns its claims. Any failure is a total rejection:
    /// `Malformed`, `Expired` or `BadSignature`. Expiry is judged on the payload
    /// before the signature, so a stale token reads as `Expired` whoever signed it.
    pub fn parse(&self, token: &str) -> Result<Claims, Rejection> {
        let mut unverified = Validation::new(Algorithm::HS256);
        unverified.insecure_disable_signature_validation();
        unverified.validate_exp = false;
        let peeked = decode::<Claims>(token, &self.decoding, &unverified)
            .map_err(|_| Rejection::Malformed)?
            .claims;

        if peeked.exp <= peeked.iat {
            return Err(Rejection::Malformed);
        }
        if peeked.exp <= self.clock.now().timestamp() {
            return Err(Rejection::Expired);
        }

        // Expiry is ours to judge against the injected clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => Rejection::BadSignature,
                _ => Rejection::Malformed,
            })
    }
}
