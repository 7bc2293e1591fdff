use std::{fmt, sync::Arc};

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{AccountStatus, Role},
    policy::{self, Check},
    repository::RepositoryState,
    token::TokenCodec,
};

/// The only accepted `Authorization` scheme.
const BEARER_PREFIX: &str = "Bearer ";

/// Rejection
///
/// Why a request could not be resolved to a principal. Produced by the token codec
/// (`Malformed`, `BadSignature`, `Expired`), the session resolver, and login
/// (`InvalidCredentials`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingOrMalformedHeader,
    InvalidCredentials,
    Malformed,
    BadSignature,
    Expired,
    UserGone,
    AccountDisabled,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::MissingOrMalformedHeader => "missing or malformed authorization header",
            Rejection::InvalidCredentials => "invalid credentials",
            Rejection::Malformed => "token is malformed",
            Rejection::BadSignature => "token signature is invalid",
            Rejection::Expired => "token has expired",
            Rejection::UserGone => "account no longer exists",
            Rejection::AccountDisabled => "account is disabled",
        };
        f.write_str(text)
    }
}

/// Principal
///
/// The resolved identity of an authenticated request. Built from the user record as
/// it is in storage right now, so role and status edits apply on the next request.
///
/// Handlers take it as an argument; Axum resolves it through `FromRequestParts`.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub status: AccountStatus,
}

impl Principal {
    /// Runs a policy check against this principal.
    pub fn require(&self, check: Check) -> Result<(), AppError> {
        policy::authorize(Some(self), &check).map_err(AppError::from)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// SessionResolver
///
/// Turns a raw `Authorization` header into a `Principal`. Costs one user lookup per
/// call; that lookup is what makes disabling or deleting an account take effect
/// before the token expires.
#[derive(Clone)]
pub struct SessionResolver {
    codec: Arc<TokenCodec>,
    repo: RepositoryState,
}

impl SessionResolver {
    pub fn new(codec: Arc<TokenCodec>, repo: RepositoryState) -> Self {
        Self { codec, repo }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// authenticate
    ///
    /// 1. Header must carry the `Bearer ` scheme.
    /// 2. The token must parse (signature + expiry).
    /// 3. The subject must still exist and be active.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, AppError> {
        let token = header
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .filter(|token| !token.is_empty())
            .ok_or(Rejection::MissingOrMalformedHeader)?;

        let claims = self.codec.parse(token)?;

        let user = self
            .repo
            .find_user(claims.sub)
            .await?
            .ok_or(Rejection::UserGone)?;

        if user.status != AccountStatus::Active {
            tracing::info!(user_id = %user.id, "session rejected for disabled account");
            return Err(Rejection::AccountDisabled.into());
        }

        Ok(Principal {
            id: user.id,
            username: user.username,
            role: user.role,
            status: user.status,
        })
    }
}

/// Principal Extractor Implementation
///
/// Reuses the principal attached by `require_session` when the route sits behind it,
/// otherwise resolves the `Authorization` header itself. Either way the principal
/// lives for this request only.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    SessionResolver: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }

        let sessions = SessionResolver::from_ref(state);
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let principal = sessions.authenticate(header).await?;
        parts.extensions.insert(principal.clone());
        Ok(principal)
    }
}

/// require_session
///
/// Route layer for every protected group: resolves the principal once and attaches
/// it to the request, or answers 401/403 before the handler runs.
pub async fn require_session(
    State(sessions): State<SessionResolver>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let principal = sessions.authenticate(header).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// require_admin
///
/// Route layer for the admin group. Must run after `require_session`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let principal = request.extensions().get::<Principal>();
    policy::authorize(principal, &Check::Role(Role::Admin))?;
    Ok(next.run(request).await)
}
