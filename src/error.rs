//! Application error taxonomy and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    auth::Rejection,
    policy::{Denial, DenialKind},
    repository::StoreError,
};

/// Convenience alias for handler and service return types.
pub type AppResult<T> = Result<T, AppError>;

/// AppError
///
/// Every failure the core can report. Session and policy failures arrive here as
/// typed reasons and are mapped deterministically to a status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(Rejection),

    #[error("account disabled")]
    AccountDisabled,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// ErrorResponse
///
/// JSON body returned for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::AccountDisabled | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::AccountDisabled => "account_disabled",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Storage(_) => "storage_failure",
            AppError::Validation(_) => "validation_failure",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Unauthenticated(reason) => reason.to_string(),
            AppError::AccountDisabled => "account is disabled".to_string(),
            AppError::Storage(detail) | AppError::Internal(detail) => {
                // The detail stays in the logs.
                tracing::error!(error = %detail, kind = self.kind(), "request failed");
                "internal server error".to_string()
            }
            AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::Validation(m) => m.clone(),
        };
        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message,
        });
        (self.status(), body).into_response()
    }
}

impl From<Rejection> for AppError {
    fn from(reason: Rejection) -> Self {
        match reason {
            Rejection::AccountDisabled => AppError::AccountDisabled,
            other => AppError::Unauthenticated(other),
        }
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial.kind {
            DenialKind::Unauthenticated => {
                AppError::Unauthenticated(Rejection::MissingOrMalformedHeader)
            }
            DenialKind::Forbidden => AppError::Forbidden(denial.reason),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(what) => AppError::Conflict(what),
            StoreError::Backend(detail) => AppError::Storage(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_rejection_is_classified_apart_from_unauthenticated() {
        assert!(matches!(
            AppError::from(Rejection::AccountDisabled),
            AppError::AccountDisabled
        ));
        assert!(matches!(
            AppError::from(Rejection::Expired),
            AppError::Unauthenticated(Rejection::Expired)
        ));
        assert_eq!(AppError::AccountDisabled.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::from(Rejection::UserGone).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn store_conflicts_surface_as_conflict() {
        let err = AppError::from(StoreError::Conflict("users_email_key".into()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let err = AppError::from(StoreError::Backend("pool timed out".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
