use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::accounts::repo::StoreError;

pub type AccountResult<T> = Result<T, AccountError>;

/// Where an email collision was detected. Creation paths answer 400,
/// update paths 409.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailConflict {
    Creation,
    Update,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Conflict(EmailConflict),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidCredential(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl std::fmt::Display for EmailConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EmailConflict::Creation => "The user with this email already exists in the system",
            EmailConflict::Update => "User with this email already exists",
        })
    }
}

impl AccountError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Converts a store failure, reporting a duplicate email as `kind`.
    pub fn from_store(err: StoreError, kind: EmailConflict) -> Self {
        match err {
            StoreError::DuplicateEmail(_) => Self::Conflict(kind),
            StoreError::Missing(_) => Self::not_found("User not found"),
            other => Self::Internal(other.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Conflict(EmailConflict::Creation) => StatusCode::BAD_REQUEST,
            Self::Conflict(EmailConflict::Update) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidCredential(_) | Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        Self::from_store(err, EmailConflict::Update)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                error!(error = %e, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn conflict_status_depends_on_path() {
        assert_eq!(
            AccountError::Conflict(EmailConflict::Creation).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AccountError::Conflict(EmailConflict::Update).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn duplicate_email_from_store_becomes_conflict() {
        let err = AccountError::from_store(
            StoreError::DuplicateEmail("a@example.com".into()),
            EmailConflict::Creation,
        );
        assert!(matches!(err, AccountError::Conflict(EmailConflict::Creation)));

        let err: AccountError = StoreError::Missing(uuid::Uuid::new_v4()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: AccountError = StoreError::Database(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, AccountError::Internal(_)));
    }

    #[test]
    fn internal_errors_hide_details() {
        let res = AccountError::Internal(anyhow::anyhow!("pool exhausted")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
