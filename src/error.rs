use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::auth::{
    dto::ApiResponse, jwt::TokenError, password::HashError, repo_types::StoreError,
    validation::ValidationError,
};

pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const NO_TOKEN: &str = "Not authorized, no token";
pub const INVALID_TOKEN: &str = "Not authorized, token invalid";
pub const WRONG_CURRENT_PASSWORD: &str = "Current password is incorrect";
pub const EMAIL_TAKEN: &str = "Email is already registered";
const INTERNAL: &str = "Internal server error";

/// Error returned by every handler; rendered as the JSON envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("email already registered")]
    DuplicateEmail,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateEmail => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Validation(msg) | Self::NotFound(msg) => msg,
            Self::DuplicateEmail => EMAIL_TAKEN.to_string(),
            Self::Unauthorized(msg) => msg.to_string(),
            Self::Internal(err) => {
                error!(error = ?err, "unhandled error");
                INTERNAL.to_string()
            }
        };
        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.0)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => Self::DuplicateEmail,
            StoreError::Validation(v) => v.into(),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<HashError> for ApiError {
    fn from(e: HashError) -> Self {
        Self::Internal(e.into())
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        Self::Internal(e.into())
    }
}
