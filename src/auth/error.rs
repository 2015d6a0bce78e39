use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::repo::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email is already registered.")]
    DuplicateEmail,
    /// Covers both unknown email and wrong password.
    #[error("Invalid credentials.")]
    InvalidCredentials,
    #[error("{0}")]
    MalformedInput(String),
    #[error("user store unavailable")]
    StoreUnavailable(#[source] StoreError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            other => AuthError::StoreUnavailable(other),
        }
    }
}

/// Error body, shaped `{"detail": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::DuplicateEmail | AuthError::InvalidCredentials => StatusCode::BAD_REQUEST,
            AuthError::MalformedInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_detail(&self) -> String {
        match self {
            AuthError::StoreUnavailable(_) => "Service temporarily unavailable.".into(),
            AuthError::Internal(_) => "Internal server error.".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::StoreUnavailable(e) => error!(error = %e, "user store failure"),
            AuthError::Internal(e) => error!(error = ?e, "internal auth failure"),
            _ => {}
        }
        let body = ErrorBody {
            detail: self.public_detail(),
        };
        (self.status(), Json(body)).into_response()
    }
}
