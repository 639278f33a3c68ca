//! Handler errors and their HTTP rendering

use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use campus_auth::middleware::{auth_error_response, error_response};
use campus_auth::AuthError;
use campus_auth::error::INTERNAL_MESSAGE;
use http::StatusCode;
use tracing::error;

use crate::password::PasswordError;
use crate::store::StoreError;

/// Result alias for handlers
pub type ServerResult<T> = Result<T, ServerError>;

/// Message for failed logins; never says which half was wrong
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

/// Errors a handler can end with
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Request body missing fields or not JSON
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No record with the requested id
    #[error("not found: {0}")]
    NotFound(String),

    /// Login with unknown email or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Record store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Password hashing failure
    #[error(transparent)]
    Password(#[from] PasswordError),

    /// Token, authorization or upstream failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Anything else that is the server's fault
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => error_response(StatusCode::BAD_REQUEST, message, None),
            Self::NotFound(message) => error_response(StatusCode::NOT_FOUND, message, None),
            Self::InvalidCredentials => {
                error_response(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS_MESSAGE, None)
            }
            Self::Store(StoreError::Conflict(id)) => {
                error_response(StatusCode::BAD_REQUEST, format!("Record {id} already exists"), None)
            }
            Self::Auth(e) => {
                if e.status_code().is_server_error() {
                    error!(error = %e, "Request failed");
                }
                auth_error_response(&e, None)
            }
            other => {
                error!(error = %other, "Request failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE, None)
            }
        }
    }
}
