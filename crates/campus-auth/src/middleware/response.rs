//! HTTP rendering of authorization failures

use axum::Json;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::RETRY_AFTER;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::client::CORRELATION_ID_HEADER;
use crate::error::AuthError;

/// JSON body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Stable caller-facing message
    pub message: String,
    /// Correlation id of the failed request
    pub correlation_id: Option<String>,
}

/// Correlation id carried by a request, if any
pub fn correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(&CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Build an error response with a JSON [`ErrorBody`]
///
/// The body is also stored as a response extension so
/// [`attach_correlation_id`] can fill in the id later.
pub fn error_response(status: StatusCode, message: impl Into<String>, correlation_id: Option<String>) -> Response {
    let body = ErrorBody {
        message: message.into(),
        correlation_id,
    };
    let mut response = (status, Json(body.clone())).into_response();
    response.extensions_mut().insert(body);
    response
}

/// Render an [`AuthError`] for a request with `correlation_id`
pub fn auth_error_response(error: &AuthError, correlation_id: Option<String>) -> Response {
    let mut response = error_response(error.status_code(), error.public_message(), correlation_id);
    if let AuthError::RateLimitExceeded { retry_after, .. } = error {
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
    }
    response
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        auth_error_response(&self, None)
    }
}

/// Fill the correlation id into error bodies rendered without one
///
/// Handlers returning `Err(..)` cannot see request headers; this middleware
/// rewrites their body once the response comes back.
pub async fn attach_correlation_id(request: Request, next: Next) -> Response {
    let id = correlation_id(request.headers());
    let response = next.run(request).await;

    let Some(id) = id else {
        return response;
    };
    let Some(body) = response.extensions().get::<ErrorBody>() else {
        return response;
    };
    if body.correlation_id.is_some() {
        return response;
    }

    let body = ErrorBody {
        message: body.message.clone(),
        correlation_id: Some(id),
    };
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(http::header::CONTENT_LENGTH);
    let mut rebuilt = Json(body.clone()).into_response();
    *rebuilt.status_mut() = parts.status;
    *rebuilt.headers_mut() = parts.headers;
    rebuilt.extensions_mut().insert(body);
    rebuilt
}
