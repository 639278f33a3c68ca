//! HTTP routes for each service kind

pub mod discovery;
pub mod enrollments;
pub mod login;
pub mod records;

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use campus_auth::middleware::{
    AuthorizeLayer, OwnershipLayer, RateLimitLayer, authorize, restrict_to_own_resource,
};
use campus_auth::{Claims, RateLimiter, Role, RoleSet, TokenVerifier};
use serde_json::Value;
use tower::ServiceBuilder;
use tower::layer::util::{Identity, Stack};

use crate::error::{ServerError, ServerResult};
use crate::store::Record;

/// Field holding a stored password hash
pub const PASSWORD_FIELD: &str = "password";

/// Guard stack of role check then ownership check
pub type OwnedGuard = ServiceBuilder<Stack<OwnershipLayer, Stack<AuthorizeLayer, Identity>>>;

/// Guard stack of role check then rate limit
pub type LimitedGuard = ServiceBuilder<Stack<RateLimitLayer, Stack<AuthorizeLayer, Identity>>>;

pub(crate) fn guard(verifier: &Arc<TokenVerifier>, roles: impl Into<RoleSet>) -> AuthorizeLayer {
    authorize(Arc::clone(verifier), roles)
}

pub(crate) fn guard_own(
    verifier: &Arc<TokenVerifier>,
    roles: impl Into<RoleSet>,
    restricted: Role,
) -> OwnedGuard {
    ServiceBuilder::new()
        .layer(guard(verifier, roles))
        .layer(restrict_to_own_resource(restricted))
}

pub(crate) fn guard_limited(
    verifier: &Arc<TokenVerifier>,
    roles: impl Into<RoleSet>,
    limiter: Arc<RateLimiter>,
) -> LimitedGuard {
    ServiceBuilder::new()
        .layer(guard(verifier, roles))
        .layer(RateLimitLayer::from_arc(limiter))
}

/// Body as a JSON object
pub(crate) fn json_object(payload: Result<Json<Value>, JsonRejection>) -> ServerResult<Record> {
    match payload?.0 {
        Value::Object(record) => Ok(record),
        _ => Err(ServerError::BadRequest("Expected a JSON object".into())),
    }
}

/// Non-empty string field of a record
pub(crate) fn string_field<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Strip the password hash unless the caller is the auth service
pub(crate) fn redact(mut record: Record, claims: &Claims) -> Record {
    if !claims.has_role(&Role::AuthService) {
        record.remove(PASSWORD_FIELD);
    }
    record
}
