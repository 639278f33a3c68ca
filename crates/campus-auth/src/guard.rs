//! Authorization decisions, independent of any HTTP framework
//!
//! The tower layers in [`crate::middleware`] call these; handlers that need
//! a finer decision than a layer can express may call them directly.

use http::HeaderMap;
use http::header::AUTHORIZATION;
use tracing::warn;

use crate::claims::{Claims, Role, RoleSet};
use crate::error::{AuthError, AuthResult};

/// Pull the bearer credential out of the `Authorization` header
///
/// The scheme is matched case-insensitively.
///
/// # Errors
///
/// Returns [`AuthError::MissingCredentials`] if the header is absent, is not
/// valid ASCII, uses another scheme or carries an empty token.
pub fn extract_bearer_token(headers: &HeaderMap) -> AuthResult<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MissingCredentials)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}

/// Require `claims` to hold at least one role of `required`
///
/// # Errors
///
/// Returns [`AuthError::InsufficientRole`] if the sets do not intersect.
pub fn check_roles(claims: &Claims, required: &RoleSet) -> AuthResult<()> {
    if claims.has_any_role(required) {
        return Ok(());
    }
    warn!(
        subject = %claims.subject_id,
        roles = %claims.roles,
        required = %required,
        "Insufficient role"
    );
    Err(AuthError::InsufficientRole {
        subject_id: claims.subject_id.clone(),
    })
}

/// Confine holders of `restricted` to resources they own
///
/// Subjects without `restricted` are not affected.
///
/// # Errors
///
/// Returns [`AuthError::AccessForbidden`] if the subject holds `restricted`
/// and `owner_id` is not its own id.
pub fn check_ownership(claims: &Claims, restricted: &Role, owner_id: &str) -> AuthResult<()> {
    if !claims.has_role(restricted) || claims.subject_id == owner_id {
        return Ok(());
    }
    warn!(
        subject = %claims.subject_id,
        resource = %owner_id,
        restricted_role = %restricted,
        "Ownership check failed"
    );
    Err(AuthError::AccessForbidden {
        subject_id: claims.subject_id.clone(),
        resource_id: owner_id.to_string(),
    })
}
