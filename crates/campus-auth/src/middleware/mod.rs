//! Tower middleware for guarded routes
//!
//! Three layers, composed per route with the authorization layer outermost:
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use tower::ServiceBuilder;
//! use campus_auth::middleware::{authorize, limit, restrict_to_own_resource};
//! use campus_auth::Role;
//!
//! let router = Router::new()
//!     .route("/students/{id}", get(get_student).route_layer(
//!         ServiceBuilder::new()
//!             .layer(authorize(verifier.clone(), [Role::Admin, Role::Professor, Role::Student]))
//!             .layer(restrict_to_own_resource(Role::Student)),
//!     ))
//!     .route("/professors", get(list_professors).route_layer(
//!         ServiceBuilder::new()
//!             .layer(authorize(verifier, [Role::Admin, Role::AuthService]))
//!             .layer(limit(Duration::from_secs(60), 10)),
//!     ));
//! ```
//!
//! Handlers read the verified subject through `Extension<Claims>`.

mod authorize;
mod ownership;
mod rate_limit;
mod response;

use std::sync::Arc;
use std::time::Duration;

pub use authorize::{AuthorizeLayer, AuthorizeService};
pub use ownership::{DEFAULT_OWNER_PARAM, OwnershipLayer, OwnershipService};
pub use rate_limit::{RateLimitLayer, RateLimitService};
pub use response::{ErrorBody, attach_correlation_id, auth_error_response, correlation_id, error_response};

use crate::claims::{Role, RoleSet};
use crate::rate_limit::RateLimiter;
use crate::verifier::TokenVerifier;

/// Require a verified token holding at least one of `roles`
pub fn authorize(verifier: Arc<TokenVerifier>, roles: impl Into<RoleSet>) -> AuthorizeLayer {
    AuthorizeLayer::new(verifier, roles)
}

/// Confine holders of `restricted` to the resource named by the `id` path parameter
pub fn restrict_to_own_resource(restricted: Role) -> OwnershipLayer {
    OwnershipLayer::new(restricted)
}

/// Allow each subject `max_requests` per `window`
pub fn limit(window: Duration, max_requests: u32) -> RateLimitLayer {
    RateLimitLayer::new(RateLimiter::in_memory(window, max_requests))
}
