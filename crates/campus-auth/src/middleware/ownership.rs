//! Ownership Guard layer
//!
//! Must run inside [`AuthorizeLayer`](super::AuthorizeLayer) and on a route
//! with a path parameter naming the resource owner. Missing claims or a
//! missing parameter reject the request.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, RawPathParams};
use axum::response::Response;
use futures::future::BoxFuture;
use http::Request;
use tower::{Layer, Service};
use tracing::warn;

use super::response::{auth_error_response, correlation_id};
use crate::claims::{Claims, Role};
use crate::error::{AuthError, AuthResult};
use crate::guard::check_ownership;

/// Default path parameter holding the owner id
pub const DEFAULT_OWNER_PARAM: &str = "id";

/// Layer that applies [`OwnershipService`]
#[derive(Debug, Clone)]
pub struct OwnershipLayer {
    restricted: Arc<Role>,
    param: Arc<str>,
}

impl OwnershipLayer {
    /// Confine holders of `restricted` to the resource named by the `id` path parameter
    pub fn new(restricted: Role) -> Self {
        Self {
            restricted: Arc::new(restricted),
            param: Arc::from(DEFAULT_OWNER_PARAM),
        }
    }

    /// Read the owner id from another path parameter
    #[must_use]
    pub fn with_param(mut self, param: &str) -> Self {
        self.param = Arc::from(param);
        self
    }
}

impl<S> Layer<S> for OwnershipLayer {
    type Service = OwnershipService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OwnershipService {
            inner,
            restricted: Arc::clone(&self.restricted),
            param: Arc::clone(&self.param),
        }
    }
}

/// Service that rejects restricted subjects reaching for another owner's resource
#[derive(Debug, Clone)]
pub struct OwnershipService<S> {
    inner: S,
    restricted: Arc<Role>,
    param: Arc<str>,
}

fn owner_id(params: &RawPathParams, param: &str) -> Option<String> {
    params
        .iter()
        .find(|(name, _)| *name == param)
        .map(|(_, value)| value.to_string())
}

impl<S, B> Service<Request<B>> for OwnershipService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let restricted = Arc::clone(&self.restricted);
        let param = Arc::clone(&self.param);
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            let correlation_id = correlation_id(&parts.headers);

            let params = RawPathParams::from_request_parts(&mut parts, &()).await.ok();
            let decision: AuthResult<()> = match (parts.extensions.get::<Claims>(), params) {
                (None, _) => {
                    warn!(path = %parts.uri.path(), "Ownership check reached without verified claims");
                    Err(AuthError::MissingCredentials)
                }
                (Some(claims), params) => match params.as_ref().and_then(|p| owner_id(p, &param)) {
                    Some(owner) => check_ownership(claims, &restricted, &owner),
                    None => {
                        warn!(path = %parts.uri.path(), param = %param, "Ownership check without owner path parameter");
                        Err(AuthError::AccessForbidden {
                            subject_id: claims.subject_id.clone(),
                            resource_id: String::new(),
                        })
                    }
                },
            };

            match decision {
                Ok(()) => inner.call(Request::from_parts(parts, body)).await,
                Err(e) => Ok(auth_error_response(&e, correlation_id)),
            }
        })
    }
}
