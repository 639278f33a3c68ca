//! Authorization Guard layer
//!
//! Verifies the bearer token, checks the subject's roles against the route's
//! accepted set and stores the verified [`Claims`] in the request extensions.
//! Requests that fail any step are answered here; the inner service never
//! sees them.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::response::Response;
use futures::future::BoxFuture;
use http::Request;
use tower::{Layer, Service};
use tracing::debug;

use super::response::{auth_error_response, correlation_id};
use crate::claims::{Claims, RoleSet};
use crate::error::AuthResult;
use crate::guard::{check_roles, extract_bearer_token};
use crate::verifier::TokenVerifier;

/// Layer that applies [`AuthorizeService`]
#[derive(Debug, Clone)]
pub struct AuthorizeLayer {
    verifier: Arc<TokenVerifier>,
    required: Arc<RoleSet>,
}

impl AuthorizeLayer {
    /// Accept subjects holding at least one of `required`
    pub fn new(verifier: Arc<TokenVerifier>, required: impl Into<RoleSet>) -> Self {
        Self {
            verifier,
            required: Arc::new(required.into()),
        }
    }

    /// Roles this layer accepts
    pub fn required(&self) -> &RoleSet {
        &self.required
    }
}

impl<S> Layer<S> for AuthorizeLayer {
    type Service = AuthorizeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizeService {
            inner,
            verifier: Arc::clone(&self.verifier),
            required: Arc::clone(&self.required),
        }
    }
}

/// Service that verifies and authorizes requests before forwarding them
#[derive(Debug, Clone)]
pub struct AuthorizeService<S> {
    inner: S,
    verifier: Arc<TokenVerifier>,
    required: Arc<RoleSet>,
}

async fn authenticate(verifier: &TokenVerifier, required: &RoleSet, token: AuthResult<String>) -> AuthResult<Claims> {
    let claims = verifier.verify(&token?).await?;
    check_roles(&claims, required)?;
    Ok(claims)
}

impl<S, B> Service<Request<B>> for AuthorizeService<S>
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

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let token = extract_bearer_token(request.headers()).map(str::to_string);
        if token.is_err() {
            debug!(path = %request.uri().path(), "Request without bearer token");
        }
        let correlation_id = correlation_id(request.headers());
        let verifier = Arc::clone(&self.verifier);
        let required = Arc::clone(&self.required);
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            match authenticate(&verifier, &required, token).await {
                Ok(claims) => {
                    request.extensions_mut().insert(claims);
                    inner.call(request).await
                }
                Err(e) => Ok(auth_error_response(&e, correlation_id)),
            }
        })
    }
}
