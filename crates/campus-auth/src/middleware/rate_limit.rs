//! Rate Limiter layer
//!
//! Keys on the verified subject id, so it has to run inside
//! [`AuthorizeLayer`](super::AuthorizeLayer). A request that arrives without
//! claims is rejected with 401 rather than counted against some shared key.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::response::Response;
use futures::future::BoxFuture;
use http::Request;
use tower::{Layer, Service};
use tracing::warn;

use super::response::{auth_error_response, correlation_id};
use crate::claims::Claims;
use crate::error::AuthError;
use crate::rate_limit::RateLimiter;

/// Layer that applies [`RateLimitService`]
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    /// Wrap a limiter
    pub fn new(limiter: RateLimiter) -> Self {
        Self::from_arc(Arc::new(limiter))
    }

    /// Share a limiter between several routes
    ///
    /// Routes built from the same limiter draw on one budget per subject.
    pub fn from_arc(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Service that counts requests per subject and rejects those over the limit
#[derive(Debug, Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<Request<B>> for RateLimitService<S>
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
        let subject_id = request
            .extensions()
            .get::<Claims>()
            .map(|claims| claims.subject_id.clone());
        let correlation_id = correlation_id(request.headers());
        let limiter = Arc::clone(&self.limiter);
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let Some(subject_id) = subject_id else {
                warn!(path = %request.uri().path(), "Rate limit reached without verified claims");
                return Ok(auth_error_response(&AuthError::MissingCredentials, correlation_id));
            };
            match limiter.check(&subject_id).await {
                Ok(()) => inner.call(request).await,
                Err(e) => Ok(auth_error_response(&e, correlation_id)),
            }
        })
    }
}
