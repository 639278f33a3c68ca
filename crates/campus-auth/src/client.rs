//! Inter-service Client
//!
//! Calls a peer service under this service's own identity. Every call mints
//! a fresh short-lived service token, so the peer verifies it through the
//! same discovery path as any user token.

use std::fmt;
use std::sync::Arc;

use http::HeaderName;
use http::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::claims::Role;
use crate::config::ClientConfig;
use crate::error::{AuthError, AuthResult};
use crate::issuer::TokenIssuer;

/// Header carrying the request correlation id between services
pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Authenticated HTTP client for calls to peer services
#[derive(Clone)]
pub struct InterServiceClient {
    issuer: Arc<TokenIssuer>,
    identity: Role,
    http: reqwest::Client,
}

impl InterServiceClient {
    /// Create a client that calls peers as `identity`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(issuer: Arc<TokenIssuer>, identity: Role, config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::with_http_client(issuer, identity, http))
    }

    /// Create a client around an existing HTTP client
    pub fn with_http_client(issuer: Arc<TokenIssuer>, identity: Role, http: reqwest::Client) -> Self {
        Self {
            issuer,
            identity,
            http,
        }
    }

    /// Role this client presents to peers
    pub fn identity(&self) -> &Role {
        &self.identity
    }

    /// Fetch a JSON array of records from `endpoint`
    ///
    /// # Errors
    ///
    /// - [`AuthError::Signing`] if the service token cannot be issued
    /// - [`AuthError::UpstreamUnavailable`] on network failure or timeout
    /// - [`AuthError::UpstreamRejected`] on a non-success status
    /// - [`AuthError::UpstreamInvalidResponse`] if the body is not the expected JSON
    pub async fn fetch_resource<T: DeserializeOwned>(&self, endpoint: &str) -> AuthResult<Vec<T>> {
        self.get_json(endpoint, None).await
    }

    /// Like [`fetch_resource`](Self::fetch_resource), forwarding `correlation_id`
    ///
    /// # Errors
    ///
    /// Same as [`fetch_resource`](Self::fetch_resource).
    pub async fn fetch_resource_correlated<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        correlation_id: Option<&str>,
    ) -> AuthResult<Vec<T>> {
        self.get_json(endpoint, correlation_id).await
    }

    /// Fetch a single JSON value from `endpoint`
    ///
    /// # Errors
    ///
    /// Same as [`fetch_resource`](Self::fetch_resource).
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        correlation_id: Option<&str>,
    ) -> AuthResult<T> {
        let token = self.issuer.issue_service_token(&self.identity)?;

        let mut request = self
            .http
            .get(endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", token.as_str()));
        if let Some(id) = correlation_id {
            request = request.header(CORRELATION_ID_HEADER, id);
        }

        debug!(endpoint = %endpoint, identity = %self.identity, "Calling upstream service");
        let response = request
            .send()
            .await
            .map_err(|e| unavailable(endpoint, &e))?;

        let status = response.status();
        if !status.is_success() {
            error!(endpoint = %endpoint, status = %status, "Upstream service rejected request");
            return Err(AuthError::UpstreamRejected {
                endpoint: endpoint.to_string(),
                status,
            });
        }

        // A body cut short is a transport failure, not a bad payload
        let body = response
            .bytes()
            .await
            .map_err(|e| unavailable(endpoint, &e))?;
        serde_json::from_slice::<T>(&body).map_err(|e| {
            error!(endpoint = %endpoint, error = %e, "Upstream response could not be decoded");
            AuthError::UpstreamInvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

fn unavailable(endpoint: &str, e: &reqwest::Error) -> AuthError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };
    error!(endpoint = %endpoint, error = %reason, "Upstream service unreachable");
    AuthError::UpstreamUnavailable {
        endpoint: endpoint.to_string(),
        reason,
    }
}

impl fmt::Debug for InterServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterServiceClient")
            .field("identity", &self.identity)
            .field("issuer", &self.issuer.discovery_uri())
            .finish_non_exhaustive()
    }
}
