//! Key Resolver: discovery URI + key id -> verification key
//!
//! Keys are pulled from the issuer's discovery document at verification time.
//! Nothing is pre-shared, so a key published by an issuer becomes usable as
//! soon as the document serves it.
//!
//! - **Cache**: resolved keys are cached per `(discovery_uri, kid)` with a
//!   bounded capacity and TTL. Concurrent misses for one entry share a
//!   single fetch.
//! - **Rotation races**: a `KeyNotFound` invalidates the entry and forces
//!   exactly one refetch before failing. Nothing else is retried.
//! - **Timeouts**: every fetch runs under the configured HTTP timeout, and
//!   redirects are not followed.
//! - **Trust**: `https` is required, except for loopback hosts. An optional
//!   allow-list pins the issuers a service accepts.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::config::DiscoveryConfig;
use crate::error::KeyResolutionError;
use crate::jwks::{DiscoveryDocument, KeyPublisher};

/// Resolves the public key a token names
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Resolve the key `kid` published at `discovery_uri`
    ///
    /// # Errors
    ///
    /// - [`KeyResolutionError::KeyNotFound`] if the document has no entry for `kid`
    /// - [`KeyResolutionError::DiscoveryFetch`] if the document cannot be
    ///   fetched, parsed or the entry cannot be used
    /// - [`KeyResolutionError::UntrustedDiscoveryUri`] if the URI is refused
    async fn resolve(
        &self,
        discovery_uri: &str,
        kid: &str,
    ) -> Result<DecodingKey, KeyResolutionError>;
}

/// Which discovery URIs a resolver is willing to contact
#[derive(Debug, Clone, Default)]
pub struct TrustPolicy {
    trusted_uris: Vec<String>,
    allow_insecure_http: bool,
}

impl TrustPolicy {
    /// Accept any `https` URI, and `http` for loopback hosts
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept the listed URIs (an empty list accepts any)
    #[must_use]
    pub fn with_trusted_uris(mut self, uris: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.trusted_uris = uris.into_iter().map(Into::into).collect();
        self
    }

    /// Accept plain `http` for every host
    #[must_use]
    pub fn allow_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    /// Check a discovery URI against the policy
    ///
    /// # Errors
    ///
    /// Returns [`KeyResolutionError::UntrustedDiscoveryUri`] naming the rule
    /// that refused the URI.
    pub fn check(&self, discovery_uri: &str) -> Result<(), KeyResolutionError> {
        let url = Url::parse(discovery_uri).map_err(|e| {
            KeyResolutionError::untrusted(discovery_uri, format!("not a valid URL: {e}"))
        })?;

        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http || is_loopback(&url) => {}
            "http" => {
                return Err(KeyResolutionError::untrusted(
                    discovery_uri,
                    "plain http is only allowed for loopback hosts",
                ));
            }
            other => {
                return Err(KeyResolutionError::untrusted(
                    discovery_uri,
                    format!("unsupported scheme '{other}'"),
                ));
            }
        }

        if !self.trusted_uris.is_empty() && !self.trusted_uris.iter().any(|t| t == discovery_uri) {
            return Err(KeyResolutionError::untrusted(
                discovery_uri,
                "not in the trusted discovery URI list",
            ));
        }
        Ok(())
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

type CacheKey = (String, String);

/// Resolves keys by fetching discovery documents over HTTP
#[derive(Clone)]
pub struct JwksKeyResolver {
    http_client: reqwest::Client,
    cache: Cache<CacheKey, DecodingKey>,
    policy: TrustPolicy,
}

impl JwksKeyResolver {
    /// Create a resolver from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DiscoveryConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(http_client, config))
    }

    /// Create a resolver around an existing HTTP client
    ///
    /// The client's own timeout applies to every fetch.
    pub fn with_client(http_client: reqwest::Client, config: &DiscoveryConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(config.cache_ttl())
            .build();
        let policy = TrustPolicy::new()
            .with_trusted_uris(config.trusted_uris.iter().cloned())
            .allow_insecure_http(config.allow_insecure_http);
        Self {
            http_client,
            cache,
            policy,
        }
    }

    /// Replace the trust policy
    #[must_use]
    pub fn with_policy(mut self, policy: TrustPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn cached(&self, discovery_uri: &str, kid: &str) -> Result<DecodingKey, KeyResolutionError> {
        let key = (discovery_uri.to_string(), kid.to_string());
        if self.cache.contains_key(&key) {
            debug!(discovery_uri = %discovery_uri, kid = %kid, "Key cache hit");
        }
        self.cache
            .try_get_with(key, self.fetch_key(discovery_uri, kid))
            .await
            .map_err(|e| (*e).clone())
    }

    async fn fetch_key(&self, discovery_uri: &str, kid: &str) -> Result<DecodingKey, KeyResolutionError> {
        let document = self.fetch_document(discovery_uri).await?;
        let jwk = document
            .find(kid)
            .ok_or_else(|| KeyResolutionError::not_found(discovery_uri, kid))?;
        jwk.to_decoding_key()
            .map_err(|reason| KeyResolutionError::fetch(discovery_uri, reason))
    }

    async fn fetch_document(&self, discovery_uri: &str) -> Result<DiscoveryDocument, KeyResolutionError> {
        info!(discovery_uri = %discovery_uri, "Fetching discovery document");

        let response = self.http_client.get(discovery_uri).send().await.map_err(|e| {
            warn!(discovery_uri = %discovery_uri, error = %e, "Discovery document fetch failed");
            let reason = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            };
            KeyResolutionError::fetch(discovery_uri, reason)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(discovery_uri = %discovery_uri, status = %status, "Discovery endpoint returned error status");
            return Err(KeyResolutionError::fetch(
                discovery_uri,
                format!("endpoint returned status {status}"),
            ));
        }

        let document: DiscoveryDocument = response.json().await.map_err(|e| {
            warn!(discovery_uri = %discovery_uri, error = %e, "Discovery document is not valid JSON");
            KeyResolutionError::fetch(discovery_uri, format!("invalid discovery document: {e}"))
        })?;

        info!(
            discovery_uri = %discovery_uri,
            key_count = document.keys.len(),
            "Fetched discovery document"
        );
        Ok(document)
    }
}

impl fmt::Debug for JwksKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksKeyResolver")
            .field("policy", &self.policy)
            .field("cached_keys", &self.cache.entry_count())
            .finish()
    }
}

#[async_trait]
impl KeyResolver for JwksKeyResolver {
    async fn resolve(
        &self,
        discovery_uri: &str,
        kid: &str,
    ) -> Result<DecodingKey, KeyResolutionError> {
        self.policy.check(discovery_uri)?;

        match self.cached(discovery_uri, kid).await {
            Err(e) if e.is_key_not_found() => {
                debug!(discovery_uri = %discovery_uri, kid = %kid, "Key not published, refetching once");
                let key = (discovery_uri.to_string(), kid.to_string());
                self.cache.invalidate(&key).await;
                let decoding_key = self.fetch_key(discovery_uri, kid).await.inspect_err(|e| {
                    warn!(discovery_uri = %discovery_uri, kid = %kid, error = %e, "Key resolution failed");
                })?;
                self.cache.insert(key, decoding_key.clone()).await;
                Ok(decoding_key)
            }
            other => other,
        }
    }
}

/// Resolves keys from documents held in memory
///
/// Lets a service verify its own tokens without a network hop, and lets
/// tests run the verifier without a discovery server.
#[derive(Clone, Default)]
pub struct LocalKeyResolver {
    documents: HashMap<String, DiscoveryDocument>,
}

impl LocalKeyResolver {
    /// Empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `document` for `discovery_uri`
    #[must_use]
    pub fn with_document(mut self, discovery_uri: impl Into<String>, document: DiscoveryDocument) -> Self {
        self.documents.insert(discovery_uri.into(), document);
        self
    }

    /// Serve a publisher's document for `discovery_uri`
    #[must_use]
    pub fn with_publisher(self, discovery_uri: impl Into<String>, publisher: &KeyPublisher) -> Self {
        let document = publisher.discovery_document().as_ref().clone();
        self.with_document(discovery_uri, document)
    }
}

impl fmt::Debug for LocalKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyResolver")
            .field("discovery_uris", &self.documents.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl KeyResolver for LocalKeyResolver {
    async fn resolve(
        &self,
        discovery_uri: &str,
        kid: &str,
    ) -> Result<DecodingKey, KeyResolutionError> {
        let document = self.documents.get(discovery_uri).ok_or_else(|| {
            KeyResolutionError::fetch(discovery_uri, "no document registered for this URI")
        })?;
        let jwk = document
            .find(kid)
            .ok_or_else(|| KeyResolutionError::not_found(discovery_uri, kid))?;
        jwk.to_decoding_key()
            .map_err(|reason| KeyResolutionError::fetch(discovery_uri, reason))
    }
}
