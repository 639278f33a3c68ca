//! Shared state handed to every handler

use std::fmt;
use std::sync::Arc;

use campus_auth::{
    DiscoveryDocument, InterServiceClient, JwksKeyResolver, KeyPublisher, KeyStore, RateLimiter,
    TokenIssuer, TokenVerifier, discovery_uri,
};
use tracing::info;

use crate::config::{PeerKind, PeersConfig, ServiceConfig, ServiceKind};
use crate::error::{ServerError, ServerResult};
use crate::password::{Argon2PasswordVerifier, PasswordVerifier};
use crate::store::{InMemoryRecordStore, RecordStore};

/// Everything one service instance needs to answer requests
#[derive(Clone)]
pub struct AppState {
    kind: ServiceKind,
    peers: Arc<PeersConfig>,
    issuer: Arc<TokenIssuer>,
    publisher: KeyPublisher,
    verifier: Arc<TokenVerifier>,
    client: InterServiceClient,
    rate_limiter: Arc<RateLimiter>,
    store: Arc<dyn RecordStore>,
    passwords: Arc<dyn PasswordVerifier>,
}

impl AppState {
    /// Wire up a service from its configuration and signing key
    ///
    /// Records live in memory and passwords are hashed with Argon2id unless
    /// replaced with [`with_store`](Self::with_store) or
    /// [`with_password_verifier`](Self::with_password_verifier).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Internal`] if an HTTP client cannot be built.
    pub fn new(config: &ServiceConfig, keys: KeyStore) -> ServerResult<Self> {
        let kind = config.service.kind;
        let keys = Arc::new(keys);
        let auth = &config.auth;

        let issuer = Arc::new(
            TokenIssuer::new(Arc::clone(&keys), discovery_uri(&config.service.public_base_url))
                .with_user_ttl(auth.tokens.user_ttl())
                .with_service_ttl(auth.tokens.service_ttl()),
        );
        let resolver = JwksKeyResolver::new(&auth.discovery)
            .map_err(|e| ServerError::Internal(format!("discovery client: {e}")))?;
        let verifier =
            Arc::new(TokenVerifier::new(Arc::new(resolver)).with_leeway(auth.tokens.leeway()));
        let client = InterServiceClient::new(Arc::clone(&issuer), kind.identity(), &auth.client)
            .map_err(|e| ServerError::Internal(format!("inter-service client: {e}")))?;

        info!(
            service = %kind,
            kid = %keys.key_id(),
            discovery_uri = %issuer.discovery_uri(),
            "Service state initialized"
        );

        Ok(Self {
            kind,
            peers: Arc::new(config.peers.clone()),
            publisher: KeyPublisher::new(&keys),
            issuer,
            verifier,
            client,
            rate_limiter: Arc::new(RateLimiter::from_config(&auth.rate_limit)),
            store: Arc::new(InMemoryRecordStore::new()),
            passwords: Arc::new(Argon2PasswordVerifier::new()),
        })
    }

    /// Replace the record store
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the password verifier
    #[must_use]
    pub fn with_password_verifier(mut self, passwords: Arc<dyn PasswordVerifier>) -> Self {
        self.passwords = passwords;
        self
    }

    /// Service this state belongs to
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// Token issuer for this service's key
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Verifier for inbound tokens
    pub fn verifier(&self) -> Arc<TokenVerifier> {
        Arc::clone(&self.verifier)
    }

    /// Limiter shared by every rate-limited route of this service
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    /// Client for calls to peers
    pub fn client(&self) -> &InterServiceClient {
        &self.client
    }

    /// This service's record collection
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Password hasher
    pub fn passwords(&self) -> Arc<dyn PasswordVerifier> {
        Arc::clone(&self.passwords)
    }

    /// Discovery document to publish
    pub fn discovery_document(&self) -> Arc<DiscoveryDocument> {
        self.publisher.discovery_document()
    }

    /// Collection endpoint of a peer
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Internal`] if the peer has no base URL.
    pub fn peer_url(&self, peer: PeerKind) -> ServerResult<String> {
        self.peers
            .collection_url(peer)
            .ok_or_else(|| ServerError::Internal(format!("peers.{peer} is not configured")))
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("kind", &self.kind)
            .field("issuer", &self.issuer)
            .field("peers", &self.peers)
            .finish_non_exhaustive()
    }
}
