//! Common test utilities for integration tests
//!
//! Key generation is slow, so each test binary generates its key pairs once.
//! [`MockIssuer`] stands in for a peer service's discovery endpoint.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use campus_auth::config::DiscoveryConfig;
use campus_auth::{
    DiscoveryDocument, JwksKeyResolver, KeyPublisher, KeyStore, PemKeyPair, TokenIssuer,
    TokenVerifier, WELL_KNOWN_JWKS_PATH, generate_pem_pair,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Primary signing key pair, kid "1"
pub fn pem_pair() -> &'static PemKeyPair {
    static PAIR: OnceLock<PemKeyPair> = OnceLock::new();
    PAIR.get_or_init(|| generate_pem_pair(2048).unwrap())
}

/// Unrelated key pair, used to forge signatures
pub fn attacker_pem_pair() -> &'static PemKeyPair {
    static PAIR: OnceLock<PemKeyPair> = OnceLock::new();
    PAIR.get_or_init(|| generate_pem_pair(2048).unwrap())
}

/// Key store over [`pem_pair`] with kid `kid`
pub fn keys(kid: &str) -> Arc<KeyStore> {
    Arc::new(KeyStore::from_pem(kid, &pem_pair().private_pem, Some(&pem_pair().public_pem)).unwrap())
}

/// Key store over [`attacker_pem_pair`] with kid `kid`
pub fn attacker_keys(kid: &str) -> Arc<KeyStore> {
    Arc::new(KeyStore::from_pem(kid, &attacker_pem_pair().private_pem, None).unwrap())
}

/// Discovery document publishing `stores`
pub fn document(stores: &[&KeyStore]) -> DiscoveryDocument {
    let keys = stores
        .iter()
        .flat_map(|store| KeyPublisher::new(store).discovery_document().keys.clone())
        .collect();
    DiscoveryDocument { keys }
}

/// Resolver with default settings; loopback http is trusted
pub fn jwks_resolver() -> JwksKeyResolver {
    JwksKeyResolver::new(&DiscoveryConfig::default()).unwrap()
}

/// Verifier resolving keys over HTTP
pub fn jwks_verifier() -> TokenVerifier {
    TokenVerifier::new(Arc::new(jwks_resolver()))
}

/// Sign arbitrary claims with the primary private key under a hand-built header
pub fn sign_raw(header: Header, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(pem_pair().private_pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// RS256 header with the given references
pub fn rs256_header(kid: Option<&str>, jku: Option<&str>) -> Header {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    header.jku = jku.map(str::to_string);
    header
}

/// Unsigned token with an arbitrary header, for algorithm confusion tests
pub fn unsigned_token(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Unix time now
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A wiremock server playing a peer service's discovery endpoint
pub struct MockIssuer {
    pub server: MockServer,
    pub discovery_uri: String,
}

impl MockIssuer {
    /// Start an issuer with nothing mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let discovery_uri = format!("{}{}", server.uri(), WELL_KNOWN_JWKS_PATH);
        Self {
            server,
            discovery_uri,
        }
    }

    /// Start an issuer publishing `stores`
    pub async fn publishing(stores: &[&KeyStore]) -> Self {
        let issuer = Self::start().await;
        issuer.mount_document(&document(stores)).await;
        issuer
    }

    /// Serve `document` at the discovery path
    pub async fn mount_document(&self, document: &DiscoveryDocument) {
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    /// Token issuer stamping this server's discovery URI
    pub fn issuer(&self, keys: Arc<KeyStore>) -> TokenIssuer {
        TokenIssuer::new(keys, self.discovery_uri.clone())
    }
}
