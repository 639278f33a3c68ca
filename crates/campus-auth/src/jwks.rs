//! Key Publisher: the service's discovery document
//!
//! Every service publishes its verification key(s) at
//! [`WELL_KNOWN_JWKS_PATH`], relative to its public base URL. That document
//! is the trust anchor other services bootstrap from, so it is the one route
//! served without authentication. It carries only public RSA parameters.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::DecodingKey;
use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};

use crate::keys::KeyStore;

/// Path of the discovery document below a service's base URL
pub const WELL_KNOWN_JWKS_PATH: &str = "/.well-known/jwks.json";

/// Algorithm every published key is used with
pub const SIGNING_ALGORITHM: &str = "RS256";

/// Derive the discovery URI for a service's public base URL
///
/// ```
/// use campus_auth::jwks::discovery_uri;
///
/// assert_eq!(
///     discovery_uri("https://auth.campus.example/"),
///     "https://auth.campus.example/.well-known/jwks.json"
/// );
/// ```
pub fn discovery_uri(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), WELL_KNOWN_JWKS_PATH)
}

/// One public key entry of a discovery document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always `RSA` for keys this crate publishes
    pub kty: String,

    /// Key identifier tokens reference in their `kid` header
    pub kid: String,

    /// Public key use
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Algorithm the key is used with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// RSA modulus, base64url without padding
    #[serde(default)]
    pub n: String,

    /// RSA public exponent, base64url without padding
    #[serde(default)]
    pub e: String,
}

impl Jwk {
    /// Describe an RSA public key as a signing JWK
    pub fn from_rsa_public_key(kid: impl Into<String>, key: &RsaPublicKey) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid: kid.into(),
            key_use: Some("sig".to_string()),
            alg: Some(SIGNING_ALGORITHM.to_string()),
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }
    }

    /// Convert to a verification key
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the entry is not an RSA
    /// signing key for RS256 or its parameters do not decode.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, String> {
        if self.kty != "RSA" {
            return Err(format!("unsupported key type '{}'", self.kty));
        }
        if let Some(alg) = self.alg.as_deref()
            && alg != SIGNING_ALGORITHM
        {
            return Err(format!("key is published for algorithm '{alg}'"));
        }
        if let Some(key_use) = self.key_use.as_deref()
            && key_use != "sig"
        {
            return Err(format!("key is published for use '{key_use}'"));
        }
        if self.n.is_empty() || self.e.is_empty() {
            return Err("RSA key is missing 'n' or 'e'".to_string());
        }
        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|e| format!("invalid RSA key parameters: {e}"))
    }
}

/// Discovery document: a set of public keys addressed by `kid`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Published keys
    pub keys: Vec<Jwk>,
}

impl DiscoveryDocument {
    /// Find the entry for a key id
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|jwk| jwk.kid == kid)
    }
}

/// Publishes the discovery document for a [`KeyStore`]
#[derive(Debug, Clone)]
pub struct KeyPublisher {
    document: Arc<DiscoveryDocument>,
}

impl KeyPublisher {
    /// Build the publisher for a loaded key store
    pub fn new(keys: &KeyStore) -> Self {
        let document = DiscoveryDocument {
            keys: vec![Jwk::from_rsa_public_key(keys.key_id(), keys.public_key())],
        };
        Self {
            document: Arc::new(document),
        }
    }

    /// The document to serve; infallible once keys are loaded
    pub fn discovery_document(&self) -> Arc<DiscoveryDocument> {
        Arc::clone(&self.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// RSA JWK from RFC 7517 Example A.1
    fn rfc_jwk() -> Jwk {
        serde_json::from_value(json!({
            "kty": "RSA",
            "kid": "2011-04-29",
            "alg": "RS256",
            "use": "sig",
            "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
            "e": "AQAB"
        }))
        .unwrap()
    }

    #[test]
    fn test_discovery_uri_trims_trailing_slash() {
        assert_eq!(
            discovery_uri("http://localhost:5001"),
            "http://localhost:5001/.well-known/jwks.json"
        );
        assert_eq!(
            discovery_uri("http://localhost:5001/"),
            "http://localhost:5001/.well-known/jwks.json"
        );
    }

    #[test]
    fn test_rfc_jwk_converts() {
        assert!(rfc_jwk().to_decoding_key().is_ok());
    }

    #[test]
    fn test_symmetric_jwk_rejected() {
        let mut jwk = rfc_jwk();
        jwk.kty = "oct".to_string();
        let error = jwk.to_decoding_key().err().unwrap();
        assert!(error.contains("oct"));
    }

    #[test]
    fn test_jwk_for_other_algorithm_rejected() {
        let mut jwk = rfc_jwk();
        jwk.alg = Some("RS512".to_string());
        assert!(jwk.to_decoding_key().is_err());
    }

    #[test]
    fn test_jwk_missing_modulus_rejected() {
        let jwk: Jwk = serde_json::from_value(json!({"kty": "RSA", "kid": "1"})).unwrap();
        assert!(jwk.to_decoding_key().is_err());
    }

    #[test]
    fn test_document_tolerates_unknown_fields() {
        let doc: DiscoveryDocument = serde_json::from_value(json!({
            "keys": [{
                "kty": "RSA", "kid": "1", "n": "AQAB", "e": "AQAB", "x5t": "ignored"
            }],
            "issuer": "ignored"
        }))
        .unwrap();
        assert!(doc.find("1").is_some());
        assert!(doc.find("2").is_none());
    }

    #[test]
    fn test_published_entry_shape() {
        let serialized = serde_json::to_value(DiscoveryDocument {
            keys: vec![rfc_jwk()],
        })
        .unwrap();
        let entry = &serialized["keys"][0];
        assert_eq!(entry["kty"], "RSA");
        assert_eq!(entry["use"], "sig");
        assert_eq!(entry["alg"], "RS256");
        let fields: Vec<&String> = entry.as_object().unwrap().keys().collect();
        assert_eq!(fields, ["kty", "kid", "use", "alg", "n", "e"]);
    }
}
