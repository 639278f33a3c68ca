//! Token Verifier
//!
//! Verification is a fixed sequence of checks over one token. Each step
//! either passes or ends verification with its own error; nothing is
//! downgraded or retried here.
//!
//! 1. Decode the header without trusting it ([`AuthError::MalformedToken`])
//! 2. Require `alg` to be exactly `RS256` ([`AuthError::UnsupportedAlgorithm`]).
//!    This happens before any key is looked up, so `none` and HMAC tokens
//!    never reach key resolution.
//! 3. Require `kid` and `jku` ([`AuthError::MissingKeyReference`])
//! 4. Resolve the key through the [`KeyResolver`] ([`AuthError::KeyResolution`])
//! 5. Check signature and expiry ([`AuthError::InvalidSignature`],
//!    [`AuthError::TokenExpired`])

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::jwks::SIGNING_ALGORITHM;
use crate::resolver::KeyResolver;

/// Token header fields the verifier looks at, decoded without verification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm, kept as the raw string
    pub alg: String,
    /// Key identifier
    #[serde(default)]
    pub kid: Option<String>,
    /// Discovery URI
    #[serde(default)]
    pub jku: Option<String>,
}

/// Decode a token's header without checking anything else
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] unless the token has three
/// dot-separated segments and the first is base64url-encoded JSON with an
/// `alg` string.
pub fn decode_unverified_header(token: &str) -> AuthResult<TokenHeader> {
    let mut segments = token.split('.');
    let (Some(header), Some(_), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| AuthError::MalformedToken(format!("header is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("header is not valid JSON: {e}")))
}

/// Verifies tokens issued by any service whose discovery document it can reach
#[derive(Clone)]
pub struct TokenVerifier {
    resolver: Arc<dyn KeyResolver>,
    leeway: Duration,
}

impl TokenVerifier {
    /// Create a verifier with no clock-skew leeway
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver,
            leeway: Duration::ZERO,
        }
    }

    /// Tolerate `leeway` of clock skew on `exp`
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Verify `token` and return the claims it carries
    ///
    /// # Errors
    ///
    /// Returns the error of the first step that fails; see the module docs.
    pub async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let header = decode_unverified_header(token)?;

        if header.alg != SIGNING_ALGORITHM {
            warn!(algorithm = %header.alg, "Rejected token with unsupported algorithm");
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthError::MissingKeyReference("kid"))?;
        let jku = header
            .jku
            .filter(|jku| !jku.is_empty())
            .ok_or(AuthError::MissingKeyReference("jku"))?;

        let decoding_key = self.resolver.resolve(&jku, &kid).await.inspect_err(|e| {
            warn!(discovery_uri = %jku, kid = %kid, error = %e, "Could not resolve token signing key");
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway.as_secs();
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            let error = match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::MissingRequiredClaim(_) => AuthError::MalformedToken(e.to_string()),
                _ => AuthError::InvalidSignature,
            };
            warn!(discovery_uri = %jku, kid = %kid, error = %e, "Token verification failed");
            error
        })?;

        debug!(
            subject = %data.claims.subject_id,
            roles = %data.claims.roles,
            discovery_uri = %jku,
            "Token verified"
        );
        Ok(data.claims)
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("resolver", &"<dyn KeyResolver>")
            .field("leeway", &self.leeway)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::LocalKeyResolver;

    fn encode_header(value: serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(Arc::new(LocalKeyResolver::new()))
    }

    #[test]
    fn test_header_requires_three_segments() {
        assert!(matches!(
            decode_unverified_header("abc.def"),
            Err(AuthError::MalformedToken(_))
        ));
        assert!(matches!(
            decode_unverified_header("a.b.c.d"),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_header_keeps_raw_algorithm() {
        let token = format!(
            "{}.e30.",
            encode_header(serde_json::json!({"alg": "none", "kid": "1"}))
        );
        let header = decode_unverified_header(&token).unwrap();
        assert_eq!(header.alg, "none");
        assert_eq!(header.kid.as_deref(), Some("1"));
        assert_eq!(header.jku, None);
    }

    #[tokio::test]
    async fn test_none_algorithm_rejected_before_key_lookup() {
        let token = format!(
            "{}.e30.",
            encode_header(serde_json::json!({"alg": "none"}))
        );
        let error = verifier().verify(&token).await.unwrap_err();
        assert!(matches!(error, AuthError::UnsupportedAlgorithm(alg) if alg == "none"));
    }

    #[tokio::test]
    async fn test_missing_kid_reported() {
        let token = format!(
            "{}.e30.sig",
            encode_header(serde_json::json!({"alg": "RS256", "jku": "https://a/jwks.json"}))
        );
        let error = verifier().verify(&token).await.unwrap_err();
        assert!(matches!(error, AuthError::MissingKeyReference("kid")));
    }

    #[tokio::test]
    async fn test_missing_jku_reported() {
        let token = format!(
            "{}.e30.sig",
            encode_header(serde_json::json!({"alg": "RS256", "kid": "1"}))
        );
        let error = verifier().verify(&token).await.unwrap_err();
        assert!(matches!(error, AuthError::MissingKeyReference("jku")));
    }

    #[tokio::test]
    async fn test_unknown_issuer_is_key_resolution_error() {
        let token = format!(
            "{}.e30.sig",
            encode_header(serde_json::json!({"alg": "RS256", "kid": "1", "jku": "https://a/jwks.json"}))
        );
        let error = verifier().verify(&token).await.unwrap_err();
        assert!(matches!(error, AuthError::KeyResolution(_)));
    }
}
