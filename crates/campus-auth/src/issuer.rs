//! Token Issuer
//!
//! Signs claim sets with the service's private key. Every token header names
//! the signing key (`kid`) and where to fetch its public half (`jku`), so a
//! verifier that has never talked to this service can still check it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, Header, encode};
use tracing::{debug, info};

use crate::claims::{Claims, Role, RoleSet};
use crate::error::{AuthError, AuthResult};
use crate::keys::KeyStore;

/// Signed compact token
///
/// `Debug` is redacted; use [`Token::as_str`] to put it on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wrap a compact token string received from a caller
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Compact serialization
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the compact serialization
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// A freshly issued token together with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Signed token
    pub token: Token,
    /// Claims inside the token
    pub claims: Claims,
}

/// Issues RS256 tokens for one service
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyStore>,
    discovery_uri: String,
    user_ttl: Duration,
    service_ttl: Duration,
}

impl TokenIssuer {
    /// Default lifetime of tokens issued to people
    pub const DEFAULT_USER_TTL: Duration = Duration::from_secs(60 * 60);
    /// Default lifetime of service-identity tokens
    pub const DEFAULT_SERVICE_TTL: Duration = Duration::from_secs(5 * 60);

    /// Create an issuer publishing its key at `discovery_uri`
    pub fn new(keys: Arc<KeyStore>, discovery_uri: impl Into<String>) -> Self {
        Self {
            keys,
            discovery_uri: discovery_uri.into(),
            user_ttl: Self::DEFAULT_USER_TTL,
            service_ttl: Self::DEFAULT_SERVICE_TTL,
        }
    }

    /// Set the lifetime of tokens from [`TokenIssuer::issue_for`]
    #[must_use]
    pub fn with_user_ttl(mut self, ttl: Duration) -> Self {
        self.user_ttl = ttl;
        self
    }

    /// Set the lifetime of tokens from [`TokenIssuer::issue_service_token`]
    #[must_use]
    pub fn with_service_ttl(mut self, ttl: Duration) -> Self {
        self.service_ttl = ttl;
        self
    }

    /// Discovery URI embedded as `jku`
    pub fn discovery_uri(&self) -> &str {
        &self.discovery_uri
    }

    /// Key id embedded as `kid`
    pub fn key_id(&self) -> &str {
        self.keys.key_id()
    }

    /// Sign `claims` exactly as given
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if signing fails. No token is produced
    /// in that case.
    pub fn issue(&self, claims: &Claims) -> AuthResult<Token> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.key_id().to_string());
        header.jku = Some(self.discovery_uri.clone());

        let token = encode(&header, claims, self.keys.encoding_key())
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        debug!(
            subject = %claims.subject_id,
            roles = %claims.roles,
            kid = %self.keys.key_id(),
            exp = claims.exp,
            "Issued token"
        );
        Ok(Token(token))
    }

    /// Issue a token for `subject_id` with the user lifetime
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if signing fails.
    pub fn issue_for(
        &self,
        subject_id: impl Into<String>,
        roles: RoleSet,
    ) -> AuthResult<IssuedToken> {
        let claims = Claims::issued_now(subject_id, roles, self.user_ttl);
        let token = self.issue(&claims)?;
        info!(subject = %claims.subject_id, roles = %claims.roles, "Issued user token");
        Ok(IssuedToken { token, claims })
    }

    /// Issue a short-lived token identifying this service as `role`
    ///
    /// The subject is the role's wire name and the only granted role is `role`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if signing fails.
    pub fn issue_service_token(&self, role: &Role) -> AuthResult<Token> {
        let claims = Claims::issued_now(role.as_str(), RoleSet::from(role.clone()), self.service_ttl);
        self.issue(&claims)
    }
}
