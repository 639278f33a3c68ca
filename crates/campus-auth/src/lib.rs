//! # Campus Auth - Self-Issued Token Authentication
//!
//! Each service signs its own RS256 tokens and publishes the matching public
//! key at a well-known discovery URI. Any other service verifies those tokens
//! by following the token's `jku` header to that document, without shared
//! secrets or a central identity provider.
//!
//! ## Architecture
//!
//! - [`keys`] - RSA signing key loading and generation
//! - [`issuer`] - Signs claims into tokens carrying `kid` and `jku`
//! - [`jwks`] - The public discovery document a service serves
//! - [`resolver`] - Cached discovery-URI + key-id lookup with a trust policy
//! - [`verifier`] - The verification sequence: header, algorithm, key, signature, expiry
//! - [`guard`] - Role and ownership decisions
//! - [`rate_limit`] - Per-subject fixed-window limiting
//! - [`client`] - Calls to peer services under a service identity
//! - [`middleware`] - Tower layers wiring the above into axum routes
//! - [`config`] - Serde configuration for all of the above
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use campus_auth::{
//!     KeyPublisher, KeyStore, LocalKeyResolver, Role, RoleSet, TokenIssuer, TokenVerifier,
//!     discovery_uri,
//! };
//!
//! # tokio_test::block_on(async {
//! let keys = Arc::new(KeyStore::generate("1", 2048).unwrap());
//! let uri = discovery_uri("http://localhost:5001");
//! let issuer = TokenIssuer::new(Arc::clone(&keys), uri.clone());
//!
//! let resolver = LocalKeyResolver::new().with_publisher(uri, &KeyPublisher::new(&keys));
//! let verifier = TokenVerifier::new(Arc::new(resolver));
//!
//! let issued = issuer.issue_for("S1", RoleSet::from(Role::Student)).unwrap();
//! let claims = verifier.verify(issued.token.as_str()).await.unwrap();
//! assert_eq!(claims.subject_id, "S1");
//! assert!(claims.has_role(&Role::Student));
//! # });
//! ```

pub mod claims;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod issuer;
pub mod jwks;
pub mod keys;
pub mod middleware;
pub mod rate_limit;
pub mod resolver;
pub mod verifier;

#[doc(inline)]
pub use claims::{Claims, Role, RoleSet};
#[doc(inline)]
pub use client::{CORRELATION_ID_HEADER, InterServiceClient};
#[doc(inline)]
pub use config::AuthConfig;
#[doc(inline)]
pub use error::{AuthError, AuthResult, KeyResolutionError, KeyStoreError};
#[doc(inline)]
pub use guard::{check_ownership, check_roles, extract_bearer_token};
#[doc(inline)]
pub use issuer::{IssuedToken, Token, TokenIssuer};
#[doc(inline)]
pub use jwks::{DiscoveryDocument, Jwk, KeyPublisher, WELL_KNOWN_JWKS_PATH, discovery_uri};
#[doc(inline)]
pub use keys::{KeyStore, PemKeyPair, generate_pem_pair};
#[doc(inline)]
pub use rate_limit::{InMemoryRateLimitStore, RateLimitStore, RateLimiter};
#[doc(inline)]
pub use resolver::{JwksKeyResolver, KeyResolver, LocalKeyResolver, TrustPolicy};
#[doc(inline)]
pub use verifier::TokenVerifier;
