//! Error taxonomy for token issuance, verification and request authorization
//!
//! Every verification-path error is terminal for the request that raised it.
//! [`AuthError::status_code`] and [`AuthError::public_message`] give the HTTP
//! translation; the `Display` text is meant for logs and may carry more detail
//! than a caller should see. No variant ever carries private key material.

use std::path::PathBuf;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Result alias used throughout the crate
pub type AuthResult<T> = Result<T, AuthError>;

/// Stable message for a request without a bearer credential
pub const MISSING_TOKEN_MESSAGE: &str = "Authorization token is missing";
/// Stable message for every token that fails verification
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";
/// Stable message for a verified subject lacking every accepted role
pub const INSUFFICIENT_ROLE_MESSAGE: &str = "Access forbidden: Insufficient role";
/// Stable message for an ownership violation
pub const FORBIDDEN_MESSAGE: &str = "Access forbidden: You can only access your own data";
/// Stable message for a rate-limited subject
pub const RATE_LIMITED_MESSAGE: &str = "You crossed the rate limit. Please try again later.";
/// Stable message for upstream call failures
pub const UPSTREAM_MESSAGE: &str = "Upstream service request failed";
/// Stable message for anything else
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// Failures while resolving a verification key from a discovery document
///
/// Fields are plain strings so one load result can be shared by every
/// request waiting on the same cache entry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyResolutionError {
    /// The document was fetched but holds no entry for the key id
    #[error("no key with kid '{kid}' in discovery document at {discovery_uri}")]
    KeyNotFound {
        /// Discovery URI the document came from
        discovery_uri: String,
        /// Key id that was looked up
        kid: String,
    },

    /// The document could not be fetched or parsed
    #[error("failed to fetch discovery document from {discovery_uri}: {reason}")]
    DiscoveryFetch {
        /// Discovery URI that failed
        discovery_uri: String,
        /// What went wrong
        reason: String,
    },

    /// The discovery URI was refused by the resolver's trust policy
    #[error("discovery URI {discovery_uri} is not trusted: {reason}")]
    UntrustedDiscoveryUri {
        /// Discovery URI that was refused
        discovery_uri: String,
        /// Which rule refused it
        reason: String,
    },
}

impl KeyResolutionError {
    /// Create a fetch error
    pub fn fetch(discovery_uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DiscoveryFetch {
            discovery_uri: discovery_uri.into(),
            reason: reason.into(),
        }
    }

    /// Create a key-not-found error
    pub fn not_found(discovery_uri: impl Into<String>, kid: impl Into<String>) -> Self {
        Self::KeyNotFound {
            discovery_uri: discovery_uri.into(),
            kid: kid.into(),
        }
    }

    /// Create an untrusted-URI error
    pub fn untrusted(discovery_uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UntrustedDiscoveryUri {
            discovery_uri: discovery_uri.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is a [`KeyResolutionError::KeyNotFound`]
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }
}

/// Errors raised while issuing, verifying or enforcing tokens
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Token is not a structurally valid compact JWT
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Token header names an algorithm other than the one trusted algorithm
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Token header lacks `kid` or `jku`
    #[error("token header is missing '{0}'")]
    MissingKeyReference(&'static str),

    /// The signing key named by the token could not be resolved
    #[error("signing key could not be resolved: {0}")]
    KeyResolution(#[from] KeyResolutionError),

    /// Signature does not verify against the resolved key
    #[error("token signature is invalid")]
    InvalidSignature,

    /// Token `exp` is in the past
    #[error("token has expired")]
    TokenExpired,

    /// Request carried no bearer credential
    #[error("authorization token is missing")]
    MissingCredentials,

    /// Verified subject holds none of the accepted roles
    #[error("subject '{subject_id}' holds none of the required roles")]
    InsufficientRole {
        /// Verified subject id
        subject_id: String,
    },

    /// Restricted subject tried to reach a resource it does not own
    #[error("subject '{subject_id}' may not access resource '{resource_id}'")]
    AccessForbidden {
        /// Verified subject id
        subject_id: String,
        /// Owner id taken from the request path
        resource_id: String,
    },

    /// Subject exceeded its request budget for the current window
    #[error("rate limit exceeded for subject '{subject_id}'")]
    RateLimitExceeded {
        /// Limited subject id
        subject_id: String,
        /// Time until the window resets
        retry_after: Duration,
    },

    /// Token could not be signed
    #[error("failed to sign token: {0}")]
    Signing(String),

    /// Upstream service could not be reached or timed out
    #[error("upstream {endpoint} unavailable: {reason}")]
    UpstreamUnavailable {
        /// Endpoint that was called
        endpoint: String,
        /// Transport failure description
        reason: String,
    },

    /// Upstream service answered with a non-success status
    #[error("upstream {endpoint} rejected the request with status {status}")]
    UpstreamRejected {
        /// Endpoint that was called
        endpoint: String,
        /// Status the upstream returned
        status: StatusCode,
    },

    /// Upstream service answered with a body that could not be decoded
    #[error("upstream {endpoint} returned an unreadable body: {reason}")]
    UpstreamInvalidResponse {
        /// Endpoint that was called
        endpoint: String,
        /// Decode failure description
        reason: String,
    },
}

impl AuthError {
    /// HTTP status this error translates to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedToken(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::MissingKeyReference(_)
            | Self::KeyResolution(_)
            | Self::InvalidSignature
            | Self::TokenExpired
            | Self::MissingCredentials => StatusCode::UNAUTHORIZED,
            Self::InsufficientRole { .. } | Self::AccessForbidden { .. } => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable { .. }
            | Self::UpstreamRejected { .. }
            | Self::UpstreamInvalidResponse { .. } => StatusCode::BAD_GATEWAY,
            Self::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable, caller-facing message
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingCredentials => MISSING_TOKEN_MESSAGE,
            Self::MalformedToken(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::MissingKeyReference(_)
            | Self::KeyResolution(_)
            | Self::InvalidSignature
            | Self::TokenExpired => INVALID_TOKEN_MESSAGE,
            Self::InsufficientRole { .. } => INSUFFICIENT_ROLE_MESSAGE,
            Self::AccessForbidden { .. } => FORBIDDEN_MESSAGE,
            Self::RateLimitExceeded { .. } => RATE_LIMITED_MESSAGE,
            Self::UpstreamUnavailable { .. }
            | Self::UpstreamRejected { .. }
            | Self::UpstreamInvalidResponse { .. } => UPSTREAM_MESSAGE,
            Self::Signing(_) => INTERNAL_MESSAGE,
        }
    }

    /// Whether the error came out of token verification
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_)
                | Self::UnsupportedAlgorithm(_)
                | Self::MissingKeyReference(_)
                | Self::KeyResolution(_)
                | Self::InvalidSignature
                | Self::TokenExpired
        )
    }
}

/// Errors raised while loading or generating signing keys
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyStoreError {
    /// A key file could not be read
    #[error("failed to read key file {path}: {source}")]
    Io {
        /// Path of the key file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Private key PEM is neither PKCS#8 nor PKCS#1 RSA
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Public key PEM is neither SPKI nor PKCS#1 RSA
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Configured public key does not belong to the private key
    #[error("public key does not match private key")]
    KeyMismatch,

    /// Key id is empty
    #[error("key id must not be empty")]
    EmptyKeyId,

    /// Key generation or encoding failed
    #[error("key generation failed: {0}")]
    Generation(String),
}
