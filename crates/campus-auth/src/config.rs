//! Configuration for keys, token lifetimes, discovery, rate limits and
//! inter-service calls
//!
//! Every section has serde defaults, so a service only has to state what
//! differs. Durations are plain integers with an explicit unit in the field
//! name, which keeps environment overrides readable
//! (`CAMPUS_AUTH__TOKENS__USER_TTL_SECS=21600`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Authentication settings for one service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Signing key location
    pub keys: KeyConfig,
    /// Token lifetimes and verification leeway
    pub tokens: TokenConfig,
    /// Discovery document resolution
    pub discovery: DiscoveryConfig,
    /// Per-subject rate limit for limited routes
    pub rate_limit: RateLimitConfig,
    /// Outbound inter-service calls
    pub client: ClientConfig,
}

/// Where the service's signing key lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Key identifier stamped into tokens as `kid`
    pub key_id: String,
    /// PKCS#8 or PKCS#1 private key PEM
    pub private_key_path: PathBuf,
    /// Optional public key PEM, checked against the private key
    pub public_key_path: Option<PathBuf>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            key_id: "1".to_string(),
            private_key_path: PathBuf::from("keys/private.pem"),
            public_key_path: None,
        }
    }
}

/// Token lifetimes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of tokens issued to people
    pub user_ttl_secs: u64,
    /// Lifetime of service-identity tokens
    pub service_ttl_secs: u64,
    /// Clock skew tolerated on `exp`
    pub leeway_secs: u64,
}

impl TokenConfig {
    /// User token lifetime
    pub fn user_ttl(&self) -> Duration {
        Duration::from_secs(self.user_ttl_secs)
    }

    /// Service token lifetime
    pub fn service_ttl(&self) -> Duration {
        Duration::from_secs(self.service_ttl_secs)
    }

    /// Verification leeway
    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.leeway_secs)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            user_ttl_secs: 60 * 60,
            service_ttl_secs: 5 * 60,
            leeway_secs: 0,
        }
    }
}

/// Discovery document resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How long a resolved key stays cached
    pub cache_ttl_secs: u64,
    /// Maximum number of cached keys
    pub cache_capacity: u64,
    /// Timeout for one discovery fetch
    pub fetch_timeout_ms: u64,
    /// When non-empty, the only discovery URIs accepted
    pub trusted_uris: Vec<String>,
    /// Accept plain http for non-loopback hosts
    pub allow_insecure_http: bool,
}

impl DiscoveryConfig {
    /// Cache TTL
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Fetch timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 600,
            cache_capacity: 1_000,
            fetch_timeout_ms: 5_000,
            trusted_uris: Vec::new(),
            allow_insecure_http: false,
        }
    }
}

/// Fixed-window rate limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length
    pub window_ms: u64,
    /// Requests allowed per subject per window
    pub max_requests: u32,
}

impl RateLimitConfig {
    /// Window length
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 10,
        }
    }
}

/// Outbound inter-service calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout for one upstream call
    pub timeout_ms: u64,
}

impl ClientConfig {
    /// Upstream call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.keys.key_id, "1");
        assert_eq!(config.tokens.user_ttl(), Duration::from_secs(3600));
        assert_eq!(config.tokens.leeway(), Duration::ZERO);
        assert_eq!(config.discovery.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.max_requests, 10);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: AuthConfig = serde_json::from_value(serde_json::json!({
            "tokens": {"user_ttl_secs": 21600},
            "discovery": {"trusted_uris": ["https://auth.campus.example/.well-known/jwks.json"]}
        }))
        .unwrap();
        assert_eq!(config.tokens.user_ttl_secs, 21600);
        assert_eq!(config.tokens.service_ttl_secs, 300);
        assert_eq!(config.discovery.trusted_uris.len(), 1);
        assert_eq!(config.discovery.cache_capacity, 1_000);
        assert_eq!(config.client, ClientConfig::default());
    }
}
