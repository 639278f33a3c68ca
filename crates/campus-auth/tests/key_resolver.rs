//! Discovery fetching, caching and trust behavior of the HTTP key resolver

mod common;

use std::sync::Arc;
use std::time::Duration;

use campus_auth::config::DiscoveryConfig;
use campus_auth::{
    DiscoveryDocument, JwksKeyResolver, KeyResolutionError, KeyResolver, Role, RoleSet,
    TokenVerifier, TrustPolicy, WELL_KNOWN_JWKS_PATH,
};
use common::{MockIssuer, attacker_keys, document, jwks_resolver, keys};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_cache_serves_repeat_lookups() {
    let keys = keys("1");
    let issuer = MockIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(&[&keys])))
        .expect(1)
        .mount(&issuer.server)
        .await;

    let resolver = jwks_resolver();
    for _ in 0..5 {
        resolver.resolve(&issuer.discovery_uri, "1").await.unwrap();
    }
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let keys = keys("1");
    let issuer = MockIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(document(&[&keys]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&issuer.server)
        .await;

    let resolver = Arc::new(jwks_resolver());
    let lookups: Vec<_> = (0..8)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let uri = issuer.discovery_uri.clone();
            tokio::spawn(async move { resolver.resolve(&uri, "1").await })
        })
        .collect();
    for lookup in lookups {
        lookup.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_unknown_kid_refetches_exactly_once() {
    let keys = keys("1");
    let issuer = MockIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(&[&keys])))
        .expect(2)
        .mount(&issuer.server)
        .await;

    let error = jwks_resolver()
        .resolve(&issuer.discovery_uri, "2")
        .await
        .err()
        .unwrap();
    assert!(error.is_key_not_found());
}

#[tokio::test]
async fn test_rotated_key_found_on_refetch() {
    let old = keys("1");
    let new = attacker_keys("2");
    let issuer = MockIssuer::start().await;

    // First fetch predates the rotation, every later one includes the new key
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(&[&old])))
        .up_to_n_times(1)
        .mount(&issuer.server)
        .await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(&[&old, &new])))
        .mount(&issuer.server)
        .await;

    let verifier = TokenVerifier::new(Arc::new(jwks_resolver()));
    let token = issuer
        .issuer(new)
        .issue_for("P1", RoleSet::from(Role::Professor))
        .unwrap();
    let claims = verifier.verify(token.token.as_str()).await.unwrap();
    assert_eq!(claims.subject_id, "P1");
}

#[tokio::test]
async fn test_error_status_is_fetch_failure() {
    let issuer = MockIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&issuer.server)
        .await;

    let error = jwks_resolver()
        .resolve(&issuer.discovery_uri, "1")
        .await
        .err()
        .unwrap();
    assert!(matches!(error, KeyResolutionError::DiscoveryFetch { .. }));
}

#[tokio::test]
async fn test_invalid_document_is_fetch_failure() {
    let issuer = MockIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&issuer.server)
        .await;

    let error = jwks_resolver()
        .resolve(&issuer.discovery_uri, "1")
        .await
        .err()
        .unwrap();
    assert!(matches!(error, KeyResolutionError::DiscoveryFetch { .. }));
}

#[tokio::test]
async fn test_unusable_entry_is_fetch_failure() {
    let issuer = MockIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{"kty": "EC", "kid": "1", "crv": "P-256", "x": "AA", "y": "AA"}]
        })))
        .mount(&issuer.server)
        .await;

    let error = jwks_resolver()
        .resolve(&issuer.discovery_uri, "1")
        .await
        .err()
        .unwrap();
    assert!(matches!(error, KeyResolutionError::DiscoveryFetch { .. }));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let issuer = MockIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(DiscoveryDocument::default())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&issuer.server)
        .await;

    let config = DiscoveryConfig {
        fetch_timeout_ms: 200,
        ..DiscoveryConfig::default()
    };
    let resolver = JwksKeyResolver::new(&config).unwrap();
    let error = resolver
        .resolve(&issuer.discovery_uri, "1")
        .await
        .err()
        .unwrap();
    match error {
        KeyResolutionError::DiscoveryFetch { reason, .. } => assert_eq!(reason, "request timed out"),
        other => panic!("expected fetch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_redirects_not_followed() {
    let keys = keys("1");
    let issuer = MockIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/elsewhere.json"))
        .mount(&issuer.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(&[&keys])))
        .expect(0)
        .mount(&issuer.server)
        .await;

    let result = jwks_resolver().resolve(&issuer.discovery_uri, "1").await;
    assert!(matches!(result, Err(KeyResolutionError::DiscoveryFetch { .. })));
}

#[tokio::test]
async fn test_allow_list_blocks_before_fetch() {
    let keys = keys("1");
    let issuer = MockIssuer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(&[&keys])))
        .expect(0)
        .mount(&issuer.server)
        .await;

    let resolver = jwks_resolver()
        .with_policy(TrustPolicy::new().with_trusted_uris(["https://auth.campus.example/.well-known/jwks.json"]));
    let error = resolver
        .resolve(&issuer.discovery_uri, "1")
        .await
        .err()
        .unwrap();
    assert!(matches!(error, KeyResolutionError::UntrustedDiscoveryUri { .. }));
}

#[tokio::test]
async fn test_cache_is_per_discovery_uri() {
    let first_keys = keys("1");
    let second_keys = attacker_keys("1");
    let first = MockIssuer::publishing(&[&first_keys]).await;
    let second = MockIssuer::publishing(&[&second_keys]).await;

    let resolver = Arc::new(jwks_resolver());
    let verifier = TokenVerifier::new(resolver);

    // Same kid at two issuers must not collide in the cache
    let a = first.issuer(first_keys).issue_for("S1", RoleSet::from(Role::Student)).unwrap();
    let b = second.issuer(second_keys).issue_for("S2", RoleSet::from(Role::Student)).unwrap();
    assert_eq!(verifier.verify(a.token.as_str()).await.unwrap().subject_id, "S1");
    assert_eq!(verifier.verify(b.token.as_str()).await.unwrap().subject_id, "S2");
}
