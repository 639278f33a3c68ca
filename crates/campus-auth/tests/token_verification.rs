//! End-to-end token verification against a live discovery endpoint

mod common;

use std::time::Duration;

use campus_auth::{AuthError, Claims, KeyResolutionError, Role, RoleSet};
use common::{MockIssuer, attacker_keys, jwks_verifier, keys, now, rs256_header, sign_raw, unsigned_token};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_issued_token_round_trips_through_discovery() {
    let keys = keys("1");
    let issuer_server = MockIssuer::publishing(&[&keys]).await;
    let issuer = issuer_server.issuer(keys);

    let issued = issuer
        .issue_for("S1", RoleSet::from([Role::Student]))
        .unwrap();
    let claims = jwks_verifier().verify(issued.token.as_str()).await.unwrap();

    assert_eq!(claims, issued.claims);
    assert!(claims.has_role(&Role::Student));
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let keys = keys("1");
    let issuer_server = MockIssuer::publishing(&[&keys]).await;
    let token = sign_raw(
        rs256_header(Some("1"), Some(&issuer_server.discovery_uri)),
        &json!({"id": "S1", "roles": ["STUDENT"], "iat": now() - 7200, "exp": now() - 3600}),
    );

    let error = jwks_verifier().verify(&token).await.unwrap_err();
    assert!(matches!(error, AuthError::TokenExpired));
}

#[tokio::test]
async fn test_leeway_tolerates_small_skew() {
    let keys = keys("1");
    let issuer_server = MockIssuer::publishing(&[&keys]).await;
    let token = sign_raw(
        rs256_header(Some("1"), Some(&issuer_server.discovery_uri)),
        &json!({"id": "S1", "roles": ["STUDENT"], "iat": now() - 60, "exp": now() - 5}),
    );

    let strict = jwks_verifier();
    assert!(matches!(strict.verify(&token).await, Err(AuthError::TokenExpired)));

    let lenient = jwks_verifier().with_leeway(Duration::from_secs(60));
    assert!(lenient.verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_signature_from_other_key_rejected() {
    // The attacker signs with their own key but points at the real issuer
    let real = keys("1");
    let issuer_server = MockIssuer::publishing(&[&real]).await;
    let forged = issuer_server.issuer(attacker_keys("1"));

    let token = forged.issue_for("A1", RoleSet::from(Role::Admin)).unwrap();
    let error = jwks_verifier().verify(token.token.as_str()).await.unwrap_err();
    assert!(matches!(error, AuthError::InvalidSignature));
}

#[tokio::test]
async fn test_tampered_payload_rejected() {
    let keys = keys("1");
    let issuer_server = MockIssuer::publishing(&[&keys]).await;
    let issued = issuer_server
        .issuer(keys)
        .issue_for("S1", RoleSet::from(Role::Student))
        .unwrap();

    let segments: Vec<&str> = issued.token.as_str().split('.').collect();
    let escalated = unsigned_token(
        &json!({}),
        &json!({"id": "S1", "roles": ["ADMIN"], "iat": now(), "exp": now() + 3600}),
    );
    let escalated_payload = escalated.split('.').nth(1).unwrap();
    let tampered = format!("{}.{}.{}", segments[0], escalated_payload, segments[2]);

    let error = jwks_verifier().verify(&tampered).await.unwrap_err();
    assert!(matches!(error, AuthError::InvalidSignature));
}

#[tokio::test]
async fn test_unsupported_algorithms_never_fetch_keys() {
    let issuer_server = MockIssuer::start().await;
    let verifier = jwks_verifier();
    let claims = json!({"id": "A1", "roles": ["ADMIN"], "exp": now() + 3600});

    for alg in ["none", "HS256", "RS512", "ES256"] {
        let token = unsigned_token(
            &json!({"alg": alg, "typ": "JWT", "kid": "1", "jku": issuer_server.discovery_uri}),
            &claims,
        );
        let error = verifier.verify(&token).await.unwrap_err();
        assert!(
            matches!(&error, AuthError::UnsupportedAlgorithm(a) if a == alg),
            "{alg}: {error:?}"
        );
    }

    let requests = issuer_server.server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_unknown_kid_is_key_resolution_failure() {
    let keys = keys("1");
    let issuer_server = MockIssuer::publishing(&[&keys]).await;
    let token = sign_raw(
        rs256_header(Some("9"), Some(&issuer_server.discovery_uri)),
        &json!({"id": "S1", "roles": ["STUDENT"], "exp": now() + 3600}),
    );

    let error = jwks_verifier().verify(&token).await.unwrap_err();
    assert!(matches!(
        error,
        AuthError::KeyResolution(KeyResolutionError::KeyNotFound { ref kid, .. }) if kid == "9"
    ));
    assert_eq!(error.status_code(), http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unreachable_discovery_is_key_resolution_failure() {
    let token = sign_raw(
        rs256_header(Some("1"), Some("http://127.0.0.1:9/.well-known/jwks.json")),
        &json!({"id": "S1", "roles": ["STUDENT"], "exp": now() + 3600}),
    );

    let error = jwks_verifier().verify(&token).await.unwrap_err();
    assert!(matches!(
        error,
        AuthError::KeyResolution(KeyResolutionError::DiscoveryFetch { .. })
    ));
}

#[tokio::test]
async fn test_foreign_claim_shapes_normalized() {
    let keys = keys("1");
    let issuer_server = MockIssuer::publishing(&[&keys]).await;
    let verifier = jwks_verifier();
    let header = || rs256_header(Some("1"), Some(&issuer_server.discovery_uri));

    let single = sign_raw(header(), &json!({"sub": "P1", "role": "PROFESSOR", "exp": now() + 60}));
    let claims: Claims = verifier.verify(&single).await.unwrap();
    assert_eq!(claims.subject_id, "P1");
    assert_eq!(claims.roles, RoleSet::from(Role::Professor));

    let camel = sign_raw(
        header(),
        &json!({"subjectId": "A1", "roles": ["ADMIN", "PROFESSOR"], "exp": now() + 60}),
    );
    let claims = verifier.verify(&camel).await.unwrap();
    assert_eq!(claims.subject_id, "A1");
    assert_eq!(claims.roles, RoleSet::from([Role::Admin, Role::Professor]));
}

#[tokio::test]
async fn test_missing_expiry_is_malformed() {
    let keys = keys("1");
    let issuer_server = MockIssuer::publishing(&[&keys]).await;
    let token = sign_raw(
        rs256_header(Some("1"), Some(&issuer_server.discovery_uri)),
        &json!({"id": "S1", "roles": ["STUDENT"]}),
    );

    let error = jwks_verifier().verify(&token).await.unwrap_err();
    assert!(matches!(error, AuthError::MalformedToken(_)), "{error:?}");
}

#[tokio::test]
async fn test_service_token_identity() {
    let keys = keys("1");
    let issuer_server = MockIssuer::publishing(&[&keys]).await;
    let token = issuer_server
        .issuer(keys)
        .issue_service_token(&Role::EnrollmentService)
        .unwrap();

    let claims = jwks_verifier().verify(token.as_str()).await.unwrap();
    assert_eq!(claims.subject_id, "ENROLLMENT_SERVICE");
    assert_eq!(claims.roles, RoleSet::from(Role::EnrollmentService));
    assert!(claims.exp - claims.iat <= 300);
}

#[tokio::test]
async fn test_service_token_accepted_by_guard_at_another_service() {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::routing::get;
    use axum::{Extension, Router};
    use campus_auth::WELL_KNOWN_JWKS_PATH;
    use campus_auth::middleware::authorize;
    use http::{Request, StatusCode, header};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    // Service A publishes its key; the token is shaped the way A's peers write it
    let keys = keys("svc-a-1");
    let service_a = MockIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(WELL_KNOWN_JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::document(&[&keys])))
        .expect(1)
        .mount(&service_a.server)
        .await;
    let token = sign_raw(
        rs256_header(Some("svc-a-1"), Some(&service_a.discovery_uri)),
        &json!({"subjectId": "svc-A", "role": ["AUTH_SERVICE"], "iat": now(), "exp": now() + 300}),
    );

    // Service B guards its collection with its own verifier
    let service_b = Router::new().route(
        "/students",
        get(|Extension(claims): Extension<Claims>| async move { claims.subject_id })
            .route_layer(authorize(Arc::new(jwks_verifier()), [Role::Admin, Role::AuthService])),
    );

    for _ in 0..2 {
        let response = service_b
            .clone()
            .oneshot(
                Request::get("/students")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"svc-A");
    }
}
