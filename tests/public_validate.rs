//! Tests for the POST /api/product-license/validate endpoint.
//!
//! Customer installations of sold products call this endpoint with their
//! license key and validation token. The checks run in a fixed order (rate
//! limits, token, key lookup, token hash, active, expiry, domain) and every
//! failure returns `{"isValid": false, "errorMessage": ...}`.

use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::*;

const VALIDATE_URI: &str = "/api/product-license/validate";

/// Build a validate request with the given body, token and source IP
fn validate_request(
    body: &Value,
    token: Option<&str>,
    source_ip: Option<&str>,
) -> Request<axum::body::Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(VALIDATE_URI)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    if let Some(ip) = source_ip {
        builder = builder.header("x-forwarded-for", ip);
    }
    builder
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_validate_with_correct_token_returns_license() {
    let state = create_test_app_state();
    let (_license, license_key, token) =
        create_test_product_license(&state, Some("booking.fjellsikring.no"), Some(future_timestamp(90)));
    let app = test_app(state);

    let body = json!({"licenseKey": license_key, "domain": "booking.fjellsikring.no"});
    let response = app
        .oneshot(validate_request(&body, Some(&token), Some("10.0.0.1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["isValid"], true);
    assert_eq!(json["customerName"], "Fjellsikring AS");
    assert_eq!(json["productName"], "KKS Booking");
    assert_eq!(json["customerDomain"], "booking.fjellsikring.no");
    assert!(json["expiresAt"].is_string());
    // Stored feature flags with the usage limits merged in
    assert_eq!(json["features"]["booking"], true);
    assert_eq!(json["features"]["reports"], false);
    assert_eq!(json["features"]["maxUsers"], 25);
    assert_eq!(json["features"]["maxBookingsPerMonth"], 500);
}

#[tokio::test]
async fn test_validate_success_records_activation() {
    let state = create_test_app_state();
    let (license, license_key, token) = create_test_product_license(&state, None, None);
    let app = test_app(state.clone());

    let body = json!({"licenseKey": license_key});
    let response = app
        .oneshot(validate_request(&body, Some(&token), Some("10.0.0.1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    // Perpetual license: no expiry in the response
    assert_eq!(json["isValid"], true);
    assert!(json.get("expiresAt").is_none() || json["expiresAt"].is_null());

    let conn = state.db.get().unwrap();
    let stored = queries::get_product_license_by_id(&conn, &license.id)
        .unwrap()
        .unwrap();
    assert!(stored.activated_at.is_some());

    let (records, total) = queries::list_validation_records(&conn, &license.id, 10, 0).unwrap();
    assert_eq!(total, 1);
    assert!(records[0].success);
    assert_eq!(records[0].source_ip.as_deref(), Some("10.0.0.1"));
}

#[tokio::test]
async fn test_validate_unknown_key_returns_404() {
    let state = create_test_app_state();
    let app = test_app(state);

    let body = json!({"licenseKey": "KKSP-XXXX-XXXX-XXXX"});
    let response = app
        .oneshot(validate_request(&body, Some("some-token"), Some("10.0.0.1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["isValid"], false);
    assert_eq!(json["errorMessage"], "License not found");
}

#[tokio::test]
async fn test_validate_wrong_token_returns_401_and_is_recorded() {
    let state = create_test_app_state();
    let (license, license_key, _token) = create_test_product_license(&state, None, None);
    let app = test_app(state.clone());

    let body = json!({"licenseKey": license_key});
    let response = app
        .oneshot(validate_request(&body, Some("wrong-token"), Some("10.0.0.1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["isValid"], false);
    assert_eq!(json["errorMessage"], "Invalid validation token");

    // The failed attempt is persisted against the license
    let conn = state.db.get().unwrap();
    let (records, total) = queries::list_validation_records(&conn, &license.id, 10, 0).unwrap();
    assert_eq!(total, 1);
    assert!(!records[0].success);
    assert_eq!(records[0].failure_reason.as_deref(), Some("Invalid validation token"));
}

#[tokio::test]
async fn test_validate_missing_token_returns_401() {
    let state = create_test_app_state();
    let (_license, license_key, _token) = create_test_product_license(&state, None, None);
    let app = test_app(state);

    let body = json!({"licenseKey": license_key});
    let response = app
        .oneshot(validate_request(&body, None, Some("10.0.0.1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["errorMessage"], "Validation token is required");
}

#[tokio::test]
async fn test_validate_inactive_license_returns_403() {
    let state = create_test_app_state();
    let (license, license_key, token) = create_test_product_license(&state, None, None);
    {
        let conn = state.db.get().unwrap();
        conn.execute(
            "UPDATE product_licenses SET active = 0 WHERE id = ?1",
            rusqlite::params![license.id],
        )
        .unwrap();
    }
    let app = test_app(state);

    let body = json!({"licenseKey": license_key});
    let response = app
        .oneshot(validate_request(&body, Some(&token), Some("10.0.0.1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["isValid"], false);
    assert_eq!(json["errorMessage"], "License is inactive");
}

#[tokio::test]
async fn test_validate_expired_license_returns_403() {
    let state = create_test_app_state();
    let (_license, license_key, token) =
        create_test_product_license(&state, None, Some(past_timestamp(1)));
    let app = test_app(state);

    let body = json!({"licenseKey": license_key});
    let response = app
        .oneshot(validate_request(&body, Some(&token), Some("10.0.0.1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["errorMessage"], "License has expired");
}

#[tokio::test]
async fn test_validate_domain_mismatch_returns_403_naming_licensed_domain() {
    let state = create_test_app_state();
    let (_license, license_key, token) =
        create_test_product_license(&state, Some("booking.fjellsikring.no"), None);
    let app = test_app(state);

    let body = json!({"licenseKey": license_key, "domain": "evil.example.com"});
    let response = app
        .oneshot(validate_request(&body, Some(&token), Some("10.0.0.1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["isValid"], false);
    let message = json["errorMessage"].as_str().unwrap();
    assert!(message.contains("booking.fjellsikring.no"));
}

#[tokio::test]
async fn test_validate_without_domain_skips_domain_check() {
    let state = create_test_app_state();
    let (_license, license_key, token) =
        create_test_product_license(&state, Some("booking.fjellsikring.no"), None);
    let app = test_app(state);

    // Installations that do not know their hostname omit the field
    let body = json!({"licenseKey": license_key});
    let response = app
        .oneshot(validate_request(&body, Some(&token), Some("10.0.0.1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["isValid"], true);
}

#[tokio::test]
async fn test_validate_malformed_body_returns_400() {
    let state = create_test_app_state();
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(VALIDATE_URI)
                .header("content-type", "application/json")
                .header("x-forwarded-for", "10.0.0.1")
                .body(axum::body::Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["isValid"], false);
    assert_eq!(json["errorMessage"], "Invalid request body");
}

#[tokio::test]
async fn test_validate_malformed_body_does_not_burn_rate_budget() {
    let state = create_test_app_state();
    let (_license, license_key, token) = create_test_product_license(&state, None, None);
    let app = test_app(state);

    // More malformed requests than the per-IP budget allows
    for _ in 0..10 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(VALIDATE_URI)
                    .header("content-type", "application/json")
                    .header("x-forwarded-for", "10.0.0.1")
                    .body(axum::body::Body::from("{"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // A well-formed request from the same IP still goes through
    let body = json!({"licenseKey": license_key});
    let response = app
        .oneshot(validate_request(&body, Some(&token), Some("10.0.0.1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_validate_ip_budget_exhaustion_returns_429_before_lookup() {
    let state = create_test_app_state();
    let (_license, license_key, token) = create_test_product_license(&state, None, None);
    let app = test_app(state);

    // Burn the per-IP budget with attempts against unknown keys
    for i in 0..5 {
        let body = json!({"licenseKey": format!("KKSP-GONE-{:04}-AAAA", i)});
        let response = app
            .clone()
            .oneshot(validate_request(&body, Some("whatever"), Some("10.9.9.9")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // Even correct credentials are refused from that IP now
    let body = json!({"licenseKey": license_key});
    let response = app
        .clone()
        .oneshot(validate_request(&body, Some(&token), Some("10.9.9.9")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(json["isValid"], false);
    assert_eq!(json["errorMessage"], "Too many validation attempts. Try again later.");

    // A different IP is unaffected
    let body = json!({"licenseKey": license_key});
    let response = app
        .oneshot(validate_request(&body, Some(&token), Some("10.9.9.10")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_validate_license_key_budget_spans_source_ips() {
    let state = create_test_app_state();
    let (_license, license_key, token) = create_test_product_license(&state, None, None);
    let app = test_app(state);

    // Rotating IPs does not help an attacker hammering one key
    for i in 0..5 {
        let body = json!({"licenseKey": license_key});
        let ip = format!("10.1.0.{}", i);
        let response = app
            .clone()
            .oneshot(validate_request(&body, Some("wrong-token"), Some(&ip)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let body = json!({"licenseKey": license_key});
    let response = app
        .oneshot(validate_request(&body, Some(&token), Some("10.1.0.99")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(
        json["errorMessage"],
        "Too many validation attempts for this license. Try again later."
    );
}

#[tokio::test]
async fn test_validate_success_resets_failure_counters() {
    let state = create_test_app_state();
    let (_license, license_key, token) = create_test_product_license(&state, None, None);
    let app = test_app(state);

    // Four failures, one short of the budget
    for _ in 0..4 {
        let body = json!({"licenseKey": license_key});
        let response = app
            .clone()
            .oneshot(validate_request(&body, Some("wrong-token"), Some("10.2.0.1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let body = json!({"licenseKey": license_key});
    let response = app
        .clone()
        .oneshot(validate_request(&body, Some(&token), Some("10.2.0.1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Counters start over after a success; these fail on the token,
    // not the budget
    for _ in 0..2 {
        let body = json!({"licenseKey": license_key});
        let response = app
            .clone()
            .oneshot(validate_request(&body, Some("wrong-token"), Some("10.2.0.1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_validate_empty_license_key_returns_400() {
    let state = create_test_app_state();
    let app = test_app(state);

    let body = json!({"licenseKey": "   "});
    let response = app
        .oneshot(validate_request(&body, Some("token"), Some("10.0.0.1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["errorMessage"], "licenseKey is required");
}
