//! Tests for the public GET /verify/{code} certificate lookup.
//!
//! Anyone holding a verification code printed on a course certificate can
//! check whether the credential behind it is still valid. The response is
//! deliberately sparse: no email, no birth date, no internal ids.

use axum::http::StatusCode;
use tower::ServiceExt;

mod common;
use common::*;

#[tokio::test]
async fn test_verify_with_known_code_returns_certificate() {
    let state = create_test_app_state();
    let course = create_test_course(&state, "HMS-100", Some(24), 14);
    let person = create_test_person(&state, "Ola", Some("ola@example.no"));
    let credential =
        create_test_credential(&state, &person.id, &course.id, Some(future_timestamp(365)), 14);
    let app = test_app(state);

    let response = app
        .oneshot(get_request(
            &format!("/verify/{}", credential.verification_code),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["verification_code"], credential.verification_code);
    assert_eq!(json["person_name"], "Ola Testperson");
    assert_eq!(json["course_code"], "HMS-100");
    assert_eq!(json["course_name"], "Test Course HMS-100");
    assert_eq!(json["validity"]["status"], "valid");
    assert_eq!(json["validity"]["is_valid"], true);
    assert_eq!(json["validity"]["in_grace"], false);
}

#[tokio::test]
async fn test_verify_within_grace_reports_expired_but_usable() {
    let state = create_test_app_state();
    let course = create_test_course(&state, "FSE-LV", Some(12), 14);
    let person = create_test_person(&state, "Kari", None);
    let credential =
        create_test_credential(&state, &person.id, &course.id, Some(past_timestamp(5)), 14);
    let app = test_app(state);

    let response = app
        .oneshot(get_request(
            &format!("/verify/{}", credential.verification_code),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["validity"]["status"], "expired");
    assert_eq!(json["validity"]["is_valid"], true);
    assert_eq!(json["validity"]["in_grace"], true);
}

#[tokio::test]
async fn test_verify_past_grace_is_invalid() {
    let state = create_test_app_state();
    let course = create_test_course(&state, "FSE-LV", Some(12), 14);
    let person = create_test_person(&state, "Kari", None);
    let credential =
        create_test_credential(&state, &person.id, &course.id, Some(past_timestamp(30)), 14);
    let app = test_app(state);

    let response = app
        .oneshot(get_request(
            &format!("/verify/{}", credential.verification_code),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["validity"]["status"], "expired");
    assert_eq!(json["validity"]["is_valid"], false);
    assert_eq!(json["validity"]["in_grace"], false);
}

#[tokio::test]
async fn test_verify_perpetual_credential_never_expires() {
    let state = create_test_app_state();
    let course = create_test_course(&state, "INTRO-1", None, 0);
    let person = create_test_person(&state, "Nils", None);
    let credential = create_test_credential(&state, &person.id, &course.id, None, 0);
    let app = test_app(state);

    let response = app
        .oneshot(get_request(
            &format!("/verify/{}", credential.verification_code),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["validity"]["status"], "valid");
    assert!(json.get("valid_to").is_none() || json["valid_to"].is_null());
    assert!(json["validity"]["days_until_expiry"].is_null());
}

#[tokio::test]
async fn test_verify_unknown_code_returns_404() {
    let state = create_test_app_state();
    let app = test_app(state);

    let response = app
        .oneshot(get_request("/verify/KKS-0000000000", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Not found");
    assert_eq!(json["details"], "Credential not found");
}

#[tokio::test]
async fn test_verify_omits_personal_details() {
    let state = create_test_app_state();
    let course = create_test_course(&state, "HMS-100", Some(24), 14);
    let person = create_test_person(&state, "Ola", Some("ola@example.no"));
    let credential =
        create_test_credential(&state, &person.id, &course.id, Some(future_timestamp(365)), 14);
    let app = test_app(state);

    let response = app
        .oneshot(get_request(
            &format!("/verify/{}", credential.verification_code),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json.get("email").is_none());
    assert!(json.get("birth_date").is_none());
    assert!(json.get("person_id").is_none());
}
