//! Tests for admin authentication, user management, API keys and 2FA.
//!
//! Three tiers guard the /admin surface: any active key reads, managers
//! mutate business data, admins manage admin users. API keys are shown in
//! plaintext exactly once at creation; afterwards only the prefix is
//! visible. TOTP enrollment generates a fresh secret each time and stays
//! inactive until a code from the authenticator confirms it.

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use kursadmin::totp;

mod common;
use common::*;

#[tokio::test]
async fn test_admin_routes_require_api_key() {
    let state = create_test_app_state();
    let app = test_app(state);

    let response = app
        .oneshot(get_request("/admin/companies", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_api_key_is_rejected() {
    let state = create_test_app_state();
    let app = test_app(state);

    let response = app
        .oneshot(get_request(
            "/admin/companies",
            Some("kks_00000000000000000000000000000000"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_viewer_cannot_mutate_business_data() {
    let state = create_test_app_state();
    let (_viewer, key) = create_test_admin(&state, "viewer@kks.no", AdminRole::Viewer);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/companies",
            Some(&key),
            &json!({
                "name": "Fjellsikring AS",
                "org_number": "987654321",
                "contact_email": "post@fjellsikring.no"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(json_request(
            "POST",
            "/admin/courses",
            Some(&key),
            &json!({"code": "HMS-100", "name": "HMS Grunnkurs"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_viewer_can_read() {
    let state = create_test_app_state();
    let (_viewer, key) = create_test_admin(&state, "viewer@kks.no", AdminRole::Viewer);
    create_test_company(&state, "Fjellsikring AS");
    let app = test_app(state);

    let response = app
        .oneshot(get_request("/admin/companies", Some(&key)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["name"], "Fjellsikring AS");
}

#[tokio::test]
async fn test_manager_cannot_manage_admin_users() {
    let state = create_test_app_state();
    let (_manager, key) = create_test_admin(&state, "manager@kks.no", AdminRole::Manager);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/users",
            Some(&key),
            &json!({"email": "new@kks.no", "name": "Ny Bruker", "role": "VIEWER"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(get_request("/admin/users", Some(&key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_admin_user_rejects_duplicate_email() {
    let state = create_test_app_state();
    let (_admin, key) = create_test_admin(&state, "admin@kks.no", AdminRole::Admin);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/users",
            Some(&key),
            &json!({"email": "kari@kks.no", "name": "Kari Hansen", "role": "MANAGER"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], "kari@kks.no");
    assert_eq!(body["role"], "MANAGER");
    assert_eq!(body["totp_enabled"], false);
    assert_eq!(body["active"], true);
    // The encrypted TOTP secret must never serialize
    assert!(body.get("totp_secret_enc").is_none());

    let response = app
        .oneshot(json_request(
            "POST",
            "/admin/users",
            Some(&key),
            &json!({"email": "kari@kks.no", "name": "Kari Hansen", "role": "VIEWER"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["details"], "An admin user with this email already exists");
}

#[tokio::test]
async fn test_cannot_deactivate_own_account() {
    let state = create_test_app_state();
    let (admin, key) = create_test_admin(&state, "admin@kks.no", AdminRole::Admin);
    let (other, other_key) = create_test_admin(&state, "kari@kks.no", AdminRole::Manager);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/admin/users/{}", admin.id),
            Some(&key),
            &json!({"active": false}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["details"], "Cannot deactivate your own account");

    // Deactivating another account works and kills their key immediately
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/admin/users/{}", other.id),
            Some(&key),
            &json!({"active": false}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["active"], false);

    let response = app
        .oneshot(get_request("/admin/companies", Some(&other_key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_admin_user_role() {
    let state = create_test_app_state();
    let (_admin, key) = create_test_admin(&state, "admin@kks.no", AdminRole::Admin);
    let (other, _) = create_test_admin(&state, "kari@kks.no", AdminRole::Manager);
    let app = test_app(state);

    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/admin/users/{}", other.id),
            Some(&key),
            &json!({"role": "VIEWER"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["role"], "VIEWER");
}

#[tokio::test]
async fn test_api_key_plaintext_shown_once() {
    let state = create_test_app_state();
    let (admin, key) = create_test_admin(&state, "admin@kks.no", AdminRole::Admin);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/admin/users/{}/api-keys", admin.id),
            Some(&key),
            &json!({"name": "ci"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let new_key = created["key"].as_str().unwrap().to_string();
    assert!(new_key.starts_with("kks_"));
    assert_eq!(created["key_prefix"], &new_key[..12]);
    assert_eq!(created["name"], "ci");

    // The new key authenticates
    let response = app
        .clone()
        .oneshot(get_request("/admin/companies", Some(&new_key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Listing shows the prefix but never the key or its hash
    let response = app
        .oneshot(get_request(
            &format!("/admin/users/{}/api-keys", admin.id),
            Some(&key),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    let keys = listed.as_array().unwrap();
    assert_eq!(keys.len(), 2); // fixture key plus "ci"
    for entry in keys {
        assert!(entry.get("key").is_none());
        assert!(entry.get("key_hash").is_none());
        assert!(entry["key_prefix"].as_str().unwrap().starts_with("kks_"));
    }
}

#[tokio::test]
async fn test_revoked_api_key_stops_authenticating() {
    let state = create_test_app_state();
    let (admin, key) = create_test_admin(&state, "admin@kks.no", AdminRole::Admin);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/admin/users/{}/api-keys", admin.id),
            Some(&key),
            &json!({"name": "rotation"}),
        ))
        .await
        .unwrap();
    let created = body_json(response).await;
    let key_id = created["id"].as_str().unwrap().to_string();
    let new_key = created["key"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/admin/users/{}/api-keys/{}", admin.id, key_id),
            Some(&key),
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["revoked"], true);

    let response = app
        .clone()
        .oneshot(get_request("/admin/companies", Some(&new_key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Revoking twice finds nothing
    let response = app
        .oneshot(json_request(
            "DELETE",
            &format!("/admin/users/{}/api-keys/{}", admin.id, key_id),
            Some(&key),
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["details"], "API key not found");
}

#[tokio::test]
async fn test_only_admins_manage_keys_for_other_users() {
    let state = create_test_app_state();
    let (admin, admin_key) = create_test_admin(&state, "admin@kks.no", AdminRole::Admin);
    let (manager, manager_key) = create_test_admin(&state, "manager@kks.no", AdminRole::Manager);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/admin/users/{}/api-keys", admin.id),
            Some(&manager_key),
            &json!({"name": "sneaky"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["details"], "Cannot manage API keys for another user");

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/admin/users/{}/api-keys", admin.id),
            Some(&manager_key),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // An admin can mint for anyone
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/admin/users/{}/api-keys", manager.id),
            Some(&admin_key),
            &json!({"name": "ops"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["key"].as_str().unwrap().starts_with("kks_"));
}

#[tokio::test]
async fn test_two_factor_enroll_activate_verify_disable() {
    let state = create_test_app_state();
    let (_manager, key) = create_test_admin(&state, "manager@kks.no", AdminRole::Manager);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/admin/2fa/enroll", Some(&key), &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let enrollment = body_json(response).await;
    let secret = enrollment["secret"].as_str().unwrap().to_string();
    let otpauth = enrollment["otpauth_url"].as_str().unwrap();
    assert!(otpauth.starts_with("otpauth://totp/KKS:manager@kks.no"));
    assert!(otpauth.contains(&format!("secret={}", secret)));

    // Enrolled but not yet activated
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/2fa/verify",
            Some(&key),
            &json!({"code": "123456"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["details"], "Two-factor is not enabled");

    let code = totp::code_at(&secret, now()).unwrap();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/2fa/activate",
            Some(&key),
            &json!({"code": code}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["enabled"], true);

    let code = totp::code_at(&secret, now()).unwrap();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/2fa/verify",
            Some(&key),
            &json!({"code": code}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/admin/2fa/disable", Some(&key), &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["enabled"], false);

    let response = app
        .oneshot(json_request(
            "POST",
            "/admin/2fa/verify",
            Some(&key),
            &json!({"code": "123456"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_two_factor_activation_requires_enrollment_and_valid_code() {
    let state = create_test_app_state();
    let (_manager, key) = create_test_admin(&state, "manager@kks.no", AdminRole::Manager);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/2fa/activate",
            Some(&key),
            &json!({"code": "123456"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["details"], "Two-factor enrollment has not been started");

    let response = app
        .clone()
        .oneshot(json_request("POST", "/admin/2fa/enroll", Some(&key), &json!({})))
        .await
        .unwrap();
    let enrollment = body_json(response).await;
    let secret = enrollment["secret"].as_str().unwrap();

    // A code from the right secret but a long-gone time step fails
    let stale = totp::code_at(secret, now() - 3600).unwrap();
    let fresh = totp::code_at(secret, now()).unwrap();
    if stale != fresh {
        let response = app
            .oneshot(json_request(
                "POST",
                "/admin/2fa/activate",
                Some(&key),
                &json!({"code": stale}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["details"], "Invalid verification code");
    }
}

#[tokio::test]
async fn test_reenrollment_invalidates_previous_secret() {
    let state = create_test_app_state();
    let (_manager, key) = create_test_admin(&state, "manager@kks.no", AdminRole::Manager);
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/admin/2fa/enroll", Some(&key), &json!({})))
        .await
        .unwrap();
    let first = body_json(response).await;
    let first_secret = first["secret"].as_str().unwrap().to_string();

    let code = totp::code_at(&first_secret, now()).unwrap();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/2fa/activate",
            Some(&key),
            &json!({"code": code}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Re-enrolling issues a new secret and drops back to inactive
    let response = app
        .clone()
        .oneshot(json_request("POST", "/admin/2fa/enroll", Some(&key), &json!({})))
        .await
        .unwrap();
    let second = body_json(response).await;
    let second_secret = second["secret"].as_str().unwrap().to_string();
    assert_ne!(second_secret, first_secret);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/2fa/verify",
            Some(&key),
            &json!({"code": totp::code_at(&second_secret, now()).unwrap()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Only a code from the new secret can activate again
    let old_code = totp::code_at(&first_secret, now()).unwrap();
    let new_code = totp::code_at(&second_secret, now()).unwrap();
    if old_code != new_code {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/admin/2fa/activate",
                Some(&key),
                &json!({"code": old_code}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .oneshot(json_request(
            "POST",
            "/admin/2fa/activate",
            Some(&key),
            &json!({"code": totp::code_at(&second_secret, now()).unwrap()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
