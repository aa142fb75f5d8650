//! Test utilities and fixtures for kursadmin integration tests

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;

// Re-export the main library crate
pub use kursadmin::config::RateLimitSettings;
pub use kursadmin::crypto::MasterKey;
pub use kursadmin::db::{AppState, init_audit_db, init_db, queries};
pub use kursadmin::email::EmailService;
pub use kursadmin::handlers;
pub use kursadmin::licensing;
pub use kursadmin::models::*;
pub use kursadmin::rate_limit::MemoryRateLimiter;
pub use kursadmin::util::{generate_license_key, generate_validation_token, generate_verification_code};

/// Shared secret the webhook tests present in x-api-key
pub const TEST_WEBHOOK_KEY: &str = "test-webhook-key";

/// Create a test master key (random, round-tripped through base64)
pub fn test_master_key() -> MasterKey {
    MasterKey::from_base64(&MasterKey::generate()).expect("Failed to create test master key")
}

/// Rate limit settings small enough to exhaust within a test
pub fn test_rate_limits() -> RateLimitSettings {
    RateLimitSettings {
        ip_max_attempts: 5,
        ip_window_secs: 900,
        key_max_attempts: 5,
        key_window_secs: 3600,
    }
}

/// Create an AppState for testing with in-memory databases.
///
/// The pools are capped at one connection because every pooled connection to
/// `SqliteConnectionManager::memory()` is a distinct database. Tests must drop
/// setup connections (scope them in a block) before driving the router.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let audit_manager = SqliteConnectionManager::memory();
    let audit_pool = Pool::builder().max_size(1).build(audit_manager).unwrap();
    {
        let conn = audit_pool.get().unwrap();
        init_audit_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        audit: audit_pool,
        master_key: test_master_key(),
        email_service: EmailService::new(None, "KKS AS <post@kks.no>".to_string()),
        limiter: Arc::new(MemoryRateLimiter::new(test_rate_limits())),
        webhook_api_key: Some(TEST_WEBHOOK_KEY.to_string()),
        audit_log_enabled: true,
        base_url: "http://localhost:3000".to_string(),
    }
}

/// Create a Router with the full route surface, as served in production
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::public::router())
        .merge(handlers::webhooks::router())
        .merge(handlers::admin::router(state.clone()))
        .with_state(state)
}

/// Create a test admin user with an API key for Authorization headers
pub fn create_test_admin(state: &AppState, email: &str, role: AdminRole) -> (AdminUser, String) {
    let mut conn = state.db.get().unwrap();
    let input = CreateAdminUser {
        email: email.to_string(),
        name: format!("Test Admin {}", email),
        role,
    };
    let admin = queries::create_admin_user(&conn, &input).expect("Failed to create test admin");
    let created = queries::create_admin_api_key(&mut conn, &admin.id, "test")
        .expect("Failed to create test API key");
    (admin, created.key)
}

/// Create a test company with its trial license
pub fn create_test_company(state: &AppState, name: &str) -> (Company, License) {
    let mut conn = state.db.get().unwrap();
    let input = CreateCompany {
        name: name.to_string(),
        org_number: Some("987654321".to_string()),
        contact_email: Some("post@example.no".to_string()),
    };
    let outcome = licensing::create_company_with_trial(&mut conn, &input, "test")
        .expect("Failed to create test company");
    (outcome.company, outcome.license)
}

/// Create a test course
pub fn create_test_course(
    state: &AppState,
    code: &str,
    validity_months: Option<i64>,
    grace_days: i64,
) -> Course {
    let conn = state.db.get().unwrap();
    let input = CreateCourse {
        code: code.to_string(),
        name: format!("Test Course {}", code),
        description: None,
        validity_months,
        grace_days: Some(grace_days),
    };
    queries::create_course(&conn, &input).expect("Failed to create test course")
}

/// Create a test person
pub fn create_test_person(state: &AppState, first_name: &str, email: Option<&str>) -> Person {
    let conn = state.db.get().unwrap();
    let input = CreatePerson {
        first_name: first_name.to_string(),
        last_name: "Testperson".to_string(),
        email: email.map(|e| e.to_string()),
        birth_date: Some("1990-04-12".to_string()),
        phone: None,
    };
    queries::create_person(&conn, &input).expect("Failed to create test person")
}

/// Create a test product license.
/// Returns the license row plus the plaintext license key and validation token.
pub fn create_test_product_license(
    state: &AppState,
    allowed_domain: Option<&str>,
    expires_at: Option<i64>,
) -> (ProductLicense, String, String) {
    let conn = state.db.get().unwrap();
    let input = CreateProductLicense {
        product_name: "KKS Booking".to_string(),
        customer_name: "Fjellsikring AS".to_string(),
        customer_email: Some("post@fjellsikring.no".to_string()),
        allowed_domain: allowed_domain.map(|d| d.to_string()),
        max_users: Some(25),
        max_bookings_per_month: Some(500),
        features: Some(serde_json::json!({"booking": true, "reports": false})),
        expires_at,
    };
    let license_key = generate_license_key();
    let token = generate_validation_token();
    let token_hash = kursadmin::crypto::hash_secret(&token);
    let license = queries::insert_product_license(&conn, &input, &license_key, &token_hash)
        .expect("Failed to create test product license");
    (license, license_key, token)
}

/// Issue a test credential directly, bypassing the enrollment flow
pub fn create_test_credential(
    state: &AppState,
    person_id: &str,
    course_id: &str,
    valid_to: Option<i64>,
    grace_days: i64,
) -> Credential {
    let conn = state.db.get().unwrap();
    queries::insert_credential(
        &conn,
        person_id,
        course_id,
        None,
        &generate_verification_code(),
        now(),
        valid_to,
        grace_days,
    )
    .expect("Failed to create test credential")
}

/// Build a JSON request, optionally authenticated with a bearer API key
pub fn json_request(
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    body: &serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

/// Build a GET request, optionally authenticated with a bearer API key
pub fn get_request(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    builder.body(Body::empty()).expect("Failed to build request")
}

/// Read a response body as JSON
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&bytes).expect("Response body should be valid JSON")
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a future timestamp (days from now)
pub fn future_timestamp(days: i64) -> i64 {
    now() + (days * 86400)
}

/// Get a past timestamp (days ago)
pub fn past_timestamp(days: i64) -> i64 {
    now() - (days * 86400)
}
