use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::DateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::crypto::hash_secret;
use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::models::ProductLicense;
use crate::rate_limit::LimitKind;
use crate::util::{extract_bearer_token, extract_request_info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub license_key: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub app_version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSuccess {
    pub is_valid: bool,
    /// RFC 3339, null for perpetual licenses.
    pub expires_at: Option<String>,
    /// Stored feature flags with `maxUsers`/`maxBookingsPerMonth` merged in.
    pub features: serde_json::Value,
    pub customer_name: String,
    pub customer_domain: Option<String>,
    pub product_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateFailure {
    pub is_valid: bool,
    pub error_message: String,
}

fn reject(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ValidateFailure {
            is_valid: false,
            error_message: message.to_string(),
        }),
    )
        .into_response()
}

/// Validate a sold product license from a customer installation.
///
/// The checks run in a fixed order and each failure short-circuits with its
/// own status and message: IP budget, license-key budget, bearer token
/// present, key lookup, token match, active flag, expiry, domain binding.
/// Only budget and token failures count against the rate limiter; a
/// successful validation resets both counters. Every outcome from token
/// mismatch onward is persisted as a validation record; attempts against
/// unknown keys have no license row to attach to and are only logged.
pub async fn validate_product_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match run_validation(&state, &headers, &body) {
        Ok(response) => response,
        Err(err) => {
            tracing::error!("product license validation failed: {}", err);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

fn run_validation(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response> {
    // Malformed requests are rejected before any counter is touched.
    let req: ValidateRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(_) => return Ok(reject(StatusCode::BAD_REQUEST, "Invalid request body")),
    };
    let license_key = req.license_key.trim().to_string();
    if license_key.is_empty() {
        return Ok(reject(StatusCode::BAD_REQUEST, "licenseKey is required"));
    }

    let (source_ip, _) = extract_request_info(headers);
    let ip_key = source_ip.clone().unwrap_or_else(|| "unknown".to_string());

    // 1. Budget for the caller's IP; exhaustion still burns the key budget.
    if !state.limiter.check(LimitKind::Ip, &ip_key) {
        state.limiter.record_failure(LimitKind::LicenseKey, &license_key);
        return Ok(reject(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many validation attempts. Try again later.",
        ));
    }

    // 2. Separate budget for the license key itself.
    if !state.limiter.check(LimitKind::LicenseKey, &license_key) {
        state.limiter.record_failure(LimitKind::Ip, &ip_key);
        return Ok(reject(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many validation attempts for this license. Try again later.",
        ));
    }

    // 3. The validation token travels as a bearer token, never in the body.
    let Some(token) = extract_bearer_token(headers) else {
        state.limiter.record_failure(LimitKind::Ip, &ip_key);
        state.limiter.record_failure(LimitKind::LicenseKey, &license_key);
        return Ok(reject(
            StatusCode::UNAUTHORIZED,
            "Validation token is required",
        ));
    };

    let conn = state.db.get()?;

    // 4. Unknown keys are not persisted; there is no license row to attach to.
    let Some(license) = queries::get_product_license_by_key(&conn, &license_key)? else {
        state.limiter.record_failure(LimitKind::Ip, &ip_key);
        state.limiter.record_failure(LimitKind::LicenseKey, &license_key);
        tracing::warn!(
            license_key = %license_key,
            ip = %ip_key,
            "validation attempt for unknown license key"
        );
        return Ok(reject(StatusCode::NOT_FOUND, "License not found"));
    };

    let record_failure = |conn: &Connection, reason: &str| {
        queries::insert_validation_record(
            conn,
            Some(&license.id),
            &license_key,
            false,
            Some(reason),
            source_ip.as_deref(),
            req.domain.as_deref(),
        )
    };

    // 5. Tokens are compared by hash; the plaintext is never stored.
    if hash_secret(token) != license.validation_token_hash {
        state.limiter.record_failure(LimitKind::Ip, &ip_key);
        state.limiter.record_failure(LimitKind::LicenseKey, &license_key);
        let message = "Invalid validation token";
        record_failure(&conn, message)?;
        return Ok(reject(StatusCode::UNAUTHORIZED, message));
    }

    // 6. Deactivated licenses fail closed regardless of expiry.
    if !license.active {
        let message = "License is inactive";
        record_failure(&conn, message)?;
        return Ok(reject(StatusCode::FORBIDDEN, message));
    }

    // 7. Expiry check against the license row, not the course grace rules.
    let now = queries::now();
    if let Some(expires_at) = license.expires_at
        && now > expires_at
    {
        let message = "License has expired";
        record_failure(&conn, message)?;
        return Ok(reject(StatusCode::FORBIDDEN, message));
    }

    // 8. Domain binding only applies when the caller presents a domain.
    if let (Some(allowed), Some(presented)) = (&license.allowed_domain, &req.domain)
        && allowed != presented
    {
        let message = format!(
            "License is not valid for this domain. Licensed domain: {}",
            allowed
        );
        record_failure(&conn, &message)?;
        return Ok(reject(StatusCode::FORBIDDEN, &message));
    }

    // 9. Success forgives prior failures on both counters.
    state.limiter.reset(LimitKind::Ip, &ip_key);
    state.limiter.reset(LimitKind::LicenseKey, &license_key);
    queries::mark_product_license_activated(&conn, &license.id, now)?;
    queries::insert_validation_record(
        &conn,
        Some(&license.id),
        &license_key,
        true,
        None,
        source_ip.as_deref(),
        req.domain.as_deref(),
    )?;

    tracing::debug!(
        license_key = %license_key,
        customer = %license.customer_name,
        "product license validated"
    );

    Ok((StatusCode::OK, Json(success_response(license))).into_response())
}

fn success_response(license: ProductLicense) -> ValidateSuccess {
    let mut features = serde_json::from_str::<serde_json::Value>(&license.features)
        .unwrap_or_else(|_| serde_json::json!({}));
    if !features.is_object() {
        features = serde_json::json!({});
    }
    if let Some(map) = features.as_object_mut() {
        map.insert("maxUsers".to_string(), license.max_users.into());
        map.insert(
            "maxBookingsPerMonth".to_string(),
            license.max_bookings_per_month.into(),
        );
    }

    let expires_at = license
        .expires_at
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.to_rfc3339());

    ValidateSuccess {
        is_valid: true,
        expires_at,
        features,
        customer_name: license.customer_name,
        customer_domain: license.allowed_domain,
        product_name: license.product_name,
    }
}
