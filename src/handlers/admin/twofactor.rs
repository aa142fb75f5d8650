use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::middleware::AdminContext;
use crate::models::{ActorType, AuditAction, TwoFactorEnrollment, VerifyCodeRequest};
use crate::totp;
use crate::util::AuditLogBuilder;

/// Start 2FA enrollment for the calling admin. Generates a fresh secret each
/// time, so re-enrolling invalidates any previous authenticator entry until
/// the new one is activated.
pub async fn enroll(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
) -> Result<Json<TwoFactorEnrollment>> {
    let secret = totp::generate_secret();
    let encrypted = state.master_key.encrypt_secret(&ctx.admin.id, secret.as_bytes())?;

    let conn = state.db.get()?;
    queries::set_totp_secret(&conn, &ctx.admin.id, &encrypted)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::EnrollTwoFactor)
        .resource("admin_user", &ctx.admin.id)
        .resource_name(&ctx.admin.name)
        .save()?;

    let otpauth_url = totp::provisioning_uri(&secret, &ctx.admin.email);
    Ok(Json(TwoFactorEnrollment { secret, otpauth_url }))
}

/// Confirm enrollment with a code from the authenticator app.
pub async fn activate(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<VerifyCodeRequest>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let user =
        queries::get_admin_user_by_id(&conn, &ctx.admin.id)?.or_not_found(msg::ADMIN_USER_NOT_FOUND)?;
    let secret_enc = user.totp_secret_enc.as_deref().ok_or_else(|| {
        AppError::BadRequest("Two-factor enrollment has not been started".into())
    })?;

    let secret = decrypt_secret_string(&state, &ctx.admin.id, secret_enc)?;
    if !totp::verify(&secret, &input.code, queries::now())? {
        return Err(AppError::BadRequest("Invalid verification code".into()));
    }
    queries::enable_totp(&conn, &ctx.admin.id)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::ActivateTwoFactor)
        .resource("admin_user", &ctx.admin.id)
        .resource_name(&ctx.admin.name)
        .save()?;

    Ok(Json(json!({ "enabled": true })))
}

/// Check a code against the caller's active 2FA secret.
pub async fn verify(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Json(input): Json<VerifyCodeRequest>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let user =
        queries::get_admin_user_by_id(&conn, &ctx.admin.id)?.or_not_found(msg::ADMIN_USER_NOT_FOUND)?;
    if !user.totp_enabled {
        return Err(AppError::BadRequest("Two-factor is not enabled".into()));
    }
    let secret_enc = user
        .totp_secret_enc
        .as_deref()
        .ok_or_else(|| AppError::Internal("Two-factor enabled without a secret".into()))?;

    let secret = decrypt_secret_string(&state, &ctx.admin.id, secret_enc)?;
    let valid = totp::verify(&secret, &input.code, queries::now())?;
    Ok(Json(json!({ "valid": valid })))
}

pub async fn disable(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    queries::disable_totp(&conn, &ctx.admin.id)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::DisableTwoFactor)
        .resource("admin_user", &ctx.admin.id)
        .resource_name(&ctx.admin.name)
        .save()?;

    Ok(Json(json!({ "enabled": false })))
}

fn decrypt_secret_string(state: &AppState, admin_id: &str, encrypted: &[u8]) -> Result<String> {
    let plain = state.master_key.decrypt_secret(admin_id, encrypted)?;
    String::from_utf8(plain).map_err(|_| AppError::Internal("Stored TOTP secret is corrupt".into()))
}
