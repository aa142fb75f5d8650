use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::{AdminContext, same_admin_or_admin_role};
use crate::models::{
    ActorType, AdminApiKey, AdminUser, ApiKeyCreated, AuditAction, CreateAdminUser, CreateApiKey,
    UpdateAdminUser,
};
use crate::util::AuditLogBuilder;

pub async fn create_admin_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreateAdminUser>,
) -> Result<Json<AdminUser>> {
    input.validate()?;
    let conn = state.db.get()?;
    if queries::get_admin_user_by_email(&conn, &input.email)?.is_some() {
        return Err(AppError::Conflict(
            "An admin user with this email already exists".into(),
        ));
    }
    let user = queries::create_admin_user(&conn, &input)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateAdminUser)
        .resource("admin_user", &user.id)
        .resource_name(&user.name)
        .details(&json!({ "email": user.email, "role": user.role }))
        .save()?;

    Ok(Json(user))
}

pub async fn list_admin_users(State(state): State<AppState>) -> Result<Json<Vec<AdminUser>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_admin_users(&conn)?))
}

pub async fn get_admin_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AdminUser>> {
    let conn = state.db.get()?;
    let user = queries::get_admin_user_by_id(&conn, &id)?.or_not_found(msg::ADMIN_USER_NOT_FOUND)?;
    Ok(Json(user))
}

pub async fn update_admin_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdateAdminUser>,
) -> Result<Json<AdminUser>> {
    input.validate()?;
    if id == ctx.admin.id && input.active == Some(false) {
        return Err(AppError::BadRequest(
            "Cannot deactivate your own account".into(),
        ));
    }
    let conn = state.db.get()?;
    let user =
        queries::update_admin_user(&conn, &id, &input)?.or_not_found(msg::ADMIN_USER_NOT_FOUND)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::UpdateAdminUser)
        .resource("admin_user", &id)
        .resource_name(&user.name)
        .details(&json!({ "role": user.role, "active": user.active }))
        .save()?;

    Ok(Json(user))
}

/// Mint an API key for a user. Admins may mint for anyone, everyone else only
/// for themselves. The plaintext key appears in this response and nowhere
/// else.
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<CreateApiKey>,
) -> Result<Json<ApiKeyCreated>> {
    input.validate()?;
    let mut conn = state.db.get()?;
    let target =
        queries::get_admin_user_by_id(&conn, &id)?.or_not_found(msg::ADMIN_USER_NOT_FOUND)?;
    if !same_admin_or_admin_role(&ctx, &target) {
        return Err(AppError::Forbidden(
            "Cannot manage API keys for another user".into(),
        ));
    }

    let created = queries::create_admin_api_key(&mut conn, &id, input.name.trim())?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateApiKey)
        .resource("api_key", &created.id)
        .resource_name(&target.name)
        .details(&json!({ "key_prefix": created.key_prefix, "name": created.name }))
        .save()?;

    Ok(Json(created))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AdminApiKey>>> {
    let conn = state.db.get()?;
    let target =
        queries::get_admin_user_by_id(&conn, &id)?.or_not_found(msg::ADMIN_USER_NOT_FOUND)?;
    if !same_admin_or_admin_role(&ctx, &target) {
        return Err(AppError::Forbidden(
            "Cannot manage API keys for another user".into(),
        ));
    }
    Ok(Json(queries::list_api_keys_for_user(&conn, &id)?))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path((id, key_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let target =
        queries::get_admin_user_by_id(&conn, &id)?.or_not_found(msg::ADMIN_USER_NOT_FOUND)?;
    if !same_admin_or_admin_role(&ctx, &target) {
        return Err(AppError::Forbidden(
            "Cannot manage API keys for another user".into(),
        ));
    }
    if !queries::revoke_admin_api_key(&conn, &id, &key_id)? {
        return Err(AppError::NotFound(msg::API_KEY_NOT_FOUND.into()));
    }

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::RevokeApiKey)
        .resource("api_key", &key_id)
        .resource_name(&target.name)
        .save()?;

    Ok(Json(json!({ "revoked": true })))
}
