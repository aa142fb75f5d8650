use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use serde_json::json;

use crate::crypto::hash_secret;
use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{
    ActorType, AuditAction, CreateProductLicense, ProductLicense, ProductLicenseCreated,
    UpdateProductLicense, ValidationRecord,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::{AuditLogBuilder, generate_license_key, generate_validation_token};

/// Create a product license. The response is the only place the plaintext
/// validation token ever appears; the database keeps its hash.
pub async fn create_product_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreateProductLicense>,
) -> Result<Json<ProductLicenseCreated>> {
    input.validate()?;
    let conn = state.db.get()?;

    let license_key = generate_license_key();
    let validation_token = generate_validation_token();
    let license =
        queries::insert_product_license(&conn, &input, &license_key, &hash_secret(&validation_token))?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateProductLicense)
        .resource("product_license", &license.id)
        .resource_name(&license.customer_name)
        .details(&json!({ "license_key": license.license_key, "product_name": license.product_name }))
        .save()?;

    Ok(Json(ProductLicenseCreated {
        license,
        validation_token,
    }))
}

pub async fn list_product_licenses(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<ProductLicense>>> {
    let conn = state.db.get()?;
    let limit = pagination.limit();
    let offset = pagination.offset();
    let (items, total) = queries::list_product_licenses_paginated(&conn, limit, offset)?;
    Ok(Json(Paginated::new(items, total, limit, offset)))
}

pub async fn get_product_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductLicense>> {
    let conn = state.db.get()?;
    let license = queries::get_product_license_by_id(&conn, &id)?
        .or_not_found(msg::PRODUCT_LICENSE_NOT_FOUND)?;
    Ok(Json(license))
}

pub async fn update_product_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdateProductLicense>,
) -> Result<Json<ProductLicense>> {
    input.validate()?;
    let conn = state.db.get()?;
    let license = queries::update_product_license(&conn, &id, &input)?
        .or_not_found(msg::PRODUCT_LICENSE_NOT_FOUND)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::UpdateProductLicense)
        .resource("product_license", &id)
        .resource_name(&license.customer_name)
        .details(&json!({ "active": license.active, "expires_at": license.expires_at }))
        .save()?;

    Ok(Json(license))
}

/// Validation attempts for one license, newest first.
pub async fn list_license_validations(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<ValidationRecord>>> {
    let conn = state.db.get()?;
    queries::get_product_license_by_id(&conn, &id)?.or_not_found(msg::PRODUCT_LICENSE_NOT_FOUND)?;
    let limit = pagination.limit();
    let offset = pagination.offset();
    let (items, total) = queries::list_validation_records(&conn, &id, limit, offset)?;
    Ok(Json(Paginated::new(items, total, limit, offset)))
}
