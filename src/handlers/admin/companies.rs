use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::licensing::{self, LicenseCheck, TransitionOutcome};
use crate::middleware::AdminContext;
use crate::models::{
    ActorType, AuditAction, Company, CreateCompany, CreateLicense, LicenseActivity, ResumeRequest,
    SuspendRequest, UpdateCompany,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::AuditLogBuilder;

pub async fn create_company(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreateCompany>,
) -> Result<Json<TransitionOutcome>> {
    input.validate()?;
    let mut conn = state.db.get()?;
    let outcome = licensing::create_company_with_trial(&mut conn, &input, &ctx.admin.name)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateCompany)
        .resource("company", &outcome.company.id)
        .resource_name(&outcome.company.name)
        .details(&json!({
            "org_number": outcome.company.org_number,
            "trial_license_id": outcome.license.id,
        }))
        .save()?;

    Ok(Json(outcome))
}

pub async fn list_companies(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<Company>>> {
    let conn = state.db.get()?;
    let limit = pagination.limit();
    let offset = pagination.offset();
    let (companies, total) = queries::list_companies_paginated(&conn, limit, offset)?;
    Ok(Json(Paginated::new(companies, total, limit, offset)))
}

pub async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Company>> {
    let conn = state.db.get()?;
    let company = queries::get_company_by_id(&conn, &id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;
    Ok(Json(company))
}

pub async fn update_company(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdateCompany>,
) -> Result<Json<Company>> {
    input.validate()?;
    let conn = state.db.get()?;
    let company =
        queries::update_company(&conn, &id, &input)?.or_not_found(msg::COMPANY_NOT_FOUND)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::UpdateCompany)
        .resource("company", &id)
        .resource_name(&company.name)
        .save()?;

    Ok(Json(company))
}

/// Read-time check: is this company's license usable right now?
pub async fn check_company_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LicenseCheck>> {
    let conn = state.db.get()?;
    let check = licensing::check_company_license(&conn, &id, queries::now())?;
    Ok(Json(check))
}

pub async fn suspend_company(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<SuspendRequest>,
) -> Result<Json<TransitionOutcome>> {
    input.validate()?;
    let reason = input.reason.trim();

    let mut conn = state.db.get()?;
    let outcome = licensing::suspend_company_license(&mut conn, &id, reason, &ctx.admin.name)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::SuspendLicense)
        .resource("company", &id)
        .resource_name(&outcome.company.name)
        .details(&json!({ "reason": reason, "license_id": outcome.license.id }))
        .save()?;

    // The transition is committed; notification failures only get logged.
    if let Some(email) = &outcome.company.contact_email {
        if let Err(e) = state
            .email_service
            .send_license_suspended(email, &outcome.company.name, reason)
            .await
        {
            tracing::warn!(company = %outcome.company.id, "suspension email failed: {}", e);
        }
    }

    Ok(Json(outcome))
}

pub async fn resume_company(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<ResumeRequest>,
) -> Result<Json<TransitionOutcome>> {
    input.validate()?;

    let mut conn = state.db.get()?;
    let outcome =
        licensing::resume_company_license(&mut conn, &id, input.extend_days, &ctx.admin.name)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::ResumeLicense)
        .resource("company", &id)
        .resource_name(&outcome.company.name)
        .details(&json!({
            "extend_days": input.extend_days,
            "end_date": outcome.license.end_date,
        }))
        .save()?;

    if let Some(email) = &outcome.company.contact_email {
        if let Err(e) = state
            .email_service
            .send_license_resumed(email, &outcome.company.name, outcome.license.end_date)
            .await
        {
            tracing::warn!(company = %outcome.company.id, "resumption email failed: {}", e);
        }
    }

    Ok(Json(outcome))
}

pub async fn list_company_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Vec<LicenseActivity>>> {
    let conn = state.db.get()?;
    queries::get_company_by_id(&conn, &id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;
    let activities = queries::list_company_activities(&conn, &id, pagination.limit())?;
    Ok(Json(activities))
}

pub async fn create_company_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<CreateLicense>,
) -> Result<Json<TransitionOutcome>> {
    input.validate()?;

    let mut conn = state.db.get()?;
    let outcome = licensing::issue_license(&mut conn, &id, &input, &ctx.admin.name)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateLicense)
        .resource("company", &id)
        .resource_name(&outcome.company.name)
        .details(&json!({
            "license_id": outcome.license.id,
            "plan": outcome.license.plan_name,
            "end_date": outcome.license.end_date,
        }))
        .save()?;

    Ok(Json(outcome))
}
