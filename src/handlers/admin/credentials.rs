use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{ActorType, AuditAction, CreateCredential, CredentialWithStatus};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::{AuditLogBuilder, generate_verification_code};
use crate::validity::{CredentialStatus, expiry_after_months};

/// Issue a credential by hand, outside the webhook flow. The validity window
/// comes from the course: `validity_months` from now, or perpetual when the
/// course has no expiry.
pub async fn issue_credential(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreateCredential>,
) -> Result<Json<CredentialWithStatus>> {
    let conn = state.db.get()?;
    let person =
        queries::get_person_by_id(&conn, &input.person_id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    let course =
        queries::get_course_by_id(&conn, &input.course_id)?.or_not_found(msg::COURSE_NOT_FOUND)?;
    if let Some(enrollment_id) = &input.enrollment_id {
        let enrollment = queries::get_enrollment_by_id(&conn, enrollment_id)?
            .or_not_found(msg::ENROLLMENT_NOT_FOUND)?;
        if enrollment.person_id != input.person_id {
            return Err(AppError::BadRequest(
                "Enrollment belongs to a different person".into(),
            ));
        }
    }

    let now = queries::now();
    let valid_to = expiry_after_months(
        now,
        course.validity_months.and_then(|m| u32::try_from(m).ok()),
    );
    let credential = queries::insert_credential(
        &conn,
        &input.person_id,
        &input.course_id,
        input.enrollment_id.as_deref(),
        &generate_verification_code(),
        now,
        valid_to,
        course.grace_days,
    )?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::IssueCredential)
        .resource("credential", &credential.verification_code)
        .resource_name(&person.full_name())
        .details(&json!({ "course_code": course.code, "valid_to": credential.valid_to }))
        .save()?;

    Ok(Json(CredentialWithStatus::at(credential, now)))
}

#[derive(Debug, Deserialize)]
pub struct CredentialFilter {
    pub status: Option<CredentialStatus>,
}

pub async fn list_credentials(
    State(state): State<AppState>,
    Query(filter): Query<CredentialFilter>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<CredentialWithStatus>>> {
    let conn = state.db.get()?;
    let now = queries::now();
    let limit = pagination.limit();
    let offset = pagination.offset();

    let (items, total) = match filter.status {
        Some(status) => queries::list_credentials_by_status(&conn, status, now, limit, offset)?,
        None => queries::list_credentials_paginated(&conn, limit, offset)?,
    };

    let page = Paginated::new(items, total, limit, offset)
        .map(|credential| CredentialWithStatus::at(credential, now));
    Ok(Json(page))
}

pub async fn get_credential(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CredentialWithStatus>> {
    let conn = state.db.get()?;
    let credential =
        queries::get_credential_by_id(&conn, &id)?.or_not_found(msg::CREDENTIAL_NOT_FOUND)?;
    Ok(Json(CredentialWithStatus::at(credential, queries::now())))
}
