use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{
    ActorType, Assessment, AuditAction, CreateEnrollment, Enrollment, RecordAssessment,
};
use crate::util::AuditLogBuilder;

pub async fn create_enrollment(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreateEnrollment>,
) -> Result<Json<Enrollment>> {
    let conn = state.db.get()?;
    let person =
        queries::get_person_by_id(&conn, &input.person_id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    queries::get_session_by_id(&conn, &input.session_id)?.or_not_found(msg::SESSION_NOT_FOUND)?;
    if queries::find_enrollment(&conn, &input.person_id, &input.session_id)?.is_some() {
        return Err(AppError::Conflict(
            "Person is already enrolled in this session".into(),
        ));
    }
    let enrollment =
        queries::create_enrollment(&conn, &input.person_id, &input.session_id, "manual")?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateEnrollment)
        .resource("enrollment", &enrollment.id)
        .resource_name(&person.full_name())
        .details(&json!({ "session_id": input.session_id }))
        .save()?;

    Ok(Json(enrollment))
}

#[derive(Debug, Serialize)]
pub struct EnrollmentDetail {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<Assessment>,
}

pub async fn get_enrollment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EnrollmentDetail>> {
    let conn = state.db.get()?;
    let enrollment =
        queries::get_enrollment_by_id(&conn, &id)?.or_not_found(msg::ENROLLMENT_NOT_FOUND)?;
    let assessment = queries::get_assessment_for_enrollment(&conn, &id)?;
    Ok(Json(EnrollmentDetail {
        enrollment,
        assessment,
    }))
}

/// Roster for one session.
pub async fn list_session_enrollments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Enrollment>>> {
    let conn = state.db.get()?;
    queries::get_session_by_id(&conn, &id)?.or_not_found(msg::SESSION_NOT_FOUND)?;
    Ok(Json(queries::list_enrollments_for_session(&conn, &id)?))
}

/// Record the pass/fail outcome for an enrollment. A passed or failed
/// assessment both mark the enrollment completed; issuing a credential is a
/// separate step.
pub async fn record_assessment(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<RecordAssessment>,
) -> Result<Json<Assessment>> {
    input.validate()?;
    let conn = state.db.get()?;
    queries::get_enrollment_by_id(&conn, &id)?.or_not_found(msg::ENROLLMENT_NOT_FOUND)?;
    if queries::get_assessment_for_enrollment(&conn, &id)?.is_some() {
        return Err(AppError::Conflict(
            "Enrollment already has an assessment".into(),
        ));
    }

    let assessed_at = input.assessed_at.unwrap_or_else(queries::now);
    let assessment = queries::insert_assessment(&conn, &id, input.passed, input.score, assessed_at)?;
    queries::complete_enrollment(&conn, &id, assessed_at)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::RecordAssessment)
        .resource("enrollment", &id)
        .details(&json!({ "passed": input.passed, "score": input.score }))
        .save()?;

    Ok(Json(assessment))
}
