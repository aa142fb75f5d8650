use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{
    ActorType, AuditAction, Course, CourseSession, CreateCourse, CreateSession, UpdateCourse,
};
use crate::util::AuditLogBuilder;

pub async fn create_course(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreateCourse>,
) -> Result<Json<Course>> {
    input.validate()?;
    let conn = state.db.get()?;
    if queries::get_course_by_code(&conn, input.code.trim())?.is_some() {
        return Err(AppError::Conflict(format!(
            "Course code {} is already in use",
            input.code.trim()
        )));
    }
    let course = queries::create_course(&conn, &input)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateCourse)
        .resource("course", &course.id)
        .resource_name(&course.name)
        .details(&json!({ "code": course.code }))
        .save()?;

    Ok(Json(course))
}

pub async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_courses(&conn)?))
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Course>> {
    let conn = state.db.get()?;
    let course = queries::get_course_by_id(&conn, &id)?.or_not_found(msg::COURSE_NOT_FOUND)?;
    Ok(Json(course))
}

pub async fn update_course(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdateCourse>,
) -> Result<Json<Course>> {
    input.validate()?;
    let conn = state.db.get()?;
    let course = queries::update_course(&conn, &id, &input)?.or_not_found(msg::COURSE_NOT_FOUND)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::UpdateCourse)
        .resource("course", &id)
        .resource_name(&course.name)
        .save()?;

    Ok(Json(course))
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<CreateSession>,
) -> Result<Json<CourseSession>> {
    input.validate()?;
    let conn = state.db.get()?;
    let course = queries::get_course_by_id(&conn, &id)?.or_not_found(msg::COURSE_NOT_FOUND)?;
    let session = queries::create_session(&conn, &id, &input)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateSession)
        .resource("session", &session.id)
        .resource_name(&course.name)
        .details(&json!({ "course_id": id, "kind": session.kind, "starts_at": session.starts_at }))
        .save()?;

    Ok(Json(session))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CourseSession>>> {
    let conn = state.db.get()?;
    queries::get_course_by_id(&conn, &id)?.or_not_found(msg::COURSE_NOT_FOUND)?;
    Ok(Json(queries::list_sessions_for_course(&conn, &id)?))
}
