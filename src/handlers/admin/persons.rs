use axum::extract::{Extension, Query, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use chrono::{TimeZone, Utc};
use serde::Serialize;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{
    AccessCard, ActorType, Assessment, AuditAction, CreateAccessCard, CreateDocument,
    CreatePerson, CreatePolicyAcknowledgment, Credential, Document, Enrollment, Person,
    PolicyAcknowledgment, UpdatePerson,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::AuditLogBuilder;

pub async fn create_person(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreatePerson>,
) -> Result<Json<Person>> {
    input.validate()?;
    let conn = state.db.get()?;
    let person = queries::create_person(&conn, &input)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreatePerson)
        .resource("person", &person.id)
        .resource_name(&person.full_name())
        .save()?;

    Ok(Json(person))
}

pub async fn list_persons(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<Person>>> {
    let conn = state.db.get()?;
    let limit = pagination.limit();
    let offset = pagination.offset();
    let (persons, total) = queries::list_persons_paginated(&conn, limit, offset)?;
    Ok(Json(Paginated::new(persons, total, limit, offset)))
}

pub async fn get_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Person>> {
    let conn = state.db.get()?;
    let person = queries::get_person_by_id(&conn, &id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    Ok(Json(person))
}

pub async fn update_person(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdatePerson>,
) -> Result<Json<Person>> {
    input.validate()?;
    let conn = state.db.get()?;
    let person = queries::update_person(&conn, &id, &input)?.or_not_found(msg::PERSON_NOT_FOUND)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::UpdatePerson)
        .resource("person", &id)
        .resource_name(&person.full_name())
        .save()?;

    Ok(Json(person))
}

/// GDPR erasure: hard delete, children cascade.
pub async fn delete_person(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let person = queries::get_person_by_id(&conn, &id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    queries::delete_person(&conn, &id)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::DeletePerson)
        .resource("person", &id)
        .resource_name(&person.full_name())
        .details(&json!({ "email": person.email }))
        .save()?;

    Ok(Json(json!({ "deleted": true })))
}

/// Everything stored about one person, shaped for handing to the data
/// subject. The acknowledgment count stands in for the full rows; the policy
/// texts themselves are not personal data.
#[derive(Debug, Serialize)]
pub struct PersonDataExport {
    pub filename: String,
    pub exported_at: i64,
    pub person: Person,
    pub enrollments: Vec<Enrollment>,
    pub assessments: Vec<Assessment>,
    pub credentials: Vec<Credential>,
    pub documents: Vec<Document>,
    pub access_cards: Vec<AccessCard>,
    pub policy_acknowledgment_count: usize,
}

/// Assemble the GDPR export bundle and record who pulled it.
pub async fn export_person_data(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response> {
    let conn = state.db.get()?;
    let person = queries::get_person_by_id(&conn, &id)?.or_not_found(msg::PERSON_NOT_FOUND)?;

    let enrollments = queries::list_enrollments_for_person(&conn, &id)?;
    let mut assessments = Vec::new();
    for enrollment in &enrollments {
        if let Some(assessment) = queries::get_assessment_for_enrollment(&conn, &enrollment.id)? {
            assessments.push(assessment);
        }
    }
    let credentials = queries::list_credentials_for_person(&conn, &id)?;
    let documents = queries::list_documents_for_person(&conn, &id)?;
    let access_cards = queries::list_access_cards_for_person(&conn, &id)?;
    let acknowledgments = queries::list_policy_acks_for_person(&conn, &id)?;

    let exported_at = queries::now();
    let filename = export_filename(&person, exported_at);

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::ExportPersonData)
        .resource("person", &id)
        .resource_name(&person.full_name())
        .details(&json!({
            "filename": filename,
            "enrollment_ids": enrollments.iter().map(|e| &e.id).collect::<Vec<_>>(),
            "credential_ids": credentials.iter().map(|c| &c.id).collect::<Vec<_>>(),
            "document_ids": documents.iter().map(|d| &d.id).collect::<Vec<_>>(),
            "access_card_ids": access_cards.iter().map(|c| &c.id).collect::<Vec<_>>(),
            "policy_acknowledgment_count": acknowledgments.len(),
        }))
        .save()?;

    let export = PersonDataExport {
        filename: filename.clone(),
        exported_at,
        person,
        enrollments,
        assessments,
        credentials,
        documents,
        access_cards,
        policy_acknowledgment_count: acknowledgments.len(),
    };

    // Non-ASCII emails cannot ride in the header; the body still carries the
    // canonical filename.
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let mut response = Json(export).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

/// `persondata_{email}_{yyyy-MM-dd}.json`, with the person id standing in
/// when no email is on file.
fn export_filename(person: &Person, exported_at: i64) -> String {
    let slug = person.email.as_deref().unwrap_or(&person.id);
    let date = Utc
        .timestamp_opt(exported_at, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| exported_at.to_string());
    format!("persondata_{}_{}.json", slug, date)
}

pub async fn create_document(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<CreateDocument>,
) -> Result<Json<Document>> {
    input.validate()?;
    let conn = state.db.get()?;
    queries::get_person_by_id(&conn, &id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    let document = queries::create_document(&conn, &id, &input)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateDocument)
        .resource("document", &document.id)
        .resource_name(&document.title)
        .details(&json!({ "person_id": id, "category": document.category }))
        .save()?;

    Ok(Json(document))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Document>>> {
    let conn = state.db.get()?;
    queries::get_person_by_id(&conn, &id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    Ok(Json(queries::list_documents_for_person(&conn, &id)?))
}

pub async fn create_access_card(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<CreateAccessCard>,
) -> Result<Json<AccessCard>> {
    input.validate()?;
    let conn = state.db.get()?;
    queries::get_person_by_id(&conn, &id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    let card = queries::create_access_card(&conn, &id, &input)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::CreateAccessCard)
        .resource("access_card", &card.id)
        .resource_name(&card.card_number)
        .details(&json!({ "person_id": id }))
        .save()?;

    Ok(Json(card))
}

pub async fn list_access_cards(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AccessCard>>> {
    let conn = state.db.get()?;
    queries::get_person_by_id(&conn, &id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    Ok(Json(queries::list_access_cards_for_person(&conn, &id)?))
}

pub async fn create_policy_acknowledgment(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<CreatePolicyAcknowledgment>,
) -> Result<Json<PolicyAcknowledgment>> {
    input.validate()?;
    let conn = state.db.get()?;
    let person = queries::get_person_by_id(&conn, &id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    let ack = queries::create_policy_acknowledgment(&conn, &id, &input)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
        .action(AuditAction::AcknowledgePolicy)
        .resource("person", &id)
        .resource_name(&person.full_name())
        .details(&json!({ "policy_name": ack.policy_name }))
        .save()?;

    Ok(Json(ack))
}

pub async fn list_policy_acknowledgments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PolicyAcknowledgment>>> {
    let conn = state.db.get()?;
    queries::get_person_by_id(&conn, &id)?.or_not_found(msg::PERSON_NOT_FOUND)?;
    Ok(Json(queries::list_policy_acks_for_person(&conn, &id)?))
}
