use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::models::{ActorType, AuditAction, CreatePerson, Person};
use crate::util::{AuditLogBuilder, generate_verification_code};
use crate::validity::expiry_after_months;

const PROVIDER: &str = "bransjekurs";

/// Completion result pushed by the bransjekurs e-learning platform.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BransjekursCompletion {
    /// Delivery id on the sender side; replays carry the same value.
    pub external_id: String,
    pub course_code: String,
    pub participant: BransjekursParticipant,
    pub completed_at: i64,
    pub passed: bool,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BransjekursParticipant {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// ISO date (YYYY-MM-DD), the fallback dedup key.
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl BransjekursCompletion {
    fn validate(&self) -> Result<()> {
        if self.external_id.trim().is_empty() {
            return Err(AppError::BadRequest("externalId must not be empty".into()));
        }
        if self.course_code.trim().is_empty() {
            return Err(AppError::BadRequest("courseCode must not be empty".into()));
        }
        if let Some(score) = self.score
            && !(0.0..=100.0).contains(&score)
        {
            return Err(AppError::BadRequest("score must be between 0 and 100".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookOutcome {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

/// Ingest a course completion from bransjekurs.
///
/// The whole import runs in one immediate transaction keyed for idempotence
/// on (provider, externalId): a replayed delivery answers with the original
/// enrollment id and writes nothing. Persons are deduplicated by lowercased
/// email, falling back to name + birth date; enrollments land in the course's
/// shared digital session. An unknown course code fails with 404 before the
/// event is recorded, so the sender can retry once the course exists.
pub async fn handle_bransjekurs_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>> {
    let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    match (state.webhook_api_key.as_deref(), presented) {
        (Some(expected), Some(presented)) if presented == expected => {}
        (None, _) => {
            tracing::warn!("bransjekurs webhook received but no webhook key is configured");
            return Err(AppError::Unauthorized("Webhook key not configured".into()));
        }
        _ => return Err(AppError::Unauthorized("Invalid webhook key".into())),
    }

    let payload: BransjekursCompletion = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid payload: {}", e)))?;
    payload.validate()?;

    let participant = CreatePerson {
        first_name: payload.participant.first_name.clone(),
        last_name: payload.participant.last_name.clone(),
        email: payload.participant.email.clone(),
        birth_date: payload.participant.birth_date.clone(),
        phone: payload.participant.phone.clone(),
    };
    participant.validate()?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Course must exist before anything is recorded; a 404 here leaves no
    // trace so the delivery can be retried after the course is created.
    let course =
        queries::get_course_by_code(&tx, &payload.course_code)?.or_not_found(msg::COURSE_NOT_FOUND)?;

    if !queries::try_record_webhook_event(&tx, PROVIDER, &payload.external_id)? {
        let enrollment_id = queries::get_webhook_event(&tx, PROVIDER, &payload.external_id)?
            .and_then(|event| event.enrollment_id);
        tracing::info!(
            external_id = %payload.external_id,
            "duplicate bransjekurs delivery ignored"
        );
        return Ok(Json(WebhookOutcome {
            status: "already_processed",
            person_id: None,
            enrollment_id,
            credential_id: None,
        }));
    }

    let person = find_or_create_person(&tx, &participant)?;
    let session = queries::find_or_create_digital_session(&tx, &course.id, payload.completed_at)?;

    let enrollment = match queries::find_enrollment(&tx, &person.id, &session.id)? {
        Some(enrollment) => enrollment,
        None => queries::create_enrollment(&tx, &person.id, &session.id, PROVIDER)?,
    };
    queries::complete_enrollment(&tx, &enrollment.id, payload.completed_at)?;

    if queries::get_assessment_for_enrollment(&tx, &enrollment.id)?.is_none() {
        queries::insert_assessment(
            &tx,
            &enrollment.id,
            payload.passed,
            payload.score,
            payload.completed_at,
        )?;
    }

    // A still-usable credential is reused; an expired one is not, so a fresh
    // completion after lapse issues a renewal.
    let credential_id = if payload.passed {
        let existing = queries::find_credential(&tx, &person.id, &course.id)?
            .filter(|credential| credential.resolve(queries::now()).is_valid);
        let credential = match existing {
            Some(credential) => credential,
            None => {
                let validity_months = course.validity_months.and_then(|m| u32::try_from(m).ok());
                let valid_to = expiry_after_months(payload.completed_at, validity_months);
                queries::insert_credential(
                    &tx,
                    &person.id,
                    &course.id,
                    Some(&enrollment.id),
                    &generate_verification_code(),
                    payload.completed_at,
                    valid_to,
                    course.grace_days,
                )?
            }
        };
        Some(credential.id)
    } else {
        None
    };

    queries::set_webhook_event_enrollment(&tx, PROVIDER, &payload.external_id, &enrollment.id)?;
    tx.commit()?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Webhook, Some(PROVIDER), None)
        .action(AuditAction::ReceiveCompletionWebhook)
        .resource("enrollment", &enrollment.id)
        .resource_name(&person.full_name())
        .details(&json!({
            "external_id": payload.external_id,
            "course_code": course.code,
            "person_id": person.id,
            "passed": payload.passed,
            "credential_id": credential_id,
        }))
        .save()?;

    tracing::info!(
        external_id = %payload.external_id,
        course = %course.code,
        person = %person.id,
        passed = payload.passed,
        "bransjekurs completion processed"
    );

    Ok(Json(WebhookOutcome {
        status: "processed",
        person_id: Some(person.id),
        enrollment_id: Some(enrollment.id),
        credential_id,
    }))
}

fn find_or_create_person(conn: &Connection, input: &CreatePerson) -> Result<Person> {
    if let Some(email) = input.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
        && let Some(person) = queries::get_person_by_email(conn, email)?
    {
        return Ok(person);
    }
    if let Some(birth_date) = input.birth_date.as_deref()
        && let Some(person) = queries::find_person_by_name_and_birth(
            conn,
            &input.first_name,
            &input.last_name,
            birth_date,
        )?
    {
        return Ok(person);
    }
    queries::create_person(conn, input)
}
