use axum::extract::State;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::validity::ResolvedValidity;

/// Everything the public certificate page needs to render. Deliberately
/// omits email, birth date and internal ids beyond the code itself.
#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub verification_code: String,
    pub person_name: String,
    pub course_name: String,
    pub course_code: String,
    pub valid_from: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<i64>,
    pub validity: ResolvedValidity,
}

pub async fn verify_credential(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<VerificationResponse>> {
    let conn = state.db.get()?;

    let credential = queries::get_credential_by_code(&conn, &code)?
        .or_not_found(msg::CREDENTIAL_NOT_FOUND)?;
    let person = queries::get_person_by_id(&conn, &credential.person_id)?
        .or_not_found(msg::PERSON_NOT_FOUND)?;
    let course = queries::get_course_by_id(&conn, &credential.course_id)?
        .or_not_found(msg::COURSE_NOT_FOUND)?;

    let validity = credential.resolve(queries::now());

    Ok(Json(VerificationResponse {
        verification_code: credential.verification_code,
        person_name: person.full_name(),
        course_name: course.name,
        course_code: course.code,
        valid_from: credential.valid_from,
        valid_to: credential.valid_to,
        validity,
    }))
}
