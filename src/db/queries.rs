use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, types::Value};
use uuid::Uuid;

use crate::crypto::hash_secret;
use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    ACCESS_CARD_COLS, ADMIN_API_KEY_COLS, ADMIN_USER_COLS, ASSESSMENT_COLS, AUDIT_LOG_COLS,
    COMPANY_COLS, COURSE_COLS, CREDENTIAL_COLS, DOCUMENT_COLS, ENROLLMENT_COLS, KPI_COLS,
    LICENSE_ACTIVITY_COLS, LICENSE_COLS, PERSON_COLS, POLICY_ACK_COLS, PRODUCT_LICENSE_COLS,
    SESSION_COLS, VALIDATION_RECORD_COLS, query_all, query_one,
};
use crate::validity::{CredentialStatus, EXPIRY_WARNING_DAYS, SECONDS_PER_DAY};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

pub fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builder for dynamic UPDATE statements with optional fields.
/// Combines multiple field updates into a single query for efficiency.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a column to an explicit value (including NULL).
    /// Use this for Option<T> where Some(v) = set to v, None = set to NULL.
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    /// Execute the update and return the updated entity using RETURNING clause.
    /// Returns None if no rows matched (entity not found or no fields to update).
    fn execute_returning<T: super::from_row::FromRow>(
        mut self,
        conn: &Connection,
        returning_cols: &str,
    ) -> Result<Option<T>> {
        if self.fields.is_empty() {
            return Ok(None);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? RETURNING {}",
            self.table,
            sets.join(", "),
            returning_cols
        );
        conn.query_row(&sql, rusqlite::params_from_iter(values), T::from_row)
            .optional()
            .map_err(Into::into)
    }
}

// ============ Companies ============

/// Create a company row. New companies start in TRIAL; the licensing layer
/// creates the matching trial license in the same transaction.
pub fn create_company(conn: &Connection, input: &CreateCompany) -> Result<Company> {
    let id = gen_id();
    let now = now();
    let contact_email = input.contact_email.as_ref().map(|e| e.trim().to_lowercase());

    conn.execute(
        "INSERT INTO companies (id, name, org_number, contact_email, license_status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            &id,
            &input.name,
            &input.org_number,
            &contact_email,
            LicenseStatus::Trial.as_ref(),
            now
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict("A company with this organization number already exists".into())
        }
        other => other.into(),
    })?;

    Ok(Company {
        id,
        name: input.name.clone(),
        org_number: input.org_number.clone(),
        contact_email,
        license_status: LicenseStatus::Trial,
        suspended_at: None,
        suspended_reason: None,
        current_license_id: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_company_by_id(conn: &Connection, id: &str) -> Result<Option<Company>> {
    query_one(
        conn,
        &format!("SELECT {} FROM companies WHERE id = ?1", COMPANY_COLS),
        &[&id],
    )
}

pub fn list_companies_paginated(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Company>, i64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM companies", [], |row| row.get(0))?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM companies ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            COMPANY_COLS
        ),
        params![limit, offset],
    )?;
    Ok((items, total))
}

/// Update contact fields. License state is never touched here; the state
/// machine owns those columns.
pub fn update_company(
    conn: &Connection,
    id: &str,
    input: &UpdateCompany,
) -> Result<Option<Company>> {
    let contact_email = input.contact_email.as_ref().map(|e| e.trim().to_lowercase());
    UpdateBuilder::new("companies", id)
        .with_updated_at()
        .set_opt("name", input.name.clone())
        .set_opt("org_number", input.org_number.clone())
        .set_opt("contact_email", contact_email)
        .execute_returning(conn, COMPANY_COLS)
}

// ============ Licenses ============

/// Insert a license row. Called from inside the licensing-layer transaction.
pub fn insert_license(
    conn: &Connection,
    company_id: &str,
    plan_name: Option<&str>,
    status: LicenseStatus,
    start_date: i64,
    end_date: Option<i64>,
    grace_period_days: i64,
) -> Result<License> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO licenses (id, company_id, plan_name, status, start_date, end_date, grace_period_days, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            &id,
            company_id,
            plan_name,
            status.as_ref(),
            start_date,
            end_date,
            grace_period_days,
            now
        ],
    )?;

    Ok(License {
        id,
        company_id: company_id.to_string(),
        plan_name: plan_name.map(String::from),
        status,
        start_date,
        end_date,
        grace_period_days,
        suspended_at: None,
        suspended_reason: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_license_by_id(conn: &Connection, id: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        &[&id],
    )
}

pub fn list_licenses_for_company(conn: &Connection, company_id: &str) -> Result<Vec<License>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses WHERE company_id = ?1 ORDER BY created_at DESC",
            LICENSE_COLS
        ),
        &[&company_id],
    )
}

/// Point a company at its current license and mirror the license status.
pub fn set_company_current_license(
    conn: &Connection,
    company_id: &str,
    license_id: &str,
    status: LicenseStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE companies SET current_license_id = ?1, license_status = ?2, updated_at = ?3 WHERE id = ?4",
        params![license_id, status.as_ref(), now(), company_id],
    )?;
    Ok(())
}

/// Mark a license suspended. The companion company update is
/// `suspend_company_row`; both run inside one transaction.
pub fn suspend_license_row(
    conn: &Connection,
    license_id: &str,
    reason: &str,
    at: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE licenses SET status = ?1, suspended_at = ?2, suspended_reason = ?3, updated_at = ?2 WHERE id = ?4",
        params![LicenseStatus::Suspended.as_ref(), at, reason, license_id],
    )?;
    Ok(())
}

pub fn suspend_company_row(
    conn: &Connection,
    company_id: &str,
    reason: &str,
    at: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE companies SET license_status = ?1, suspended_at = ?2, suspended_reason = ?3, updated_at = ?2 WHERE id = ?4",
        params![LicenseStatus::Suspended.as_ref(), at, reason, company_id],
    )?;
    Ok(())
}

/// Clear suspension state and restore a license to `status` with the final
/// end date (NULL keeps it perpetual).
pub fn resume_license_row(
    conn: &Connection,
    license_id: &str,
    status: LicenseStatus,
    end_date: Option<i64>,
    at: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE licenses SET status = ?1, end_date = ?2, suspended_at = NULL, suspended_reason = NULL, updated_at = ?3 WHERE id = ?4",
        params![status.as_ref(), end_date, at, license_id],
    )?;
    Ok(())
}

pub fn resume_company_row(
    conn: &Connection,
    company_id: &str,
    status: LicenseStatus,
    at: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE companies SET license_status = ?1, suspended_at = NULL, suspended_reason = NULL, updated_at = ?2 WHERE id = ?3",
        params![status.as_ref(), at, company_id],
    )?;
    Ok(())
}

/// Append a license activity row. The trail is append-only; there is no
/// update or delete path.
pub fn insert_license_activity(
    conn: &Connection,
    license_id: &str,
    company_id: &str,
    action: ActivityAction,
    performed_by: &str,
    details: Option<&str>,
) -> Result<LicenseActivity> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO license_activities (id, license_id, company_id, action, performed_by, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![&id, license_id, company_id, action.as_ref(), performed_by, details, now],
    )?;

    Ok(LicenseActivity {
        id,
        license_id: license_id.to_string(),
        company_id: company_id.to_string(),
        action,
        performed_by: performed_by.to_string(),
        details: details.map(String::from),
        created_at: now,
    })
}

/// Activity across all of a company's licenses, newest first.
pub fn list_company_activities(
    conn: &Connection,
    company_id: &str,
    limit: i64,
) -> Result<Vec<LicenseActivity>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM license_activities WHERE company_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            LICENSE_ACTIVITY_COLS
        ),
        params![company_id, limit],
    )
}

// ============ Persons ============

pub fn create_person(conn: &Connection, input: &CreatePerson) -> Result<Person> {
    let id = gen_id();
    let now = now();
    let email = input.email.as_ref().map(|e| e.trim().to_lowercase());

    conn.execute(
        "INSERT INTO persons (id, first_name, last_name, email, birth_date, phone, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            &id,
            &input.first_name,
            &input.last_name,
            &email,
            &input.birth_date,
            &input.phone,
            now
        ],
    )?;

    Ok(Person {
        id,
        first_name: input.first_name.clone(),
        last_name: input.last_name.clone(),
        email,
        birth_date: input.birth_date.clone(),
        phone: input.phone.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_person_by_id(conn: &Connection, id: &str) -> Result<Option<Person>> {
    query_one(
        conn,
        &format!("SELECT {} FROM persons WHERE id = ?1", PERSON_COLS),
        &[&id],
    )
}

pub fn get_person_by_email(conn: &Connection, email: &str) -> Result<Option<Person>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!("SELECT {} FROM persons WHERE email = ?1", PERSON_COLS),
        &[&email],
    )
}

/// Fallback dedup key for webhook deliveries without an email address.
pub fn find_person_by_name_and_birth(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    birth_date: &str,
) -> Result<Option<Person>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM persons WHERE first_name = ?1 AND last_name = ?2 AND birth_date = ?3",
            PERSON_COLS
        ),
        &[&first_name, &last_name, &birth_date],
    )
}

pub fn list_persons_paginated(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Person>, i64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM persons", [], |row| row.get(0))?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM persons ORDER BY last_name, first_name LIMIT ?1 OFFSET ?2",
            PERSON_COLS
        ),
        params![limit, offset],
    )?;
    Ok((items, total))
}

pub fn update_person(conn: &Connection, id: &str, input: &UpdatePerson) -> Result<Option<Person>> {
    let email = input.email.as_ref().map(|e| e.trim().to_lowercase());
    UpdateBuilder::new("persons", id)
        .with_updated_at()
        .set_opt("first_name", input.first_name.clone())
        .set_opt("last_name", input.last_name.clone())
        .set_opt("email", email)
        .set_opt("birth_date", input.birth_date.clone())
        .set_opt("phone", input.phone.clone())
        .execute_returning(conn, PERSON_COLS)
}

/// Hard delete for GDPR erasure. Child rows cascade via foreign keys.
pub fn delete_person(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM persons WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn create_document(
    conn: &Connection,
    person_id: &str,
    input: &CreateDocument,
) -> Result<Document> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO documents (id, person_id, title, category, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, person_id, &input.title, &input.category, now],
    )?;

    Ok(Document {
        id,
        person_id: person_id.to_string(),
        title: input.title.clone(),
        category: input.category.clone(),
        created_at: now,
    })
}

pub fn list_documents_for_person(conn: &Connection, person_id: &str) -> Result<Vec<Document>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM documents WHERE person_id = ?1 ORDER BY created_at DESC",
            DOCUMENT_COLS
        ),
        &[&person_id],
    )
}

pub fn create_access_card(
    conn: &Connection,
    person_id: &str,
    input: &CreateAccessCard,
) -> Result<AccessCard> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO access_cards (id, person_id, card_number, issued_at, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?4)",
        params![&id, person_id, &input.card_number, now, input.expires_at],
    )?;

    Ok(AccessCard {
        id,
        person_id: person_id.to_string(),
        card_number: input.card_number.clone(),
        issued_at: now,
        expires_at: input.expires_at,
        created_at: now,
    })
}

pub fn list_access_cards_for_person(conn: &Connection, person_id: &str) -> Result<Vec<AccessCard>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM access_cards WHERE person_id = ?1 ORDER BY issued_at DESC",
            ACCESS_CARD_COLS
        ),
        &[&person_id],
    )
}

pub fn create_policy_acknowledgment(
    conn: &Connection,
    person_id: &str,
    input: &CreatePolicyAcknowledgment,
) -> Result<PolicyAcknowledgment> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO policy_acknowledgments (id, person_id, policy_name, acknowledged_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![&id, person_id, &input.policy_name, now],
    )?;

    Ok(PolicyAcknowledgment {
        id,
        person_id: person_id.to_string(),
        policy_name: input.policy_name.clone(),
        acknowledged_at: now,
    })
}

pub fn list_policy_acks_for_person(
    conn: &Connection,
    person_id: &str,
) -> Result<Vec<PolicyAcknowledgment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM policy_acknowledgments WHERE person_id = ?1 ORDER BY acknowledged_at DESC",
            POLICY_ACK_COLS
        ),
        &[&person_id],
    )
}

// ============ Courses & Sessions ============

pub fn create_course(conn: &Connection, input: &CreateCourse) -> Result<Course> {
    let id = gen_id();
    let now = now();
    let grace_days = input.grace_days.unwrap_or(0);

    conn.execute(
        "INSERT INTO courses (id, code, name, description, validity_months, grace_days, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            &id,
            &input.code,
            &input.name,
            &input.description,
            input.validity_months,
            grace_days,
            now
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(format!("Course code '{}' already exists", input.code))
        }
        other => other.into(),
    })?;

    Ok(Course {
        id,
        code: input.code.clone(),
        name: input.name.clone(),
        description: input.description.clone(),
        validity_months: input.validity_months,
        grace_days,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_course_by_id(conn: &Connection, id: &str) -> Result<Option<Course>> {
    query_one(
        conn,
        &format!("SELECT {} FROM courses WHERE id = ?1", COURSE_COLS),
        &[&id],
    )
}

pub fn get_course_by_code(conn: &Connection, code: &str) -> Result<Option<Course>> {
    query_one(
        conn,
        &format!("SELECT {} FROM courses WHERE code = ?1", COURSE_COLS),
        &[&code],
    )
}

pub fn list_courses(conn: &Connection) -> Result<Vec<Course>> {
    query_all(
        conn,
        &format!("SELECT {} FROM courses ORDER BY code", COURSE_COLS),
        &[],
    )
}

pub fn update_course(conn: &Connection, id: &str, input: &UpdateCourse) -> Result<Option<Course>> {
    UpdateBuilder::new("courses", id)
        .with_updated_at()
        .set_opt("name", input.name.clone())
        .set_opt("description", input.description.clone())
        .set_opt("validity_months", input.validity_months)
        .set_opt("grace_days", input.grace_days)
        .execute_returning(conn, COURSE_COLS)
}

pub fn create_session(
    conn: &Connection,
    course_id: &str,
    input: &CreateSession,
) -> Result<CourseSession> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO course_sessions (id, course_id, kind, starts_at, ends_at, location, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &id,
            course_id,
            input.kind.as_ref(),
            input.starts_at,
            input.ends_at,
            &input.location,
            now
        ],
    )?;

    Ok(CourseSession {
        id,
        course_id: course_id.to_string(),
        kind: input.kind,
        starts_at: input.starts_at,
        ends_at: input.ends_at,
        location: input.location.clone(),
        created_at: now,
    })
}

pub fn get_session_by_id(conn: &Connection, id: &str) -> Result<Option<CourseSession>> {
    query_one(
        conn,
        &format!("SELECT {} FROM course_sessions WHERE id = ?1", SESSION_COLS),
        &[&id],
    )
}

pub fn list_sessions_for_course(conn: &Connection, course_id: &str) -> Result<Vec<CourseSession>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM course_sessions WHERE course_id = ?1 ORDER BY starts_at DESC",
            SESSION_COLS
        ),
        &[&course_id],
    )
}

/// Digital completions reported by the webhook land in one shared session
/// per course rather than one synthetic session per completion.
pub fn find_or_create_digital_session(
    conn: &Connection,
    course_id: &str,
    starts_at: i64,
) -> Result<CourseSession> {
    let existing: Option<CourseSession> = query_one(
        conn,
        &format!(
            "SELECT {} FROM course_sessions WHERE course_id = ?1 AND kind = ?2 LIMIT 1",
            SESSION_COLS
        ),
        params![course_id, SessionKind::Digital.as_ref()],
    )?;
    if let Some(session) = existing {
        return Ok(session);
    }
    create_session(
        conn,
        course_id,
        &CreateSession {
            kind: SessionKind::Digital,
            starts_at,
            ends_at: None,
            location: None,
        },
    )
}

// ============ Enrollments & Assessments ============

pub fn create_enrollment(
    conn: &Connection,
    person_id: &str,
    session_id: &str,
    source: &str,
) -> Result<Enrollment> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO enrollments (id, person_id, session_id, source, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, person_id, session_id, source, now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict("Person is already enrolled in this session".into())
        }
        other => other.into(),
    })?;

    Ok(Enrollment {
        id,
        person_id: person_id.to_string(),
        session_id: session_id.to_string(),
        source: source.to_string(),
        completed_at: None,
        created_at: now,
    })
}

pub fn get_enrollment_by_id(conn: &Connection, id: &str) -> Result<Option<Enrollment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM enrollments WHERE id = ?1", ENROLLMENT_COLS),
        &[&id],
    )
}

pub fn find_enrollment(
    conn: &Connection,
    person_id: &str,
    session_id: &str,
) -> Result<Option<Enrollment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM enrollments WHERE person_id = ?1 AND session_id = ?2",
            ENROLLMENT_COLS
        ),
        &[&person_id, &session_id],
    )
}

pub fn list_enrollments_for_person(conn: &Connection, person_id: &str) -> Result<Vec<Enrollment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM enrollments WHERE person_id = ?1 ORDER BY created_at DESC",
            ENROLLMENT_COLS
        ),
        &[&person_id],
    )
}

pub fn list_enrollments_for_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<Enrollment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM enrollments WHERE session_id = ?1 ORDER BY created_at",
            ENROLLMENT_COLS
        ),
        &[&session_id],
    )
}

pub fn complete_enrollment(conn: &Connection, id: &str, completed_at: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE enrollments SET completed_at = ?1 WHERE id = ?2 AND completed_at IS NULL",
        params![completed_at, id],
    )?;
    Ok(affected > 0)
}

pub fn insert_assessment(
    conn: &Connection,
    enrollment_id: &str,
    passed: bool,
    score: Option<f64>,
    assessed_at: i64,
) -> Result<Assessment> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO assessments (id, enrollment_id, passed, score, assessed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, enrollment_id, passed, score, assessed_at, now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict("Enrollment already has an assessment".into())
        }
        other => other.into(),
    })?;

    Ok(Assessment {
        id,
        enrollment_id: enrollment_id.to_string(),
        passed,
        score,
        assessed_at,
        created_at: now,
    })
}

pub fn get_assessment_for_enrollment(
    conn: &Connection,
    enrollment_id: &str,
) -> Result<Option<Assessment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM assessments WHERE enrollment_id = ?1",
            ASSESSMENT_COLS
        ),
        &[&enrollment_id],
    )
}

// ============ Credentials ============

/// Insert a credential with the course policy frozen in. The verification
/// code is generated by the caller so the webhook and admin paths share one
/// format.
#[allow(clippy::too_many_arguments)]
pub fn insert_credential(
    conn: &Connection,
    person_id: &str,
    course_id: &str,
    enrollment_id: Option<&str>,
    verification_code: &str,
    valid_from: i64,
    valid_to: Option<i64>,
    grace_days: i64,
) -> Result<Credential> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO credentials (id, person_id, course_id, enrollment_id, verification_code, valid_from, valid_to, grace_days, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            person_id,
            course_id,
            enrollment_id,
            verification_code,
            valid_from,
            valid_to,
            grace_days,
            now
        ],
    )?;

    Ok(Credential {
        id,
        person_id: person_id.to_string(),
        course_id: course_id.to_string(),
        enrollment_id: enrollment_id.map(String::from),
        verification_code: verification_code.to_string(),
        valid_from,
        valid_to,
        grace_days,
        created_at: now,
    })
}

pub fn get_credential_by_id(conn: &Connection, id: &str) -> Result<Option<Credential>> {
    query_one(
        conn,
        &format!("SELECT {} FROM credentials WHERE id = ?1", CREDENTIAL_COLS),
        &[&id],
    )
}

pub fn get_credential_by_code(conn: &Connection, code: &str) -> Result<Option<Credential>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM credentials WHERE verification_code = ?1",
            CREDENTIAL_COLS
        ),
        &[&code],
    )
}

/// Most recent credential for a person/course pair; the webhook reuses it
/// instead of issuing a duplicate.
pub fn find_credential(
    conn: &Connection,
    person_id: &str,
    course_id: &str,
) -> Result<Option<Credential>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM credentials WHERE person_id = ?1 AND course_id = ?2 ORDER BY created_at DESC LIMIT 1",
            CREDENTIAL_COLS
        ),
        &[&person_id, &course_id],
    )
}

pub fn list_credentials_for_person(conn: &Connection, person_id: &str) -> Result<Vec<Credential>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM credentials WHERE person_id = ?1 ORDER BY created_at DESC",
            CREDENTIAL_COLS
        ),
        &[&person_id],
    )
}

pub fn list_credentials_paginated(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Credential>, i64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM credentials ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            CREDENTIAL_COLS
        ),
        params![limit, offset],
    )?;
    Ok((items, total))
}

/// Page of credentials in one resolved status, using the same arithmetic as
/// `resolve_status` so the filter and the per-row resolution never disagree.
/// `expired` covers both in-grace and fully lapsed credentials, matching the
/// resolver's reported status.
pub fn list_credentials_by_status(
    conn: &Connection,
    status: CredentialStatus,
    now: i64,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Credential>, i64)> {
    let warning_window = EXPIRY_WARNING_DAYS * SECONDS_PER_DAY;
    let clause = match status {
        CredentialStatus::Valid => "(valid_to IS NULL OR (?1 <= valid_to AND valid_to - ?1 > ?2))",
        CredentialStatus::ExpiringSoon => {
            "(valid_to IS NOT NULL AND ?1 <= valid_to AND valid_to - ?1 <= ?2)"
        }
        CredentialStatus::Expired => "(valid_to IS NOT NULL AND ?1 > valid_to)",
    };
    // The expired clause never references the window parameter
    let filter_params: [&dyn rusqlite::ToSql; 2] = [&now, &warning_window];
    let count_params = match status {
        CredentialStatus::Expired => &filter_params[..1],
        _ => &filter_params[..],
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM credentials WHERE {}", clause),
        count_params,
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM credentials WHERE {} ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
            CREDENTIAL_COLS, clause
        ),
        params![now, warning_window, limit, offset],
    )?;
    Ok((items, total))
}

// ============ Product Licenses ============

pub fn insert_product_license(
    conn: &Connection,
    input: &CreateProductLicense,
    license_key: &str,
    validation_token_hash: &str,
) -> Result<ProductLicense> {
    let id = gen_id();
    let now = now();
    let max_users = input.max_users.unwrap_or(10);
    let max_bookings = input.max_bookings_per_month.unwrap_or(1000);
    let features = input
        .features
        .as_ref()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "{}".to_string());
    let customer_email = input.customer_email.as_ref().map(|e| e.trim().to_lowercase());

    conn.execute(
        "INSERT INTO product_licenses (id, product_name, customer_name, customer_email, license_key, validation_token_hash, allowed_domain, max_users, max_bookings_per_month, features, active, expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, ?12, ?12)",
        params![
            &id,
            &input.product_name,
            &input.customer_name,
            &customer_email,
            license_key,
            validation_token_hash,
            &input.allowed_domain,
            max_users,
            max_bookings,
            &features,
            input.expires_at,
            now
        ],
    )?;

    Ok(ProductLicense {
        id,
        product_name: input.product_name.clone(),
        customer_name: input.customer_name.clone(),
        customer_email,
        license_key: license_key.to_string(),
        validation_token_hash: validation_token_hash.to_string(),
        allowed_domain: input.allowed_domain.clone(),
        max_users,
        max_bookings_per_month: max_bookings,
        features,
        active: true,
        expires_at: input.expires_at,
        activated_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_product_license_by_id(conn: &Connection, id: &str) -> Result<Option<ProductLicense>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM product_licenses WHERE id = ?1",
            PRODUCT_LICENSE_COLS
        ),
        &[&id],
    )
}

pub fn get_product_license_by_key(
    conn: &Connection,
    license_key: &str,
) -> Result<Option<ProductLicense>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM product_licenses WHERE license_key = ?1",
            PRODUCT_LICENSE_COLS
        ),
        &[&license_key],
    )
}

pub fn list_product_licenses_paginated(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ProductLicense>, i64)> {
    let total: i64 =
        conn.query_row("SELECT COUNT(*) FROM product_licenses", [], |row| row.get(0))?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM product_licenses ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            PRODUCT_LICENSE_COLS
        ),
        params![limit, offset],
    )?;
    Ok((items, total))
}

pub fn update_product_license(
    conn: &Connection,
    id: &str,
    input: &UpdateProductLicense,
) -> Result<Option<ProductLicense>> {
    let features = input.features.as_ref().map(|f| f.to_string());
    let customer_email = input.customer_email.as_ref().map(|e| e.trim().to_lowercase());
    let mut builder = UpdateBuilder::new("product_licenses", id)
        .with_updated_at()
        .set_opt("customer_name", input.customer_name.clone())
        .set_opt("customer_email", customer_email)
        .set_opt("max_users", input.max_users)
        .set_opt("max_bookings_per_month", input.max_bookings_per_month)
        .set_opt("features", features)
        .set_opt("active", input.active);

    // Tri-state fields: absent = unchanged, null = clear, value = set
    if let Some(ref allowed_domain) = input.allowed_domain {
        builder = builder.set_nullable("allowed_domain", allowed_domain.clone());
    }
    if let Some(expires_at) = input.expires_at {
        builder = builder.set_nullable("expires_at", expires_at);
    }

    builder.execute_returning(conn, PRODUCT_LICENSE_COLS)
}

/// The first successful validation stamps the activation time; later ones
/// leave it untouched.
pub fn mark_product_license_activated(conn: &Connection, id: &str, at: i64) -> Result<()> {
    conn.execute(
        "UPDATE product_licenses SET activated_at = ?1, updated_at = ?1 WHERE id = ?2 AND activated_at IS NULL",
        params![at, id],
    )?;
    Ok(())
}

pub fn insert_validation_record(
    conn: &Connection,
    product_license_id: Option<&str>,
    license_key: &str,
    success: bool,
    failure_reason: Option<&str>,
    source_ip: Option<&str>,
    source_domain: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO validation_records (id, product_license_id, license_key, success, failure_reason, source_ip, source_domain, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &gen_id(),
            product_license_id,
            license_key,
            success,
            failure_reason,
            source_ip,
            source_domain,
            now()
        ],
    )?;
    Ok(())
}

pub fn list_validation_records(
    conn: &Connection,
    product_license_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ValidationRecord>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM validation_records WHERE product_license_id = ?1",
        params![product_license_id],
        |row| row.get(0),
    )?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM validation_records WHERE product_license_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            VALIDATION_RECORD_COLS
        ),
        params![product_license_id, limit, offset],
    )?;
    Ok((items, total))
}

// ============ KPIs ============

pub fn insert_kpi(
    conn: &Connection,
    metric: &str,
    value: f64,
    note: Option<&str>,
    computed_at: i64,
) -> Result<Kpi> {
    let id = gen_id();

    conn.execute(
        "INSERT INTO kpis (id, metric, value, note, computed_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, metric, value, note, computed_at],
    )?;

    Ok(Kpi {
        id,
        metric: metric.to_string(),
        value,
        note: note.map(String::from),
        computed_at,
    })
}

pub fn list_kpis(conn: &Connection, metric: Option<&str>, limit: i64) -> Result<Vec<Kpi>> {
    match metric {
        Some(metric) => query_all(
            conn,
            &format!(
                "SELECT {} FROM kpis WHERE metric = ?1 ORDER BY computed_at DESC LIMIT ?2",
                KPI_COLS
            ),
            params![metric, limit],
        ),
        None => query_all(
            conn,
            &format!(
                "SELECT {} FROM kpis ORDER BY computed_at DESC LIMIT ?1",
                KPI_COLS
            ),
            params![limit],
        ),
    }
}

/// Latest snapshot per metric.
pub fn latest_kpis(conn: &Connection) -> Result<Vec<Kpi>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM kpis WHERE id IN (
                 SELECT inner_kpis.id FROM kpis AS inner_kpis
                 WHERE inner_kpis.metric = kpis.metric
                 ORDER BY inner_kpis.computed_at DESC, inner_kpis.id DESC LIMIT 1
             ) ORDER BY metric",
            KPI_COLS
        ),
        &[],
    )
}

fn count_metric(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<f64> {
    let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(n as f64)
}

/// Recompute the standard metric set and append one snapshot row per metric.
/// Credential counts apply the same grace rule as the validity resolver:
/// a credential is live while `now <= valid_to + grace_days`.
pub fn recalculate_kpis(conn: &Connection, now: i64) -> Result<Vec<Kpi>> {
    let warning_window = EXPIRY_WARNING_DAYS * SECONDS_PER_DAY;
    let mut snapshots = Vec::new();

    let credentials_active = count_metric(
        conn,
        "SELECT COUNT(*) FROM credentials WHERE valid_to IS NULL OR ?1 <= valid_to + grace_days * 86400",
        params![now],
    )?;
    snapshots.push(insert_kpi(
        conn,
        metrics::CREDENTIALS_ACTIVE,
        credentials_active,
        None,
        now,
    )?);

    let credentials_expired = count_metric(
        conn,
        "SELECT COUNT(*) FROM credentials WHERE valid_to IS NOT NULL AND ?1 > valid_to + grace_days * 86400",
        params![now],
    )?;
    snapshots.push(insert_kpi(
        conn,
        metrics::CREDENTIALS_EXPIRED,
        credentials_expired,
        None,
        now,
    )?);

    let expiring_soon = count_metric(
        conn,
        "SELECT COUNT(*) FROM credentials WHERE valid_to IS NOT NULL AND ?1 <= valid_to AND valid_to - ?1 <= ?2",
        params![now, warning_window],
    )?;
    snapshots.push(insert_kpi(
        conn,
        metrics::CREDENTIALS_EXPIRING_30D,
        expiring_soon,
        None,
        now,
    )?);

    let completions = count_metric(
        conn,
        "SELECT COUNT(*) FROM enrollments WHERE completed_at IS NOT NULL AND completed_at >= ?1",
        params![now - 30 * SECONDS_PER_DAY],
    )?;
    snapshots.push(insert_kpi(
        conn,
        metrics::COMPLETIONS_30D,
        completions,
        None,
        now,
    )?);

    let companies_active = count_metric(
        conn,
        "SELECT COUNT(*) FROM companies WHERE license_status IN ('TRIAL', 'ACTIVE')",
        &[],
    )?;
    snapshots.push(insert_kpi(
        conn,
        metrics::COMPANIES_ACTIVE,
        companies_active,
        None,
        now,
    )?);

    let companies_suspended = count_metric(
        conn,
        "SELECT COUNT(*) FROM companies WHERE license_status = 'SUSPENDED'",
        &[],
    )?;
    snapshots.push(insert_kpi(
        conn,
        metrics::COMPANIES_SUSPENDED,
        companies_suspended,
        None,
        now,
    )?);

    // Success rate only makes sense when there were attempts
    let (total, successes): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(success), 0) FROM validation_records WHERE created_at >= ?1",
        params![now - 7 * SECONDS_PER_DAY],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if total > 0 {
        let rate = successes as f64 / total as f64;
        snapshots.push(insert_kpi(
            conn,
            metrics::VALIDATION_SUCCESS_RATE_7D,
            rate,
            Some(&format!("{} of {} attempts", successes, total)),
            now,
        )?);
    }

    Ok(snapshots)
}

// ============ Admin Users ============

pub fn create_admin_user(conn: &Connection, input: &CreateAdminUser) -> Result<AdminUser> {
    let id = gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO admin_users (id, email, name, role, totp_enabled, active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, 1, ?5, ?5)",
        params![&id, &email, &input.name, input.role.as_ref(), now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(format!("Admin user with email '{}' already exists", email))
        }
        other => other.into(),
    })?;

    Ok(AdminUser {
        id,
        email,
        name: input.name.clone(),
        role: input.role,
        totp_secret_enc: None,
        totp_enabled: false,
        active: true,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_admin_user_by_id(conn: &Connection, id: &str) -> Result<Option<AdminUser>> {
    query_one(
        conn,
        &format!("SELECT {} FROM admin_users WHERE id = ?1", ADMIN_USER_COLS),
        &[&id],
    )
}

pub fn get_admin_user_by_email(conn: &Connection, email: &str) -> Result<Option<AdminUser>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!(
            "SELECT {} FROM admin_users WHERE email = ?1",
            ADMIN_USER_COLS
        ),
        &[&email],
    )
}

pub fn list_admin_users(conn: &Connection) -> Result<Vec<AdminUser>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM admin_users ORDER BY created_at",
            ADMIN_USER_COLS
        ),
        &[],
    )
}

pub fn count_admin_users(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM admin_users", [], |row| row.get(0))
        .map_err(Into::into)
}

pub fn update_admin_user(
    conn: &Connection,
    id: &str,
    input: &UpdateAdminUser,
) -> Result<Option<AdminUser>> {
    UpdateBuilder::new("admin_users", id)
        .with_updated_at()
        .set_opt("name", input.name.clone())
        .set_opt("role", input.role.map(|r| r.as_ref().to_string()))
        .set_opt("active", input.active)
        .execute_returning(conn, ADMIN_USER_COLS)
}

/// Store a freshly enrolled TOTP secret (encrypted). Enrollment resets
/// totp_enabled; the code verification step flips it back on.
pub fn set_totp_secret(conn: &Connection, user_id: &str, secret_enc: &[u8]) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE admin_users SET totp_secret_enc = ?1, totp_enabled = 0, updated_at = ?2 WHERE id = ?3",
        params![secret_enc, now(), user_id],
    )?;
    Ok(affected > 0)
}

pub fn enable_totp(conn: &Connection, user_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE admin_users SET totp_enabled = 1, updated_at = ?1 WHERE id = ?2 AND totp_secret_enc IS NOT NULL",
        params![now(), user_id],
    )?;
    Ok(affected > 0)
}

pub fn disable_totp(conn: &Connection, user_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE admin_users SET totp_secret_enc = NULL, totp_enabled = 0, updated_at = ?1 WHERE id = ?2",
        params![now(), user_id],
    )?;
    Ok(affected > 0)
}

// ============ Admin API Keys ============

/// Generate an API key with kks_ prefix
pub fn generate_api_key() -> String {
    format!("kks_{}", Uuid::new_v4().to_string().replace("-", ""))
}

/// Get admin user by API key. Returns the user and key row when both are
/// active.
pub fn get_admin_by_api_key(
    conn: &Connection,
    api_key: &str,
) -> Result<Option<(AdminUser, AdminApiKey)>> {
    let hash = hash_secret(api_key);

    let key: Option<AdminApiKey> = query_one(
        conn,
        &format!(
            "SELECT {} FROM admin_api_keys WHERE key_hash = ?1 AND active = 1",
            ADMIN_API_KEY_COLS
        ),
        &[&hash],
    )?;

    if let Some(key) = key {
        // Update last_used_at (fire and forget)
        let _ = conn.execute(
            "UPDATE admin_api_keys SET last_used_at = ?1 WHERE id = ?2",
            params![now(), &key.id],
        );

        let user: Option<AdminUser> = query_one(
            conn,
            &format!(
                "SELECT {} FROM admin_users WHERE id = ?1 AND active = 1",
                ADMIN_USER_COLS
            ),
            &[&key.admin_user_id],
        )?;
        if let Some(user) = user {
            return Ok(Some((user, key)));
        }
    }

    Ok(None)
}

/// Create an API key for an admin user. The plaintext key is returned once
/// and only its hash is stored.
///
/// Uses a transaction with IMMEDIATE mode so the user existence check and
/// the insert cannot race with a concurrent deactivation.
pub fn create_admin_api_key(
    conn: &mut Connection,
    admin_user_id: &str,
    name: &str,
) -> Result<ApiKeyCreated> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let user_active: bool = tx
        .query_row(
            "SELECT 1 FROM admin_users WHERE id = ?1 AND active = 1",
            params![admin_user_id],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    if !user_active {
        return Err(AppError::NotFound(
            crate::error::msg::ADMIN_USER_NOT_FOUND.into(),
        ));
    }

    let id = gen_id();
    let now = now();
    let key = generate_api_key();
    let prefix = &key[..12];
    let key_hash = hash_secret(&key);

    tx.execute(
        "INSERT INTO admin_api_keys (id, admin_user_id, name, key_hash, key_prefix, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        params![&id, admin_user_id, name, &key_hash, prefix, now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(format!("API key named '{}' already exists", name))
        }
        other => other.into(),
    })?;

    tx.commit()?;

    Ok(ApiKeyCreated {
        id,
        name: name.to_string(),
        key_prefix: prefix.to_string(),
        key,
        created_at: now,
    })
}

pub fn list_api_keys_for_user(conn: &Connection, admin_user_id: &str) -> Result<Vec<AdminApiKey>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM admin_api_keys WHERE admin_user_id = ?1 AND active = 1 ORDER BY created_at DESC",
            ADMIN_API_KEY_COLS
        ),
        &[&admin_user_id],
    )
}

/// Revoke a key. Scoped to the owning user so a caller cannot revoke another
/// user's key by mixing path segments.
pub fn revoke_admin_api_key(conn: &Connection, admin_user_id: &str, key_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE admin_api_keys SET active = 0 WHERE id = ?1 AND admin_user_id = ?2 AND active = 1",
        params![key_id, admin_user_id],
    )?;
    Ok(affected > 0)
}

// ============ Webhook Event Deduplication ============

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub provider: String,
    pub event_id: String,
    pub enrollment_id: Option<String>,
    pub created_at: i64,
}

/// Atomically record a webhook event, returning true if this is a new event.
/// Returns false if the event was already processed (replay attack prevention).
///
/// Uses INSERT OR IGNORE for atomicity - if the (provider, event_id) pair
/// already exists, the insert is silently ignored and we return false.
pub fn try_record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (id, provider, event_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&gen_id(), provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

pub fn get_webhook_event(
    conn: &Connection,
    provider: &str,
    event_id: &str,
) -> Result<Option<WebhookEvent>> {
    conn.query_row(
        "SELECT id, provider, event_id, enrollment_id, created_at FROM webhook_events WHERE provider = ?1 AND event_id = ?2",
        params![provider, event_id],
        |row| {
            Ok(WebhookEvent {
                id: row.get(0)?,
                provider: row.get(1)?,
                event_id: row.get(2)?,
                enrollment_id: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/// Link the processed event to the enrollment it produced so replays can
/// answer with the original result.
pub fn set_webhook_event_enrollment(
    conn: &Connection,
    provider: &str,
    event_id: &str,
    enrollment_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE webhook_events SET enrollment_id = ?1 WHERE provider = ?2 AND event_id = ?3",
        params![enrollment_id, provider, event_id],
    )?;
    Ok(())
}

// ============ Audit Logs ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_type: ActorType,
    actor_id: Option<&str>,
    actor_name: Option<&str>,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    resource_name: Option<&str>,
    details: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<AuditLog> {
    let id = gen_id();
    let timestamp = now();

    let log = AuditLog {
        id,
        timestamp,
        actor_type,
        actor_id: actor_id.map(String::from),
        actor_name: actor_name.map(String::from),
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        resource_name: resource_name.map(String::from),
        details: details.cloned(),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
    };

    // Skip database insert if audit logging is disabled
    if !enabled {
        return Ok(log);
    }

    let details_str = details.map(|d| d.to_string());

    conn.execute(
        "INSERT INTO audit_logs (id, timestamp, actor_type, actor_id, actor_name, action, resource_type, resource_id, resource_name, details, ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            &log.id,
            timestamp,
            actor_type.as_ref(),
            actor_id,
            actor_name,
            action,
            resource_type,
            resource_id,
            resource_name,
            &details_str,
            ip_address,
            user_agent
        ],
    )?;

    Ok(log)
}

pub fn query_audit_logs(conn: &Connection, query: &AuditLogQuery) -> Result<(Vec<AuditLog>, i64)> {
    // Helper to build filter params (avoids duplication between COUNT and SELECT)
    let build_filter_params = || -> Vec<Box<dyn rusqlite::ToSql>> {
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(ref v) = query.actor_type {
            params.push(Box::new(v.as_ref().to_string()));
        }
        if let Some(ref v) = query.actor_id {
            params.push(Box::new(v.clone()));
        }
        if let Some(ref v) = query.action {
            params.push(Box::new(v.clone()));
        }
        if let Some(ref v) = query.resource_type {
            params.push(Box::new(v.clone()));
        }
        if let Some(ref v) = query.resource_id {
            params.push(Box::new(v.clone()));
        }
        if let Some(v) = query.from_timestamp {
            params.push(Box::new(v));
        }
        if let Some(v) = query.to_timestamp {
            params.push(Box::new(v));
        }
        params
    };

    // Build WHERE clause
    let mut where_clause = String::from("WHERE 1=1");
    if query.actor_type.is_some() {
        where_clause.push_str(" AND actor_type = ?");
    }
    if query.actor_id.is_some() {
        where_clause.push_str(" AND actor_id = ?");
    }
    if query.action.is_some() {
        where_clause.push_str(" AND action = ?");
    }
    if query.resource_type.is_some() {
        where_clause.push_str(" AND resource_type = ?");
    }
    if query.resource_id.is_some() {
        where_clause.push_str(" AND resource_id = ?");
    }
    if query.from_timestamp.is_some() {
        where_clause.push_str(" AND timestamp >= ?");
    }
    if query.to_timestamp.is_some() {
        where_clause.push_str(" AND timestamp <= ?");
    }

    // Get total count
    let count_sql = format!("SELECT COUNT(*) FROM audit_logs {}", where_clause);
    let filter_params = build_filter_params();
    let filter_refs: Vec<&dyn rusqlite::ToSql> = filter_params.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(&count_sql, filter_refs.as_slice(), |row| row.get(0))?;

    // Build SELECT query with pagination
    let select_sql = format!(
        "SELECT {} FROM audit_logs {} ORDER BY timestamp DESC LIMIT ? OFFSET ?",
        AUDIT_LOG_COLS, where_clause
    );

    let mut select_params = build_filter_params();
    select_params.push(Box::new(query.limit()));
    select_params.push(Box::new(query.offset()));
    let select_refs: Vec<&dyn rusqlite::ToSql> = select_params.iter().map(|b| b.as_ref()).collect();

    let logs = query_all(conn, &select_sql, select_refs.as_slice())?;
    Ok((logs, total))
}

/// Delete audit rows older than the retention window. Runs at startup.
pub fn purge_old_audit_logs(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - retention_days * SECONDS_PER_DAY;
    let deleted = conn.execute(
        "DELETE FROM audit_logs WHERE timestamp < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
