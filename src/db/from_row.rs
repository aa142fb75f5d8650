//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! This module provides a `FromRow` trait that models can implement to
//! define how they are constructed from database rows, plus helper functions
//! for common query patterns.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when database
/// contains invalid enum values (from corruption, migration errors, etc.).
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
///
/// Implementing this trait allows using the `query_one` and `query_all`
/// helper functions, reducing repetitive row mapping closures.
pub trait FromRow: Sized {
    /// Construct an instance from a database row.
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const COMPANY_COLS: &str = "id, name, org_number, contact_email, license_status, suspended_at, suspended_reason, current_license_id, created_at, updated_at";

pub const LICENSE_COLS: &str = "id, company_id, plan_name, status, start_date, end_date, grace_period_days, suspended_at, suspended_reason, created_at, updated_at";

pub const LICENSE_ACTIVITY_COLS: &str =
    "id, license_id, company_id, action, performed_by, details, created_at";

pub const PERSON_COLS: &str =
    "id, first_name, last_name, email, birth_date, phone, created_at, updated_at";

pub const DOCUMENT_COLS: &str = "id, person_id, title, category, created_at";

pub const ACCESS_CARD_COLS: &str =
    "id, person_id, card_number, issued_at, expires_at, created_at";

pub const POLICY_ACK_COLS: &str = "id, person_id, policy_name, acknowledged_at";

pub const COURSE_COLS: &str =
    "id, code, name, description, validity_months, grace_days, created_at, updated_at";

pub const SESSION_COLS: &str = "id, course_id, kind, starts_at, ends_at, location, created_at";

pub const ENROLLMENT_COLS: &str = "id, person_id, session_id, source, completed_at, created_at";

pub const ASSESSMENT_COLS: &str = "id, enrollment_id, passed, score, assessed_at, created_at";

pub const CREDENTIAL_COLS: &str = "id, person_id, course_id, enrollment_id, verification_code, valid_from, valid_to, grace_days, created_at";

pub const PRODUCT_LICENSE_COLS: &str = "id, product_name, customer_name, customer_email, license_key, validation_token_hash, allowed_domain, max_users, max_bookings_per_month, features, active, expires_at, activated_at, created_at, updated_at";

pub const VALIDATION_RECORD_COLS: &str = "id, product_license_id, license_key, success, failure_reason, source_ip, source_domain, created_at";

pub const KPI_COLS: &str = "id, metric, value, note, computed_at";

pub const ADMIN_USER_COLS: &str =
    "id, email, name, role, totp_secret_enc, totp_enabled, active, created_at, updated_at";

pub const ADMIN_API_KEY_COLS: &str =
    "id, admin_user_id, name, key_hash, key_prefix, active, last_used_at, created_at";

pub const AUDIT_LOG_COLS: &str = "id, timestamp, actor_type, actor_id, actor_name, action, resource_type, resource_id, resource_name, details, ip_address, user_agent";

// ============ FromRow Implementations ============

impl FromRow for Company {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Company {
            id: row.get(0)?,
            name: row.get(1)?,
            org_number: row.get(2)?,
            contact_email: row.get(3)?,
            license_status: parse_enum(row, 4, "license_status")?,
            suspended_at: row.get(5)?,
            suspended_reason: row.get(6)?,
            current_license_id: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            company_id: row.get(1)?,
            plan_name: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            start_date: row.get(4)?,
            end_date: row.get(5)?,
            grace_period_days: row.get(6)?,
            suspended_at: row.get(7)?,
            suspended_reason: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for LicenseActivity {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseActivity {
            id: row.get(0)?,
            license_id: row.get(1)?,
            company_id: row.get(2)?,
            action: parse_enum(row, 3, "action")?,
            performed_by: row.get(4)?,
            details: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for Person {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Person {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            email: row.get(3)?,
            birth_date: row.get(4)?,
            phone: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for Document {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Document {
            id: row.get(0)?,
            person_id: row.get(1)?,
            title: row.get(2)?,
            category: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for AccessCard {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AccessCard {
            id: row.get(0)?,
            person_id: row.get(1)?,
            card_number: row.get(2)?,
            issued_at: row.get(3)?,
            expires_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for PolicyAcknowledgment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PolicyAcknowledgment {
            id: row.get(0)?,
            person_id: row.get(1)?,
            policy_name: row.get(2)?,
            acknowledged_at: row.get(3)?,
        })
    }
}

impl FromRow for Course {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Course {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            validity_months: row.get(4)?,
            grace_days: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for CourseSession {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CourseSession {
            id: row.get(0)?,
            course_id: row.get(1)?,
            kind: parse_enum(row, 2, "kind")?,
            starts_at: row.get(3)?,
            ends_at: row.get(4)?,
            location: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for Enrollment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Enrollment {
            id: row.get(0)?,
            person_id: row.get(1)?,
            session_id: row.get(2)?,
            source: row.get(3)?,
            completed_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for Assessment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Assessment {
            id: row.get(0)?,
            enrollment_id: row.get(1)?,
            passed: row.get::<_, i32>(2)? != 0,
            score: row.get(3)?,
            assessed_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for Credential {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Credential {
            id: row.get(0)?,
            person_id: row.get(1)?,
            course_id: row.get(2)?,
            enrollment_id: row.get(3)?,
            verification_code: row.get(4)?,
            valid_from: row.get(5)?,
            valid_to: row.get(6)?,
            grace_days: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl FromRow for ProductLicense {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ProductLicense {
            id: row.get(0)?,
            product_name: row.get(1)?,
            customer_name: row.get(2)?,
            customer_email: row.get(3)?,
            license_key: row.get(4)?,
            validation_token_hash: row.get(5)?,
            allowed_domain: row.get(6)?,
            max_users: row.get(7)?,
            max_bookings_per_month: row.get(8)?,
            features: row.get(9)?,
            active: row.get::<_, i32>(10)? != 0,
            expires_at: row.get(11)?,
            activated_at: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl FromRow for ValidationRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ValidationRecord {
            id: row.get(0)?,
            product_license_id: row.get(1)?,
            license_key: row.get(2)?,
            success: row.get::<_, i32>(3)? != 0,
            failure_reason: row.get(4)?,
            source_ip: row.get(5)?,
            source_domain: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for Kpi {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Kpi {
            id: row.get(0)?,
            metric: row.get(1)?,
            value: row.get(2)?,
            note: row.get(3)?,
            computed_at: row.get(4)?,
        })
    }
}

impl FromRow for AdminUser {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AdminUser {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            role: parse_enum(row, 3, "role")?,
            totp_secret_enc: row.get(4)?,
            totp_enabled: row.get::<_, i32>(5)? != 0,
            active: row.get::<_, i32>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for AdminApiKey {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AdminApiKey {
            id: row.get(0)?,
            admin_user_id: row.get(1)?,
            name: row.get(2)?,
            key_hash: row.get(3)?,
            key_prefix: row.get(4)?,
            active: row.get::<_, i32>(5)? != 0,
            last_used_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        // details is stored as JSON text; unreadable rows degrade to None
        let details: Option<String> = row.get(9)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_type: parse_enum(row, 2, "actor_type")?,
            actor_id: row.get(3)?,
            actor_name: row.get(4)?,
            action: row.get(5)?,
            resource_type: row.get(6)?,
            resource_id: row.get(7)?,
            resource_name: row.get(8)?,
            details: details.and_then(|s| serde_json::from_str(&s).ok()),
            ip_address: row.get(10)?,
            user_agent: row.get(11)?,
        })
    }
}
