use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};

/// Persisted license status of a company. EXPIRED is derived at read time from
/// the end date and grace period; the transition operations never write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseStatus {
    Trial,
    Active,
    Suspended,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Created,
    Suspended,
    Resumed,
    Extended,
}

/// A customer company using the booking product. `current_license_id` is the
/// single authoritative pointer to the license row the state machine operates
/// on; suspension state is mirrored between company and license.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    /// Norwegian organisasjonsnummer (9 digits), when registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub license_status: LicenseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_license_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCompany {
    pub name: String,
    #[serde(default)]
    pub org_number: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

impl CreateCompany {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Company name must not be empty".into()));
        }
        if let Some(orgnr) = &self.org_number {
            if orgnr.len() != 9 || !orgnr.bytes().all(|b| b.is_ascii_digit()) {
                return Err(AppError::BadRequest(
                    "org_number must be a 9-digit organisasjonsnummer".into(),
                ));
            }
        }
        if let Some(email) = &self.contact_email {
            if !email.contains('@') {
                return Err(AppError::BadRequest("Invalid contact email".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompany {
    pub name: Option<String>,
    pub org_number: Option<String>,
    pub contact_email: Option<String>,
}

impl UpdateCompany {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest("Company name must not be empty".into()));
        }
        if let Some(ref orgnr) = self.org_number
            && (orgnr.len() != 9 || !orgnr.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(AppError::BadRequest(
                "org_number must be a 9-digit organisasjonsnummer".into(),
            ));
        }
        Ok(())
    }
}

/// A license row. Never deleted; suspend/resume update it in place and append
/// to `license_activities`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub company_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    pub status: LicenseStatus,
    pub start_date: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,
    pub grace_period_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateLicense {
    #[serde(default)]
    pub plan_name: Option<String>,
    #[serde(default)]
    pub start_date: Option<i64>,
    #[serde(default)]
    pub end_date: Option<i64>,
    #[serde(default)]
    pub grace_period_days: Option<i64>,
}

impl CreateLicense {
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(AppError::BadRequest(
                    "License cannot end before it starts".into(),
                ));
            }
        }
        if self.grace_period_days.is_some_and(|d| d < 0) {
            return Err(AppError::BadRequest(
                "grace_period_days must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Append-only audit trail of license state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseActivity {
    pub id: String,
    pub license_id: String,
    pub company_id: String,
    pub action: ActivityAction,
    pub performed_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub reason: String,
}

impl SuspendRequest {
    pub fn validate(&self) -> Result<()> {
        if self.reason.trim().is_empty() {
            return Err(AppError::BadRequest("Suspension reason must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    #[serde(default)]
    pub extend_days: Option<i64>,
}

impl ResumeRequest {
    pub fn validate(&self) -> Result<()> {
        if self.extend_days.is_some_and(|d| d <= 0) {
            return Err(AppError::BadRequest("extend_days must be positive".into()));
        }
        Ok(())
    }
}
