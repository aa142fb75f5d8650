use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};

/// A course in the catalog. The validity policy lives here: credentials issued
/// for the course expire `validity_months` calendar months after issuance
/// (never, when absent) and stay usable `grace_days` past that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    /// Stable external code (also used by the bransjekurs webhook).
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validity_months: Option<i64>,
    pub grace_days: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCourse {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub validity_months: Option<i64>,
    #[serde(default)]
    pub grace_days: Option<i64>,
}

impl CreateCourse {
    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(AppError::BadRequest("Course code must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Course name must not be empty".into()));
        }
        if let Some(months) = self.validity_months {
            if !(1..=120).contains(&months) {
                return Err(AppError::BadRequest(
                    "validity_months must be between 1 and 120".into(),
                ));
            }
        }
        if self.grace_days.is_some_and(|d| d < 0) {
            return Err(AppError::BadRequest("grace_days must not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCourse {
    pub name: Option<String>,
    pub description: Option<String>,
    pub validity_months: Option<i64>,
    pub grace_days: Option<i64>,
}

impl UpdateCourse {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest("Course name must not be empty".into()));
        }
        if let Some(months) = self.validity_months
            && !(1..=120).contains(&months)
        {
            return Err(AppError::BadRequest(
                "validity_months must be between 1 and 120".into(),
            ));
        }
        if self.grace_days.is_some_and(|d| d < 0) {
            return Err(AppError::BadRequest("grace_days must not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionKind {
    Classroom,
    Digital,
}

/// A scheduled (or synthetic digital) delivery of a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSession {
    pub id: String,
    pub course_id: String,
    pub kind: SessionKind,
    pub starts_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSession {
    pub kind: SessionKind,
    pub starts_at: i64,
    #[serde(default)]
    pub ends_at: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
}

impl CreateSession {
    pub fn validate(&self) -> Result<()> {
        if let Some(ends) = self.ends_at {
            if ends < self.starts_at {
                return Err(AppError::BadRequest(
                    "Session cannot end before it starts".into(),
                ));
            }
        }
        Ok(())
    }
}
