use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Participation of a person in a course session. One row per (person,
/// session) pair; repeated webhook deliveries reuse the existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub person_id: String,
    pub session_id: String,
    /// "manual" for admin-created rows, "bransjekurs" for webhook imports.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateEnrollment {
    pub person_id: String,
    pub session_id: String,
}

/// Pass/fail result for an enrollment, at most one per enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: String,
    pub enrollment_id: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub assessed_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordAssessment {
    pub passed: bool,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub assessed_at: Option<i64>,
}

impl RecordAssessment {
    pub fn validate(&self) -> Result<()> {
        if let Some(score) = self.score {
            if !(0.0..=100.0).contains(&score) {
                return Err(AppError::BadRequest("Score must be between 0 and 100".into()));
            }
        }
        Ok(())
    }
}
