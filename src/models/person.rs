use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A data subject: course participant, certificate holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// ISO date (YYYY-MM-DD); used together with the name for webhook dedup
    /// when no email is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePerson {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl CreatePerson {
    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(AppError::BadRequest("Name must not be empty".into()));
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(AppError::BadRequest("Invalid email address".into()));
            }
        }
        if let Some(date) = &self.birth_date {
            if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                return Err(AppError::BadRequest(
                    "birth_date must be formatted YYYY-MM-DD".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePerson {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<String>,
    pub phone: Option<String>,
}

impl UpdatePerson {
    pub fn validate(&self) -> Result<()> {
        if self.first_name.as_ref().is_some_and(|n| n.trim().is_empty())
            || self.last_name.as_ref().is_some_and(|n| n.trim().is_empty())
        {
            return Err(AppError::BadRequest("Name must not be empty".into()));
        }
        if let Some(email) = &self.email
            && !email.contains('@')
        {
            return Err(AppError::BadRequest("Invalid email address".into()));
        }
        if let Some(date) = &self.birth_date
            && chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err()
        {
            return Err(AppError::BadRequest(
                "birth_date must be formatted YYYY-MM-DD".into(),
            ));
        }
        Ok(())
    }
}

/// Person-scoped document record (certificates, HSE cards, contracts);
/// part of the GDPR export bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub person_id: String,
    pub title: String,
    pub category: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocument {
    pub title: String,
    pub category: String,
}

impl CreateDocument {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::BadRequest("Document title must not be empty".into()));
        }
        Ok(())
    }
}

/// Physical access card issued to a person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCard {
    pub id: String,
    pub person_id: String,
    pub card_number: String,
    pub issued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccessCard {
    pub card_number: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl CreateAccessCard {
    pub fn validate(&self) -> Result<()> {
        if self.card_number.trim().is_empty() {
            return Err(AppError::BadRequest("Card number must not be empty".into()));
        }
        Ok(())
    }
}

/// Record of a person acknowledging an internal policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAcknowledgment {
    pub id: String,
    pub person_id: String,
    pub policy_name: String,
    pub acknowledged_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePolicyAcknowledgment {
    pub policy_name: String,
}

impl CreatePolicyAcknowledgment {
    pub fn validate(&self) -> Result<()> {
        if self.policy_name.trim().is_empty() {
            return Err(AppError::BadRequest("Policy name must not be empty".into()));
        }
        Ok(())
    }
}
