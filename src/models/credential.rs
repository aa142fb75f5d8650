use serde::{Deserialize, Serialize};

use crate::validity::{resolve_status, ResolvedValidity};

/// A certificate asserting a person completed a course. The validity window is
/// fixed at issuance; renewal issues a new credential instead of mutating
/// this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub person_id: String,
    pub course_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<String>,
    /// Public code for the verification endpoint, e.g. `KKS-7F3K9Q2MXT`.
    pub verification_code: String,
    pub valid_from: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<i64>,
    pub grace_days: i64,
    pub created_at: i64,
}

impl Credential {
    pub fn resolve(&self, now: i64) -> ResolvedValidity {
        resolve_status(self.valid_to, self.grace_days, now)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCredential {
    pub person_id: String,
    pub course_id: String,
    #[serde(default)]
    pub enrollment_id: Option<String>,
}

/// A credential joined with its resolved status for list/detail responses.
#[derive(Debug, Serialize)]
pub struct CredentialWithStatus {
    #[serde(flatten)]
    pub credential: Credential,
    pub validity: ResolvedValidity,
}

impl CredentialWithStatus {
    pub fn at(credential: Credential, now: i64) -> Self {
        let validity = credential.resolve(now);
        Self { credential, validity }
    }
}
