use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};

/// Back-office roles, in increasing order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminRole {
    Viewer,
    Manager,
    Admin,
}

impl AdminRole {
    pub fn can_manage(&self) -> bool {
        matches!(self, AdminRole::Manager | AdminRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AdminRole::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: AdminRole,
    /// Envelope-encrypted TOTP secret, present once 2FA enrollment starts.
    #[serde(skip_serializing)]
    pub totp_secret_enc: Option<Vec<u8>>,
    pub totp_enabled: bool,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminUser {
    pub email: String,
    pub name: String,
    pub role: AdminRole,
}

impl CreateAdminUser {
    pub fn validate(&self) -> Result<()> {
        if !self.email.contains('@') {
            return Err(AppError::BadRequest("Invalid email address".into()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Name must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateAdminUser {
    pub name: Option<String>,
    pub role: Option<AdminRole>,
    pub active: Option<bool>,
}

impl UpdateAdminUser {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest("Name must not be empty".into()));
        }
        Ok(())
    }
}

/// An API key for the admin surface. Only the SHA-256 hash is stored; the
/// prefix (first 12 chars) is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminApiKey {
    pub id: String,
    pub admin_user_id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKey {
    pub name: String,
}

impl CreateApiKey {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Key name must not be empty".into()));
        }
        Ok(())
    }
}

/// Creation response carrying the plaintext key, shown exactly once.
#[derive(Debug, Serialize)]
pub struct ApiKeyCreated {
    pub id: String,
    pub name: String,
    pub key: String,
    pub key_prefix: String,
    pub created_at: i64,
}

/// Enrollment response. The secret and URI are returned once so the user can
/// add the account to an authenticator app; verification activates it.
#[derive(Debug, Serialize)]
pub struct TwoFactorEnrollment {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_privileges() {
        assert!(!AdminRole::Viewer.can_manage());
        assert!(AdminRole::Manager.can_manage());
        assert!(AdminRole::Admin.can_manage());
        assert!(!AdminRole::Manager.is_admin());
        assert!(AdminRole::Admin.is_admin());
    }

    #[test]
    fn role_serialization() {
        assert_eq!(AdminRole::Manager.as_ref(), "MANAGER");
        let parsed: AdminRole = "VIEWER".parse().unwrap();
        assert_eq!(parsed, AdminRole::Viewer);
    }
}
