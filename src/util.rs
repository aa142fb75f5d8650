//! Shared utility functions for the kursadmin application.

use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{ActorType, AuditAction, AuditLog};

const KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_block(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| KEY_CHARSET[rng.gen_range(0..KEY_CHARSET.len())] as char)
        .collect()
}

/// Generate a product license key (`KKSP-XXXX-XXXX-XXXX`).
///
/// The key identifies the customer installation but is not a secret; the
/// validation token is the credential.
pub fn generate_license_key() -> String {
    format!(
        "KKSP-{}-{}-{}",
        random_block(4),
        random_block(4),
        random_block(4)
    )
}

/// Generate a validation token: 32 random bytes, base64url. Shown once at
/// creation; only its hash is stored.
pub fn generate_validation_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a public credential verification code (`KKS-` + 10 uppercase
/// alphanumerics), printed on course certificates.
pub fn generate_verification_code() -> String {
    format!("KKS-{}", random_block(10))
}

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests, first hop wins),
/// then `x-real-ip`, and extracts the `user-agent` header for audit logging.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        });

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Builder for creating audit log entries.
///
/// Provides a fluent API for constructing audit logs with named methods
/// instead of positional parameters.
///
/// # Example
/// ```ignore
/// AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
///     .actor(ActorType::Admin, Some(&ctx.admin.id), Some(&ctx.admin.name))
///     .action(AuditAction::SuspendLicense)
///     .resource("company", &company.id)
///     .resource_name(&company.name)
///     .details(&serde_json::json!({ "reason": reason }))
///     .save()?;
/// ```
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    headers: &'a HeaderMap,
    actor_type: ActorType,
    actor_id: Option<&'a str>,
    actor_name: Option<&'a str>,
    action: AuditAction,
    resource_type: &'a str,
    resource_id: &'a str,
    resource_name: Option<&'a str>,
    details: Option<&'a serde_json::Value>,
}

impl<'a> AuditLogBuilder<'a> {
    /// Create a new audit log builder with required parameters.
    pub fn new(conn: &'a Connection, enabled: bool, headers: &'a HeaderMap) -> Self {
        Self {
            conn,
            enabled,
            headers,
            actor_type: ActorType::System,
            actor_id: None,
            actor_name: None,
            action: AuditAction::CreateCompany, // Placeholder, should always be set
            resource_type: "",
            resource_id: "",
            resource_name: None,
            details: None,
        }
    }

    /// Set the actor type, id and display name.
    pub fn actor(
        mut self,
        actor_type: ActorType,
        actor_id: Option<&'a str>,
        actor_name: Option<&'a str>,
    ) -> Self {
        self.actor_type = actor_type;
        self.actor_id = actor_id;
        self.actor_name = actor_name;
        self
    }

    /// Set the action being performed.
    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = action;
        self
    }

    /// Set the resource type and ID being acted upon.
    pub fn resource(mut self, resource_type: &'a str, resource_id: &'a str) -> Self {
        self.resource_type = resource_type;
        self.resource_id = resource_id;
        self
    }

    /// Set a human-readable resource name for display.
    pub fn resource_name(mut self, name: &'a str) -> Self {
        self.resource_name = Some(name);
        self
    }

    /// Set optional details JSON.
    pub fn details(mut self, details: &'a serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Save the audit log entry to the database.
    pub fn save(self) -> Result<AuditLog> {
        let (ip, ua) = extract_request_info(self.headers);
        queries::create_audit_log(
            self.conn,
            self.enabled,
            self.actor_type,
            self.actor_id,
            self.actor_name,
            self.action.as_ref(),
            self.resource_type,
            self.resource_id,
            self.resource_name,
            self.details,
            ip.as_deref(),
            ua.as_deref(),
        )
    }
}
