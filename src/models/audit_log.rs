use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorType {
    Admin,
    Webhook,
    System,
}

/// Every auditable back-office action. Stored as its snake_case string so the
/// audit database stays readable with plain sqlite3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    CreateCompany,
    UpdateCompany,
    CreateLicense,
    SuspendLicense,
    ResumeLicense,
    CreatePerson,
    UpdatePerson,
    DeletePerson,
    ExportPersonData,
    CreateDocument,
    CreateAccessCard,
    AcknowledgePolicy,
    CreateCourse,
    UpdateCourse,
    CreateSession,
    CreateEnrollment,
    RecordAssessment,
    IssueCredential,
    CreateProductLicense,
    UpdateProductLicense,
    CreateKpi,
    RecalculateKpis,
    CreateAdminUser,
    UpdateAdminUser,
    CreateApiKey,
    RevokeApiKey,
    EnrollTwoFactor,
    ActivateTwoFactor,
    DisableTwoFactor,
    ReceiveCompletionWebhook,
    BootstrapAdmin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub timestamp: i64,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    /// Name of the actor at the time of the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    /// Name of the resource being acted upon (e.g., company name, course name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    pub details: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub actor_type: Option<ActorType>,
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub from_timestamp: Option<i64>,
    pub to_timestamp: Option<i64>,
    /// Maximum number of items to return (default: 50, max: 100)
    pub limit: Option<i64>,
    /// Number of items to skip (default: 0)
    pub offset: Option<i64>,
}

impl AuditLogQuery {
    /// Get the limit, clamped to valid range
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 100)
    }

    /// Get the offset, minimum 0
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

impl AuditLog {
    /// Format as a human-readable string for display.
    ///
    /// Format: `[TIMESTAMP] [ActorType] "Actor" VERB RESOURCE`
    ///
    /// Examples:
    /// - `[2024-01-15 14:32:05] [Admin] "Kari Hansen" created company "Fjellsikring AS"`
    /// - `[2024-01-15 14:32:05] [Webhook] (bransjekurs) issued credential KKS-ABC123DEF4`
    pub fn formatted(&self) -> String {
        use chrono::{TimeZone, Utc};

        let timestamp = Utc
            .timestamp_opt(self.timestamp, 0)
            .single()
            .map(|dt| format!("[{}]", dt.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_else(|| format!("[{}]", self.timestamp));

        // Actor type in brackets - fixed width for alignment (9 chars)
        let actor_type = match self.actor_type {
            ActorType::Admin => "[Admin]  ",
            ActorType::Webhook => "[Webhook]",
            ActorType::System => "[System] ",
        };

        // Actor name quoted, or (id) if no name
        let actor_display = self
            .actor_name
            .as_ref()
            .map(|n| format!("\"{}\"", n))
            .or_else(|| self.actor_id.as_ref().map(|id| format!("({})", id)))
            .unwrap_or_default();

        let verb_phrase = Self::action_to_verb_phrase(&self.action, &self.resource_type);

        // Resource: prefer name (quoted), fall back to ID
        let resource_display = self
            .resource_name
            .as_ref()
            .map(|n| format!("\"{}\"", n))
            .unwrap_or_else(|| self.resource_id.clone());

        format!(
            "{} {} {} {} {}",
            timestamp, actor_type, actor_display, verb_phrase, resource_display
        )
    }

    /// Convert an action string to a past-tense verb phrase.
    /// e.g., "create_company" -> "created company"
    fn action_to_verb_phrase(action: &str, resource_type: &str) -> String {
        let parts: Vec<&str> = action.split('_').collect();
        if parts.is_empty() {
            return action.to_string();
        }

        let verb = Self::to_past_tense(parts[0]);

        // If action has more parts, use them as the object
        // Otherwise fall back to resource_type
        if parts.len() > 1 {
            let object = parts[1..].join(" ");
            format!("{} {}", verb, object)
        } else {
            format!("{} {}", verb, resource_type)
        }
    }

    /// Convert a verb to past tense.
    fn to_past_tense(verb: &str) -> &str {
        match verb {
            "create" => "created",
            "update" => "updated",
            "delete" => "deleted",
            "suspend" => "suspended",
            "resume" => "resumed",
            "extend" => "extended",
            "export" => "exported",
            "issue" => "issued",
            "record" => "recorded",
            "receive" => "received",
            "acknowledge" => "acknowledged",
            "recalculate" => "recalculated",
            "enroll" => "enrolled",
            "activate" => "activated",
            "disable" => "disabled",
            "revoke" => "revoked",
            "bootstrap" => "bootstrapped",
            "purge" => "purged",
            "seed" => "seeded",
            other => other, // Unknown verbs pass through unchanged
        }
    }
}

/// Wrapper for AuditLog that includes a human-readable `formatted` field.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogResponse {
    #[serde(flatten)]
    pub log: AuditLog,
    pub formatted: String,
}

impl From<AuditLog> for AuditLogResponse {
    fn from(log: AuditLog) -> Self {
        let formatted = log.formatted();
        Self { log, formatted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_basic() {
        let log = AuditLog {
            id: "log12345678".to_string(),
            timestamp: 1704067200, // 2024-01-01T00:00:00Z
            actor_type: ActorType::Admin,
            actor_id: Some("adm123".to_string()),
            actor_name: Some("Kari Hansen".to_string()),
            action: "create_company".to_string(),
            resource_type: "company".to_string(),
            resource_id: "cmp456".to_string(),
            resource_name: Some("Fjellsikring AS".to_string()),
            details: None,
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("test-agent".to_string()),
        };

        let formatted = log.formatted();
        assert!(formatted.contains("[2024-01-01 00:00:00]"));
        assert!(formatted.contains("[Admin]"));
        assert!(formatted.contains("\"Kari Hansen\""));
        assert!(formatted.contains("created company"));
        assert!(formatted.contains("\"Fjellsikring AS\""));
    }

    #[test]
    fn test_formatted_webhook_actor_falls_back_to_id() {
        let log = AuditLog {
            id: "log12345678".to_string(),
            timestamp: 1704067200,
            actor_type: ActorType::Webhook,
            actor_id: Some("bransjekurs".to_string()),
            actor_name: None,
            action: "issue_credential".to_string(),
            resource_type: "credential".to_string(),
            resource_id: "KKS-ABC123DEF4".to_string(),
            resource_name: None,
            details: Some(serde_json::json!({"course": "HMS-100"})),
            ip_address: None,
            user_agent: None,
        };

        let formatted = log.formatted();
        assert!(formatted.contains("[Webhook]"));
        assert!(formatted.contains("(bransjekurs)"));
        assert!(formatted.contains("issued credential"));
        assert!(formatted.contains("KKS-ABC123DEF4"));
    }

    #[test]
    fn test_action_to_verb_phrase() {
        assert_eq!(
            AuditLog::action_to_verb_phrase("create_company", "company"),
            "created company"
        );
        assert_eq!(
            AuditLog::action_to_verb_phrase("suspend_license", "license"),
            "suspended license"
        );
        assert_eq!(
            AuditLog::action_to_verb_phrase("export_person_data", "person"),
            "exported person data"
        );
        assert_eq!(
            AuditLog::action_to_verb_phrase("recalculate_kpis", "kpi"),
            "recalculated kpis"
        );
    }

    #[test]
    fn test_action_strings() {
        assert_eq!(AuditAction::SuspendLicense.as_ref(), "suspend_license");
        assert_eq!(
            AuditAction::ReceiveCompletionWebhook.as_ref(),
            "receive_completion_webhook"
        );
        let parsed: AuditAction = "export_person_data".parse().unwrap();
        assert_eq!(parsed, AuditAction::ExportPersonData);
    }

    #[test]
    fn test_audit_log_response_includes_formatted() {
        let log = AuditLog {
            id: "log12345678".to_string(),
            timestamp: 1704067200,
            actor_type: ActorType::System,
            actor_id: None,
            actor_name: None,
            action: "bootstrap_admin".to_string(),
            resource_type: "admin_user".to_string(),
            resource_id: "adm001".to_string(),
            resource_name: Some("Ola Nordmann".to_string()),
            details: None,
            ip_address: None,
            user_agent: None,
        };

        let response: AuditLogResponse = log.into();
        assert!(response.formatted.contains("[System]"));
        assert!(response.formatted.contains("bootstrapped admin"));
        assert_eq!(response.log.id, "log12345678");
    }
}
