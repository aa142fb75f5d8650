use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A point-in-time metric snapshot. Recalculation appends new rows rather than
/// overwriting, so history is queryable per metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kpi {
    pub id: String,
    pub metric: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub computed_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateKpi {
    pub metric: String,
    pub value: f64,
    #[serde(default)]
    pub note: Option<String>,
}

impl CreateKpi {
    pub fn validate(&self) -> Result<()> {
        if self.metric.trim().is_empty() {
            return Err(AppError::BadRequest("metric must not be empty".into()));
        }
        if !self.value.is_finite() {
            return Err(AppError::BadRequest("value must be a finite number".into()));
        }
        Ok(())
    }
}

/// Metric names produced by the recalculation job.
pub mod metrics {
    pub const CREDENTIALS_ACTIVE: &str = "credentials_active";
    pub const CREDENTIALS_EXPIRED: &str = "credentials_expired";
    pub const CREDENTIALS_EXPIRING_30D: &str = "credentials_expiring_30d";
    pub const COMPLETIONS_30D: &str = "completions_30d";
    pub const COMPANIES_ACTIVE: &str = "companies_active";
    pub const COMPANIES_SUSPENDED: &str = "companies_suspended";
    pub const VALIDATION_SUCCESS_RATE_7D: &str = "validation_success_rate_7d";

    pub const ALL: &[&str] = &[
        CREDENTIALS_ACTIVE,
        CREDENTIALS_EXPIRED,
        CREDENTIALS_EXPIRING_30D,
        COMPLETIONS_30D,
        COMPANIES_ACTIVE,
        COMPANIES_SUSPENDED,
        VALIDATION_SUCCESS_RATE_7D,
    ];
}
