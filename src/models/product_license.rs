use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A sold license for the booking product, validated by customer installations
/// over `POST /api/product-license/validate`. The validation token is stored
/// hashed and never leaves the server after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductLicense {
    pub id: String,
    pub product_name: String,
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    /// Human-readable key, KKSP-XXXX-XXXX-XXXX. Not a secret.
    pub license_key: String,
    #[serde(skip_serializing)]
    pub validation_token_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_domain: Option<String>,
    pub max_users: i64,
    pub max_bookings_per_month: i64,
    /// JSON object of feature flags, stored raw.
    pub features: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductLicense {
    pub product_name: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub allowed_domain: Option<String>,
    #[serde(default)]
    pub max_users: Option<i64>,
    #[serde(default)]
    pub max_bookings_per_month: Option<i64>,
    #[serde(default)]
    pub features: Option<serde_json::Value>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl CreateProductLicense {
    pub fn validate(&self) -> Result<()> {
        if self.product_name.trim().is_empty() {
            return Err(AppError::BadRequest("product_name must not be empty".into()));
        }
        if self.customer_name.trim().is_empty() {
            return Err(AppError::BadRequest("customer_name must not be empty".into()));
        }
        if self.max_users.is_some_and(|n| n <= 0) {
            return Err(AppError::BadRequest("max_users must be positive".into()));
        }
        if self.max_bookings_per_month.is_some_and(|n| n <= 0) {
            return Err(AppError::BadRequest(
                "max_bookings_per_month must be positive".into(),
            ));
        }
        if let Some(features) = &self.features
            && !features.is_object()
        {
            return Err(AppError::BadRequest("features must be a JSON object".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductLicense {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    /// Some(None) clears the domain restriction, None leaves it unchanged.
    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub allowed_domain: Option<Option<String>>,
    pub max_users: Option<i64>,
    pub max_bookings_per_month: Option<i64>,
    pub features: Option<serde_json::Value>,
    pub active: Option<bool>,
    /// Some(None) makes the license perpetual, None leaves it unchanged.
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub expires_at: Option<Option<i64>>,
}

impl UpdateProductLicense {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.customer_name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest("customer_name must not be empty".into()));
        }
        if self.max_users.is_some_and(|n| n <= 0) {
            return Err(AppError::BadRequest("max_users must be positive".into()));
        }
        if self.max_bookings_per_month.is_some_and(|n| n <= 0) {
            return Err(AppError::BadRequest(
                "max_bookings_per_month must be positive".into(),
            ));
        }
        if let Some(features) = &self.features
            && !features.is_object()
        {
            return Err(AppError::BadRequest("features must be a JSON object".into()));
        }
        Ok(())
    }
}

/// Deserialize a field that can be:
/// - absent (None) - leave unchanged
/// - null (Some(None)) - clear the value
/// - present (Some(Some(value))) - set to value
fn deserialize_optional_field<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

fn deserialize_optional_i64<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<i64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

/// Creation response carrying the plaintext validation token, shown exactly
/// once.
#[derive(Debug, Serialize)]
pub struct ProductLicenseCreated {
    #[serde(flatten)]
    pub license: ProductLicense,
    pub validation_token: String,
}

/// One row per validation attempt that reached license lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_license_id: Option<String>,
    pub license_key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_domain: Option<String>,
    pub created_at: i64,
}
