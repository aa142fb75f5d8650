//! Email notifications for license state changes.
//!
//! Sends via the Resend API when an API key is configured; otherwise delivery
//! is disabled and sends become log-only no-ops. Callers treat every send as
//! best-effort: a failed notification is logged and never fails the state
//! change that triggered it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp as a Norwegian-style date (e.g., "15.01.2024")
fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "ukjent dato".to_string())
}

/// Result of attempting to send a notification email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    /// Email was sent successfully via Resend
    Sent,
    /// No API key configured; delivery disabled
    Disabled,
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    text: String,
    html: String,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

/// Email service using Resend API.
#[derive(Clone)]
pub struct EmailService {
    /// Resend API key (from ENV); None disables delivery
    api_key: Option<String>,
    /// "from" address (from ENV)
    from_email: String,
    /// HTTP client for API calls
    http_client: Client,
}

impl EmailService {
    pub fn new(api_key: Option<String>, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            http_client: Client::new(),
        }
    }

    /// True when a send would actually go out.
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Notify a company contact that their license was suspended.
    pub async fn send_license_suspended(
        &self,
        to_email: &str,
        company_name: &str,
        reason: &str,
    ) -> Result<EmailSendResult> {
        let Some(ref api_key) = self.api_key else {
            tracing::debug!(
                to = %to_email,
                company = %company_name,
                "No Resend API key configured, skipping suspension email"
            );
            return Ok(EmailSendResult::Disabled);
        };

        let subject = format!("Lisensen for {} er suspendert", company_name);
        let text = format!(
            "Hei,\n\nLisensen for {} er suspendert.\n\nÅrsak: {}\n\nTa kontakt med KKS AS for å avklare situasjonen og få lisensen gjenåpnet.\n\nVennlig hilsen\nKKS AS",
            company_name, reason
        );
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Lisensen for {} er suspendert</h2>
<p>Lisensen deres hos KKS AS er suspendert.</p>
<div style="background: #fff3f3; padding: 16px; border-radius: 8px; margin: 16px 0;">
<p style="margin: 0;"><strong>Årsak:</strong> {}</p>
</div>
<p>Ta kontakt med KKS AS for å avklare situasjonen og få lisensen gjenåpnet.</p>
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Vennlig hilsen<br>KKS AS</p>
</body>
</html>"#,
            company_name, reason
        );

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![to_email],
            subject,
            text,
            html,
        };

        self.send_request_with_retry(api_key, &request, to_email, company_name)
            .await
    }

    /// Notify a company contact that their license was resumed, with the new
    /// expiry date when one exists.
    pub async fn send_license_resumed(
        &self,
        to_email: &str,
        company_name: &str,
        end_date: Option<i64>,
    ) -> Result<EmailSendResult> {
        let Some(ref api_key) = self.api_key else {
            tracing::debug!(
                to = %to_email,
                company = %company_name,
                "No Resend API key configured, skipping resumption email"
            );
            return Ok(EmailSendResult::Disabled);
        };

        let validity_line = match end_date {
            Some(end) => format!("Lisensen er gyldig til {}.", format_date(end)),
            None => "Lisensen har ingen utløpsdato.".to_string(),
        };

        let subject = format!("Lisensen for {} er gjenåpnet", company_name);
        let text = format!(
            "Hei,\n\nLisensen for {} er gjenåpnet og kan brukes som normalt.\n\n{}\n\nVennlig hilsen\nKKS AS",
            company_name, validity_line
        );
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Lisensen for {} er gjenåpnet</h2>
<p>Lisensen deres hos KKS AS er gjenåpnet og kan brukes som normalt.</p>
<div style="background: #f2f9f2; padding: 16px; border-radius: 8px; margin: 16px 0;">
<p style="margin: 0;">{}</p>
</div>
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Vennlig hilsen<br>KKS AS</p>
</body>
</html>"#,
            company_name, validity_line
        );

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![to_email],
            subject,
            text,
            html,
        };

        self.send_request_with_retry(api_key, &request, to_email, company_name)
            .await
    }

    /// Send a request to Resend API with exponential backoff retry.
    ///
    /// Retries on transient errors (network issues, 5xx, 429 rate limit).
    /// Fails immediately on non-transient errors (4xx except 429).
    async fn send_request_with_retry(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
        to_email: &str,
        company_name: &str,
    ) -> Result<EmailSendResult> {
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            // Sleep before retry (skip on first attempt)
            if *delay_secs > 0 {
                tracing::warn!(
                    attempt,
                    delay_secs,
                    "Retrying email send after transient failure"
                );
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_resend_request(api_key, request).await {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(
                            attempt,
                            to = %to_email,
                            company = %company_name,
                            "Email sent successfully after retry"
                        );
                    } else {
                        tracing::info!(
                            to = %to_email,
                            company = %company_name,
                            "Notification email sent via Resend"
                        );
                    }
                    return Ok(EmailSendResult::Sent);
                }
                Err((error, is_transient)) => {
                    if is_transient {
                        last_error = Some(error);
                        // Continue to next retry
                    } else {
                        // Non-transient error, fail immediately
                        return Err(error);
                    }
                }
            }
        }

        // All retries exhausted
        tracing::error!(
            to = %to_email,
            company = %company_name,
            attempts = RETRY_DELAYS.len() + 1,
            "Email send failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal("Email service error: all retries exhausted".into())
        }))
    }

    /// Send a single request to Resend API.
    ///
    /// Returns Ok(()) on success, or Err((AppError, is_transient)) on failure.
    async fn send_resend_request(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
    ) -> std::result::Result<(), (AppError, bool)> {
        let response = self
            .http_client
            .post(RESEND_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send request to Resend API");
                // Network errors are transient
                (
                    AppError::Internal(format!("Email service error: {}", e)),
                    true,
                )
            })?;

        let status = response.status();

        if status.is_success() {
            let _result: ResendEmailResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Resend API response");
                // Parse errors after success are weird but not transient
                (AppError::Internal("Email service response error".into()), false)
            })?;
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();

            // Determine if error is transient (should retry)
            let is_transient = status.as_u16() == 429 // Rate limited
                || status.is_server_error(); // 5xx errors

            if is_transient {
                tracing::warn!(
                    status = %status,
                    body = %body,
                    "Resend API returned transient error"
                );
            } else {
                tracing::error!(
                    status = %status,
                    body = %body,
                    "Resend API returned non-transient error"
                );
            }

            Err((
                AppError::Internal(format!("Email service error: {} - {}", status, body)),
                is_transient,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_api_key() {
        let service = EmailService::new(None, "KKS AS <post@kks.no>".to_string());
        assert!(!service.is_enabled());
    }

    #[test]
    fn formats_norwegian_dates() {
        // 2024-01-15 12:00 UTC
        assert_eq!(format_date(1705320000), "15.01.2024");
    }

    #[test]
    fn retry_delays_configuration() {
        assert_eq!(RETRY_DELAYS.len(), 3, "Should have 3 retry attempts");
        assert_eq!(RETRY_DELAYS, &[1, 4, 16], "Exponential backoff: 1s, 4s, 16s");

        // Total max wait time should be reasonable (21 seconds)
        let total_delay: u64 = RETRY_DELAYS.iter().sum();
        assert_eq!(total_delay, 21);
    }
}
