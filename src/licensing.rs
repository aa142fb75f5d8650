//! Company license state machine.
//!
//! Persisted statuses are TRIAL, ACTIVE, SUSPENDED and CANCELLED. EXPIRED is
//! derived at read time from the current license's end date, using the same
//! grace rule as credential validity: usable while
//! `now <= end_date + grace_period_days`. Suspend and resume write the company
//! row, the mirrored license row and the activity entry inside one immediate
//! transaction, so a crash between writes cannot leave the status and the
//! trail disagreeing. Notification emails are sent by the caller after commit;
//! the state change is authoritative and never waits on delivery.

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use serde_json::json;

use crate::db::queries;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::models::{ActivityAction, Company, CreateCompany, CreateLicense, License, LicenseStatus};
use crate::validity::{EXPIRY_WARNING_DAYS, SECONDS_PER_DAY, days_between};

/// Days a fresh company can evaluate before needing a real license.
pub const TRIAL_DAYS: i64 = 30;

/// Read-time license verdict for a company.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseCheck {
    pub company_id: String,
    pub is_valid: bool,
    pub status: LicenseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_until_expiry: Option<i64>,
}

/// Result of a suspend, resume or license-issue transition.
#[derive(Debug, Serialize)]
pub struct TransitionOutcome {
    pub company: Company,
    pub license: License,
}

/// Evaluate whether a company's license is currently usable.
pub fn check_company_license(conn: &Connection, company_id: &str, now: i64) -> Result<LicenseCheck> {
    let company =
        queries::get_company_by_id(conn, company_id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;

    let verdict = |is_valid, status, message: Option<String>, days: Option<i64>| LicenseCheck {
        company_id: company.id.clone(),
        is_valid,
        status,
        message,
        days_until_expiry: days,
    };

    match company.license_status {
        LicenseStatus::Suspended => {
            let message = company
                .suspended_reason
                .clone()
                .unwrap_or_else(|| "License suspended".to_string());
            Ok(verdict(false, LicenseStatus::Suspended, Some(message), None))
        }
        LicenseStatus::Cancelled => Ok(verdict(
            false,
            LicenseStatus::Cancelled,
            Some("License cancelled".to_string()),
            None,
        )),
        stored => {
            let license = match company.current_license_id {
                Some(ref id) => queries::get_license_by_id(conn, id)?,
                None => None,
            };

            let Some(license) = license else {
                // Trial created before license rows existed; usable but unbounded.
                return Ok(verdict(true, stored, None, None));
            };

            let Some(end_date) = license.end_date else {
                return Ok(verdict(true, stored, None, None));
            };

            let grace_end = end_date + license.grace_period_days * SECONDS_PER_DAY;
            if now > grace_end {
                return Ok(verdict(
                    false,
                    LicenseStatus::Expired,
                    Some("License expired".to_string()),
                    None,
                ));
            }
            if now > end_date {
                let remaining = days_between(now, grace_end);
                return Ok(verdict(
                    true,
                    LicenseStatus::Active,
                    Some(format!("Grace period: {} days remaining", remaining)),
                    None,
                ));
            }

            let days = days_between(now, end_date);
            let message = (days <= EXPIRY_WARNING_DAYS)
                .then(|| format!("License expires in {} days", days));
            Ok(verdict(true, stored, message, Some(days)))
        }
    }
}

/// Create a company together with its trial license and CREATED activity row,
/// all in one transaction.
pub fn create_company_with_trial(
    conn: &mut Connection,
    input: &CreateCompany,
    performed_by: &str,
) -> Result<TransitionOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let company = queries::create_company(&tx, input)?;
    let start = queries::now();
    let license = queries::insert_license(
        &tx,
        &company.id,
        Some("Trial"),
        LicenseStatus::Trial,
        start,
        Some(start + TRIAL_DAYS * SECONDS_PER_DAY),
        0,
    )?;
    queries::set_company_current_license(&tx, &company.id, &license.id, LicenseStatus::Trial)?;
    queries::insert_license_activity(
        &tx,
        &license.id,
        &company.id,
        ActivityAction::Created,
        performed_by,
        Some(&json!({ "plan": "Trial", "trial_days": TRIAL_DAYS }).to_string()),
    )?;

    let company =
        queries::get_company_by_id(&tx, &company.id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;
    tx.commit()?;

    Ok(TransitionOutcome { company, license })
}

/// Issue a new license for a company and make it current.
///
/// Allowed from TRIAL, ACTIVE and CANCELLED (a fresh license is the rescue
/// path for a cancelled company). A suspended company must be resumed first.
pub fn issue_license(
    conn: &mut Connection,
    company_id: &str,
    input: &CreateLicense,
    performed_by: &str,
) -> Result<TransitionOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let company =
        queries::get_company_by_id(&tx, company_id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;
    if company.license_status == LicenseStatus::Suspended {
        return Err(AppError::Conflict(
            "Company is suspended; resume it before issuing a new license".into(),
        ));
    }

    let start = input.start_date.unwrap_or_else(queries::now);
    let license = queries::insert_license(
        &tx,
        company_id,
        input.plan_name.as_deref(),
        LicenseStatus::Active,
        start,
        input.end_date,
        input.grace_period_days.unwrap_or(0),
    )?;
    queries::set_company_current_license(&tx, company_id, &license.id, LicenseStatus::Active)?;
    queries::insert_license_activity(
        &tx,
        &license.id,
        company_id,
        ActivityAction::Created,
        performed_by,
        input
            .plan_name
            .as_ref()
            .map(|plan| json!({ "plan": plan }).to_string())
            .as_deref(),
    )?;

    let company =
        queries::get_company_by_id(&tx, company_id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;
    tx.commit()?;

    Ok(TransitionOutcome { company, license })
}

/// Suspend a company's license.
///
/// Company status, the mirrored license row and the SUSPENDED activity entry
/// are written in one transaction. Suspending an already-suspended or
/// cancelled company is a state conflict.
pub fn suspend_company_license(
    conn: &mut Connection,
    company_id: &str,
    reason: &str,
    performed_by: &str,
) -> Result<TransitionOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let company =
        queries::get_company_by_id(&tx, company_id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;
    match company.license_status {
        LicenseStatus::Suspended => {
            return Err(AppError::Conflict(
                "Company license is already suspended".into(),
            ));
        }
        LicenseStatus::Cancelled => {
            return Err(AppError::Conflict(
                "Cannot suspend a cancelled license".into(),
            ));
        }
        _ => {}
    }

    let license_id = company
        .current_license_id
        .clone()
        .or_not_found(msg::LICENSE_NOT_FOUND)?;
    let at = queries::now();

    queries::suspend_license_row(&tx, &license_id, reason, at)?;
    queries::suspend_company_row(&tx, company_id, reason, at)?;
    queries::insert_license_activity(
        &tx,
        &license_id,
        company_id,
        ActivityAction::Suspended,
        performed_by,
        Some(&json!({ "reason": reason }).to_string()),
    )?;

    let company =
        queries::get_company_by_id(&tx, company_id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;
    let license =
        queries::get_license_by_id(&tx, &license_id)?.or_not_found(msg::LICENSE_NOT_FOUND)?;
    tx.commit()?;

    Ok(TransitionOutcome { company, license })
}

/// Resume a suspended company, optionally extending the license end date.
///
/// An extension is applied to the stored end date, never to `now`, so a
/// company resumed after its license already lapsed is extended from the
/// original end date and repeated extensions compound. Resuming restores
/// ACTIVE even when the company was suspended during its trial. A perpetual
/// license (no end date) stays perpetual; the extension request is then
/// recorded as a plain RESUMED activity.
pub fn resume_company_license(
    conn: &mut Connection,
    company_id: &str,
    extend_days: Option<i64>,
    performed_by: &str,
) -> Result<TransitionOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let company =
        queries::get_company_by_id(&tx, company_id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;
    if company.license_status != LicenseStatus::Suspended {
        return Err(AppError::Conflict(
            "Company license is not suspended".into(),
        ));
    }

    let license_id = company
        .current_license_id
        .clone()
        .or_not_found(msg::LICENSE_NOT_FOUND)?;
    let license =
        queries::get_license_by_id(&tx, &license_id)?.or_not_found(msg::LICENSE_NOT_FOUND)?;
    let at = queries::now();

    let new_end = match (license.end_date, extend_days) {
        (Some(end), Some(days)) => Some(end + days * SECONDS_PER_DAY),
        (end, _) => end,
    };
    let extended = new_end != license.end_date;

    queries::resume_license_row(&tx, &license_id, LicenseStatus::Active, new_end, at)?;
    queries::resume_company_row(&tx, company_id, LicenseStatus::Active, at)?;

    let (action, details) = if extended {
        (
            ActivityAction::Extended,
            Some(json!({ "extend_days": extend_days, "new_end_date": new_end }).to_string()),
        )
    } else {
        (ActivityAction::Resumed, None)
    };
    queries::insert_license_activity(
        &tx,
        &license_id,
        company_id,
        action,
        performed_by,
        details.as_deref(),
    )?;

    let company =
        queries::get_company_by_id(&tx, company_id)?.or_not_found(msg::COMPANY_NOT_FOUND)?;
    let license =
        queries::get_license_by_id(&tx, &license_id)?.or_not_found(msg::LICENSE_NOT_FOUND)?;
    tx.commit()?;

    Ok(TransitionOutcome { company, license })
}
