//! Credential validity resolution.
//!
//! Pure date arithmetic over a credential's validity window: no I/O, no clock
//! access. Callers pass `now` explicitly, which keeps every rule testable and
//! guarantees the admin list, the public verification endpoint, and the license
//! checks all agree on one boundary: a credential is usable while
//! `now <= valid_to + grace_days`.

use chrono::{DateTime, Months};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Days before `valid_to` at which a credential starts reporting `expiring_soon`.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Valid,
    ExpiringSoon,
    Expired,
}

/// Outcome of resolving a validity window at a point in time.
///
/// `status == Expired` with `is_valid == true` means the credential is past its
/// nominal expiry but inside the grace window; `in_grace` is set so UIs can
/// render that case distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedValidity {
    pub status: CredentialStatus,
    pub is_valid: bool,
    pub in_grace: bool,
    /// Whole days until `valid_to` (ceiling), present while `now <= valid_to`.
    pub days_until_expiry: Option<i64>,
}

/// Resolve the status of a validity window.
///
/// - `valid_to` absent: valid indefinitely.
/// - `now <= valid_to`: valid, or `expiring_soon` within the warning window.
/// - `valid_to < now <= valid_to + grace_days`: reported expired but still usable.
/// - past the grace window: expired and unusable.
pub fn resolve_status(valid_to: Option<i64>, grace_days: i64, now: i64) -> ResolvedValidity {
    let Some(valid_to) = valid_to else {
        return ResolvedValidity {
            status: CredentialStatus::Valid,
            is_valid: true,
            in_grace: false,
            days_until_expiry: None,
        };
    };

    let grace_days = grace_days.max(0);
    let effective_expiry = valid_to + grace_days * SECONDS_PER_DAY;

    if now > effective_expiry {
        return ResolvedValidity {
            status: CredentialStatus::Expired,
            is_valid: false,
            in_grace: false,
            days_until_expiry: None,
        };
    }

    if now > valid_to {
        return ResolvedValidity {
            status: CredentialStatus::Expired,
            is_valid: true,
            in_grace: true,
            days_until_expiry: None,
        };
    }

    let days_until = days_between(now, valid_to);
    let status = if days_until <= EXPIRY_WARNING_DAYS {
        CredentialStatus::ExpiringSoon
    } else {
        CredentialStatus::Valid
    };

    ResolvedValidity {
        status,
        is_valid: true,
        in_grace: false,
        days_until_expiry: Some(days_until),
    }
}

/// Whole days from `from` to `to`, rounded up so a partial day still counts.
pub fn days_between(from: i64, to: i64) -> i64 {
    if to <= from {
        return 0;
    }
    (to - from + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

/// Nominal expiry for a credential issued at `issued_at` under a policy of
/// `validity_months` calendar months. `None` months means the credential never
/// expires. Calendar-accurate: issuing Jan 31 with one month lands on the last
/// day of February.
pub fn expiry_after_months(issued_at: i64, validity_months: Option<u32>) -> Option<i64> {
    let months = validity_months?;
    DateTime::from_timestamp(issued_at, 0)
        .and_then(|dt| dt.checked_add_months(Months::new(months)))
        .map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap().timestamp()
    }

    #[test]
    fn no_expiry_is_always_valid() {
        for now in [0, ts(1990, 1, 1), ts(2024, 6, 1), ts(2099, 12, 31)] {
            let r = resolve_status(None, 0, now);
            assert_eq!(r.status, CredentialStatus::Valid);
            assert!(r.is_valid);
            assert!(!r.in_grace);
            assert_eq!(r.days_until_expiry, None);
        }
    }

    #[test]
    fn valid_well_before_expiry() {
        let r = resolve_status(Some(ts(2024, 12, 1)), 0, ts(2024, 1, 1));
        assert_eq!(r.status, CredentialStatus::Valid);
        assert!(r.is_valid);
        assert!(r.days_until_expiry.unwrap() > EXPIRY_WARNING_DAYS);
    }

    #[test]
    fn expiring_soon_inside_warning_window() {
        let valid_to = ts(2024, 2, 1);
        let r = resolve_status(Some(valid_to), 0, ts(2024, 1, 20));
        assert_eq!(r.status, CredentialStatus::ExpiringSoon);
        assert!(r.is_valid);
        assert_eq!(r.days_until_expiry, Some(12));
    }

    #[test]
    fn on_expiry_day_still_valid() {
        let valid_to = ts(2024, 2, 1);
        let r = resolve_status(Some(valid_to), 30, valid_to);
        assert_eq!(r.status, CredentialStatus::ExpiringSoon);
        assert!(r.is_valid);
        assert_eq!(r.days_until_expiry, Some(0));
    }

    #[test]
    fn grace_window_keeps_credential_usable() {
        // valid_to 2024-01-01, 30 days grace, checked 2024-01-15
        let r = resolve_status(Some(ts(2024, 1, 1)), 30, ts(2024, 1, 15));
        assert_eq!(r.status, CredentialStatus::Expired);
        assert!(r.is_valid);
        assert!(r.in_grace);
    }

    #[test]
    fn expired_past_grace() {
        // valid_to 2024-01-01, 30 days grace, checked 2024-02-15
        let r = resolve_status(Some(ts(2024, 1, 1)), 30, ts(2024, 2, 15));
        assert_eq!(r.status, CredentialStatus::Expired);
        assert!(!r.is_valid);
        assert!(!r.in_grace);
    }

    #[test]
    fn grace_boundary_is_inclusive() {
        let valid_to = ts(2024, 1, 1);
        let effective = valid_to + 30 * SECONDS_PER_DAY;

        let at_boundary = resolve_status(Some(valid_to), 30, effective);
        assert!(at_boundary.is_valid);
        assert!(at_boundary.in_grace);

        let past_boundary = resolve_status(Some(valid_to), 30, effective + 1);
        assert!(!past_boundary.is_valid);
        assert_eq!(past_boundary.status, CredentialStatus::Expired);
    }

    #[test]
    fn zero_grace_expires_immediately() {
        let valid_to = ts(2024, 1, 1);
        let r = resolve_status(Some(valid_to), 0, valid_to + 1);
        assert_eq!(r.status, CredentialStatus::Expired);
        assert!(!r.is_valid);
    }

    #[test]
    fn negative_grace_treated_as_zero() {
        let valid_to = ts(2024, 1, 1);
        let r = resolve_status(Some(valid_to), -10, valid_to + 1);
        assert!(!r.is_valid);
    }

    #[test]
    fn days_between_rounds_up() {
        assert_eq!(days_between(0, 0), 0);
        assert_eq!(days_between(0, 1), 1);
        assert_eq!(days_between(0, SECONDS_PER_DAY), 1);
        assert_eq!(days_between(0, SECONDS_PER_DAY + 1), 2);
        assert_eq!(days_between(100, 50), 0);
    }

    #[test]
    fn expiry_after_months_is_calendar_accurate() {
        // Jan 31 2024 + 1 month clamps to Feb 29 (leap year)
        let issued = Utc.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).unwrap().timestamp();
        let expiry = expiry_after_months(issued, Some(1)).unwrap();
        let dt = DateTime::from_timestamp(expiry, 0).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-02-29");

        // 36-month policies land on the same day three years out
        let issued = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap().timestamp();
        let expiry = expiry_after_months(issued, Some(36)).unwrap();
        let dt = DateTime::from_timestamp(expiry, 0).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2027-03-15");
    }

    #[test]
    fn expiry_after_months_none_means_never() {
        assert_eq!(expiry_after_months(ts(2024, 1, 1), None), None);
    }
}
