//! # Scheduled-Job Recurrence Rules
//!
//! Pure calendar math for the scheduled-job runner: given a recurrence
//! rule and the instant a job just ran, compute the next run time. The
//! runner advances the schedule after every execution, success or
//! failure, so a failing job never wedges its slot.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// How often a scheduled job recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    /// Computes the next run time strictly after `after`.
    ///
    /// Monthly adds one calendar month, clamped at month end
    /// (Jan 31 → Feb 28/29), rather than a fixed 30 days.
    pub fn next_run(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Recurrence::Hourly => after + Duration::hours(1),
            Recurrence::Daily => after + Duration::days(1),
            Recurrence::Weekly => after + Duration::weeks(1),
            Recurrence::Monthly => after
                .checked_add_months(Months::new(1))
                // Only fails at the far end of the chrono range
                .unwrap_or(after + Duration::days(31)),
        }
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recurrence::Hourly => write!(f, "hourly"),
            Recurrence::Daily => write!(f, "daily"),
            Recurrence::Weekly => write!(f, "weekly"),
            Recurrence::Monthly => write!(f, "monthly"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 30, 0).unwrap()
    }

    #[test]
    fn test_hourly_daily_weekly() {
        let t = at(2026, 3, 10, 9);
        assert_eq!(Recurrence::Hourly.next_run(t), at(2026, 3, 10, 10));
        assert_eq!(Recurrence::Daily.next_run(t), at(2026, 3, 11, 9));
        assert_eq!(Recurrence::Weekly.next_run(t), at(2026, 3, 17, 9));
    }

    #[test]
    fn test_monthly_clamps_at_month_end() {
        let jan31 = at(2026, 1, 31, 6);
        assert_eq!(Recurrence::Monthly.next_run(jan31), at(2026, 2, 28, 6));

        let leap = at(2024, 1, 31, 6);
        assert_eq!(Recurrence::Monthly.next_run(leap), at(2024, 2, 29, 6));
    }

    #[test]
    fn test_monthly_across_year_boundary() {
        let dec15 = at(2026, 12, 15, 0);
        assert_eq!(Recurrence::Monthly.next_run(dec15), at(2027, 1, 15, 0));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Recurrence::Weekly).unwrap(), "\"weekly\"");
        let r: Recurrence = serde_json::from_str("\"monthly\"").unwrap();
        assert_eq!(r, Recurrence::Monthly);
    }
}
