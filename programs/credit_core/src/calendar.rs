// programs/credit_core/src/calendar.rs
//
// 30/360 Calendar
// ===============
//
// Day counts for simple-interest accrual and the period boundaries that
// close redemption epochs. Timestamps are Unix seconds (UTC); all dates are
// proleptic Gregorian.

use anchor_lang::prelude::*;

use crate::constants::{DAYS_IN_A_MONTH, DAYS_IN_A_YEAR, SECONDS_PER_DAY};

// =============================================================================
// PAY PERIODS
// =============================================================================

/// Length of a pay period, which is also the length of a redemption epoch
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
#[repr(u8)]
pub enum PayPeriodDuration {
    Monthly = 0,
    Quarterly = 1,
    SemiAnnually = 2,
}

impl Default for PayPeriodDuration {
    fn default() -> Self {
        PayPeriodDuration::Monthly
    }
}

impl PayPeriodDuration {
    pub fn months(&self) -> u32 {
        match self {
            PayPeriodDuration::Monthly => 1,
            PayPeriodDuration::Quarterly => 3,
            PayPeriodDuration::SemiAnnually => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PayPeriodDuration::Monthly => "Monthly",
            PayPeriodDuration::Quarterly => "Quarterly",
            PayPeriodDuration::SemiAnnually => "Semi-annually",
        }
    }
}

// =============================================================================
// DATE CONVERSION
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CalendarDate {
    pub year: i64,
    /// 1..=12
    pub month: u32,
    /// 1..=31
    pub day: u32,
}

impl CalendarDate {
    pub fn from_timestamp(timestamp: i64) -> Self {
        let (year, month, day) = civil_from_days(timestamp.div_euclid(SECONDS_PER_DAY));
        CalendarDate { year, month, day }
    }

    /// Midnight UTC at the start of this date
    pub fn to_timestamp(&self) -> i64 {
        days_from_civil(self.year, self.month, self.day).saturating_mul(SECONDS_PER_DAY)
    }
}

// Days since 1970-01-01 for a civil date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = (month as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

// =============================================================================
// DAY COUNTS AND BOUNDARIES
// =============================================================================

/// Days between two timestamps under the 30/360 convention.
/// Time of day is ignored; a reversed range counts as zero days.
pub fn days_diff(start: i64, end: i64) -> u64 {
    if end <= start {
        return 0;
    }
    let from = CalendarDate::from_timestamp(start);
    let to = CalendarDate::from_timestamp(end);

    let start_day = from.day.min(DAYS_IN_A_MONTH as u32) as i64;
    let end_day = if to.day == 31 && start_day == 30 {
        30
    } else {
        to.day as i64
    };

    let days = (to.year - from.year) * DAYS_IN_A_YEAR as i64
        + (to.month as i64 - from.month as i64) * DAYS_IN_A_MONTH as i64
        + (end_day - start_day);

    days.max(0) as u64
}

/// Midnight UTC on the first day of the period after the one containing
/// `timestamp`
pub fn start_of_next_period(duration: PayPeriodDuration, timestamp: i64) -> i64 {
    let date = CalendarDate::from_timestamp(timestamp);
    let months = duration.months();
    let month_index = (date.month - 1) / months * months + months;
    CalendarDate {
        year: date.year + (month_index / 12) as i64,
        month: month_index % 12 + 1,
        day: 1,
    }
    .to_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(year: i64, month: u32, day: u32) -> i64 {
        CalendarDate { year, month, day }.to_timestamp()
    }

    #[test]
    fn test_date_conversion_known_points() {
        assert_eq!(ts(1970, 1, 1), 0);
        assert_eq!(ts(2000, 3, 1), 951_868_800);
        assert_eq!(ts(2024, 2, 29), 1_709_164_800);

        let date = CalendarDate::from_timestamp(1_709_164_800 + 3_600);
        assert_eq!(date, CalendarDate { year: 2024, month: 2, day: 29 });
    }

    #[test]
    fn test_days_diff_thirty_360() {
        assert_eq!(days_diff(ts(2024, 1, 1), ts(2024, 2, 1)), 30);
        assert_eq!(days_diff(ts(2024, 1, 1), ts(2025, 1, 1)), 360);
        assert_eq!(days_diff(ts(2024, 1, 31), ts(2024, 3, 31)), 60);
        assert_eq!(days_diff(ts(2024, 2, 1), ts(2024, 3, 1)), 30);
        assert_eq!(days_diff(ts(2024, 1, 15), ts(2024, 1, 20)), 5);
    }

    #[test]
    fn test_days_diff_reversed_or_same_day() {
        assert_eq!(days_diff(ts(2024, 5, 1), ts(2024, 4, 1)), 0);
        assert_eq!(days_diff(ts(2024, 5, 1), ts(2024, 5, 1) + 7_200), 0);
    }

    #[test]
    fn test_next_period_boundaries() {
        let mid_may = ts(2024, 5, 17) + 12 * 3_600;
        assert_eq!(
            start_of_next_period(PayPeriodDuration::Monthly, mid_may),
            ts(2024, 6, 1)
        );
        assert_eq!(
            start_of_next_period(PayPeriodDuration::Quarterly, mid_may),
            ts(2024, 7, 1)
        );
        assert_eq!(
            start_of_next_period(PayPeriodDuration::SemiAnnually, mid_may),
            ts(2024, 7, 1)
        );
        assert_eq!(
            start_of_next_period(PayPeriodDuration::Monthly, ts(2024, 12, 31)),
            ts(2025, 1, 1)
        );
        assert_eq!(
            start_of_next_period(PayPeriodDuration::SemiAnnually, ts(2024, 9, 2)),
            ts(2025, 1, 1)
        );
    }
}
