//! UTC day bucketing

use chrono::{DateTime, Utc};

/// Seconds in one UTC day
pub const SEC_PER_DAY: i64 = 86_400;

/// Start of the UTC day containing `time`
pub fn normalize_time(time: i64) -> i64 {
    time - time.rem_euclid(SEC_PER_DAY)
}

/// Whole days between the day containing `earlier` and the day containing `later`
pub fn days_between(earlier: i64, later: i64) -> i64 {
    (normalize_time(later) - normalize_time(earlier)) / SEC_PER_DAY
}

/// `YYYY-MM-DD` label of the UTC day containing `time`
pub fn day_label(time: i64) -> String {
    match DateTime::<Utc>::from_timestamp(normalize_time(time), 0) {
        Some(datetime) => datetime.format("%Y-%m-%d").to_string(),
        None => format!("day@{}", time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_time() {
        assert_eq!(normalize_time(0), 0);
        assert_eq!(normalize_time(SEC_PER_DAY - 1), 0);
        assert_eq!(normalize_time(SEC_PER_DAY), SEC_PER_DAY);
        assert_eq!(normalize_time(-1), -SEC_PER_DAY);
    }

    #[test]
    fn test_days_between() {
        let monday = 1_700_000_000;
        assert_eq!(days_between(monday, monday + 10), 0);
        assert_eq!(days_between(monday, monday + 3 * SEC_PER_DAY), 3);
        assert_eq!(days_between(normalize_time(monday), normalize_time(monday) + SEC_PER_DAY - 1), 0);
    }

    #[test]
    fn test_day_label() {
        assert_eq!(day_label(0), "1970-01-01");
        assert_eq!(day_label(1_704_067_200 + 3_600), "2024-01-01");
    }
}
