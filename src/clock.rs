use chrono::{Datelike, NaiveTime, TimeZone, Utc};

/// Current wall-clock as unix-epoch seconds. Persisted timestamps are
/// always epoch seconds; chrono is only used for calendar math.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// The next UTC midnight strictly after `now`.
pub fn next_day_boundary(now: i64) -> i64 {
    let date = to_utc(now).date_naive() + chrono::Days::new(1);
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)).timestamp()
}

/// 00:00 UTC on the first day of the month after `now`.
pub fn next_month_boundary(now: i64) -> i64 {
    let date = to_utc(now).date_naive();
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let first = chrono::NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date);
    Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN)).timestamp()
}

/// 00:00 UTC of the day containing `now`.
pub fn day_start(now: i64) -> i64 {
    let date = to_utc(now).date_naive();
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)).timestamp()
}

/// The calendar year containing `now`, for entry numbering.
pub fn year_of(now: i64) -> i32 {
    to_utc(now).year()
}

fn to_utc(ts: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_boundary_is_next_midnight() {
        // 2026-03-10 23:59:00 UTC
        let now = 1773187140;
        let boundary = next_day_boundary(now);
        assert_eq!(boundary, 1773187200); // 2026-03-11 00:00:00
        assert!(boundary > now);
    }

    #[test]
    fn month_boundary_rolls_over_december() {
        // 2025-12-31 12:00:00 UTC
        let now = 1767182400;
        let boundary = next_month_boundary(now);
        assert_eq!(year_of(boundary), 2026);
        assert_eq!(boundary, 1767225600); // 2026-01-01 00:00:00
    }

    #[test]
    fn day_start_truncates() {
        let now = 1773187140;
        assert_eq!(day_start(now), 1773100800); // 2026-03-10 00:00:00
    }
}
