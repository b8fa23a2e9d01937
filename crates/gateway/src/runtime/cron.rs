//! Timezone-aware cron evaluator (5-field: min hour dom month dow).

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Parse a timezone string into a `chrono_tz::Tz`, falling back to UTC.
pub fn parse_tz(tz: &str) -> chrono_tz::Tz {
    tz.parse::<chrono_tz::Tz>().unwrap_or(chrono_tz::UTC)
}

/// Parse a cron field and check if a value matches.
fn cron_field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    // Handle */N (every N)
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
    }
    // Handle comma-separated values
    for part in field.split(',') {
        // Handle range N-M
        if let Some((start_s, end_s)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start_s.parse::<u32>(), end_s.parse::<u32>()) {
                if value >= start && value <= end {
                    return true;
                }
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if value == n {
                return true;
            }
        }
    }
    false
}

/// Check if a **local** naive datetime matches a 5-field cron expression.
fn cron_matches_naive(cron: &str, dt: &chrono::NaiveDateTime) -> bool {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    cron_field_matches(fields[0], dt.minute())
        && cron_field_matches(fields[1], dt.hour())
        && cron_field_matches(fields[2], dt.day())
        && cron_field_matches(fields[3], dt.month())
        && cron_field_matches(fields[4], dt.weekday().num_days_from_sunday())
}

/// Check if a UTC datetime matches a 5-field cron expression (UTC shorthand).
pub fn cron_matches(cron: &str, dt: &DateTime<Utc>) -> bool {
    cron_matches_naive(cron, &dt.naive_utc())
}

/// Compute next occurrence after `after` for a cron expression,
/// evaluated in the given timezone. Returns a UTC `DateTime`.
///
/// **DST handling:**
/// - Spring-forward gaps: local times that don't exist are skipped.
/// - Fall-back overlaps: the earliest (pre-transition) mapping is chosen.
pub fn cron_next_tz(
    cron: &str,
    after: &DateTime<Utc>,
    tz: chrono_tz::Tz,
) -> Option<DateTime<Utc>> {
    use chrono::TimeZone;

    // Convert `after` to local time and advance to the next whole minute.
    let local_after = after.with_timezone(&tz).naive_local();
    let next_min_secs = 60 - (local_after.second() as i64);
    let mut candidate = local_after + chrono::Duration::seconds(next_min_secs);
    candidate = candidate.with_second(0).unwrap_or(candidate);

    let max_checks = 366 * 24 * 60; // one year of minutes
    for _ in 0..max_checks {
        if cron_matches_naive(cron, &candidate) {
            match tz.from_local_datetime(&candidate) {
                chrono::LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::Ambiguous(earliest, _) => {
                    return Some(earliest.with_timezone(&Utc));
                }
                chrono::LocalResult::None => {
                    // DST gap — this local minute doesn't exist. Skip.
                }
            }
        }
        candidate += chrono::Duration::minutes(1);
    }
    None
}

/// Convenience: compute next occurrence using UTC.
pub fn cron_next(cron: &str, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    cron_next_tz(cron, after, chrono_tz::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(cron_matches("* * * * *", &utc(2025, 6, 15, 12, 30)));
    }

    #[test]
    fn fixed_minute_and_hour() {
        assert!(cron_matches("30 12 * * *", &utc(2025, 6, 15, 12, 30)));
        assert!(!cron_matches("30 12 * * *", &utc(2025, 6, 15, 12, 31)));
    }

    #[test]
    fn step_values() {
        assert!(cron_matches("*/15 * * * *", &utc(2025, 6, 15, 12, 45)));
        assert!(!cron_matches("*/15 * * * *", &utc(2025, 6, 15, 12, 50)));
    }

    #[test]
    fn ranges_and_lists() {
        // Weekdays (Mon-Fri); 2025-06-16 is a Monday.
        assert!(cron_matches("0 9 * * 1-5", &utc(2025, 6, 16, 9, 0)));
        // 2025-06-15 is a Sunday.
        assert!(!cron_matches("0 9 * * 1-5", &utc(2025, 6, 15, 9, 0)));
        assert!(cron_matches("0 9 * * 0,6", &utc(2025, 6, 15, 9, 0)));
    }

    #[test]
    fn malformed_expression_never_matches() {
        assert!(!cron_matches("* * *", &utc(2025, 6, 15, 12, 0)));
        assert!(!cron_matches("not a cron", &utc(2025, 6, 15, 12, 0)));
    }

    #[test]
    fn next_occurrence_advances_to_match() {
        let after = utc(2025, 6, 15, 12, 10);
        let next = cron_next("30 12 * * *", &after).unwrap();
        assert_eq!(next, utc(2025, 6, 15, 12, 30));
    }

    #[test]
    fn next_occurrence_rolls_to_next_day() {
        let after = utc(2025, 6, 15, 13, 0);
        let next = cron_next("30 12 * * *", &after).unwrap();
        assert_eq!(next, utc(2025, 6, 16, 12, 30));
    }

    #[test]
    fn tz_evaluation_differs_from_utc() {
        // 09:00 in New York is 13:00/14:00 UTC depending on DST.
        let after = utc(2025, 6, 15, 0, 0);
        let tz = parse_tz("America/New_York");
        let next = cron_next_tz("0 9 * * *", &after, tz).unwrap();
        assert_eq!(next, utc(2025, 6, 15, 13, 0)); // EDT = UTC-4
    }

    #[test]
    fn unknown_tz_falls_back_to_utc() {
        assert_eq!(parse_tz("Not/AZone"), chrono_tz::UTC);
    }
}
