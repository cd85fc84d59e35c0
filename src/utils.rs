use crate::error::{ForecastError, Result};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Weekday};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn next_month_start(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .unwrap_or(NaiveDate::MAX)
}

pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Every calendar day of the month containing `date`, in order.
pub fn days_of_month(date: NaiveDate) -> Vec<NaiveDate> {
    let start = first_day_of_month(date);
    let end = last_day_of_month(date.year(), date.month());
    days_in_range(start, end)
}

/// Inclusive day range. Empty when `end < start`.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// First-of-month dates for every month touched by `[start, end]`.
pub fn get_month_starts_in_period(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();

    let mut current = first_day_of_month(start);
    while current <= end {
        dates.push(current);
        let next = next_month_start(current);
        if next == current {
            break;
        }
        current = next;
    }

    dates
}

/// Parses a date cell as it typically appears in exported spreadsheets.
/// A trailing time part is accepted and discarded.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt.date());
        }
    }

    Err(ForecastError::DateError(format!(
        "Invalid date '{}'. Expected YYYY-MM-DD",
        trimmed
    )))
}

/// Parses a numeric cell, tolerating whitespace and thousands separators.
/// Returns `None` for anything that is not a finite number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rounds to the nearest whole unit and clamps at zero. NaN maps to zero.
pub fn round_non_negative(value: f64) -> f64 {
    let rounded = value.round();
    if rounded > 0.0 {
        rounded
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_month_start() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        assert_eq!(
            next_month_start(date),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
        );

        let date = NaiveDate::from_ymd_opt(2023, 12, 15).unwrap();
        assert_eq!(
            next_month_start(date),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            last_day_of_month(2023, 12),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_days_of_month() {
        assert_eq!(days_of_month(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()).len(), 29);
        assert_eq!(days_of_month(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()).len(), 30);
        assert_eq!(days_of_month(NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()).len(), 31);
    }

    #[test]
    fn test_month_starts_in_period() {
        let starts = get_month_starts_in_period(
            NaiveDate::from_ymd_opt(2024, 11, 20).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        );
        assert_eq!(
            starts,
            vec![
                NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            ]
        );
    }

    #[test]
    fn test_days_in_range_empty_when_reversed() {
        let a = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        assert!(days_in_range(a, b).is_empty());
        assert_eq!(days_in_range(b, a).len(), 3);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(parse_date("2025-03-07").unwrap(), expected);
        assert_eq!(parse_date(" 2025/03/07 ").unwrap(), expected);
        assert_eq!(parse_date("2025.03.07").unwrap(), expected);
        assert_eq!(parse_date("2025-03-07 00:00:00").unwrap(), expected);
        assert!(parse_date("07/03/2025").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234"), Some(1234.0));
        assert_eq!(parse_amount(" 12.5 "), Some(12.5));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn test_round_non_negative() {
        assert_eq!(round_non_negative(10.4), 10.0);
        assert_eq!(round_non_negative(10.5), 11.0);
        assert_eq!(round_non_negative(-3.2), 0.0);
        assert_eq!(round_non_negative(-0.2), 0.0);
        assert_eq!(round_non_negative(f64::NAN), 0.0);
    }
}
