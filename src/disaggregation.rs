//! Spreading a monthly figure back to daily resolution.
//!
//! Each day receives `monthly_value / n` rounded to the nearest whole unit,
//! where `n` is the number of days that receive an entry. Because every day is
//! rounded the same way, the daily values sum to `monthly_value` within
//! `n / 2` units.

use crate::schema::SpreadPolicy;
use crate::utils::{days_of_month, is_weekday};
use chrono::NaiveDate;

pub fn spread(
    month_start: NaiveDate,
    monthly_value: f64,
    policy: SpreadPolicy,
) -> Vec<(NaiveDate, f64)> {
    let days: Vec<NaiveDate> = match policy {
        SpreadPolicy::Even => days_of_month(month_start),
        SpreadPolicy::WeekdaysOnly => days_of_month(month_start)
            .into_iter()
            .filter(|d| is_weekday(*d))
            .collect(),
    };

    if days.is_empty() {
        return Vec::new();
    }

    let per_day = (monthly_value / days.len() as f64).round();
    days.into_iter().map(|d| (d, per_day)).collect()
}
