use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::PeriodRecord;
use crate::prediction;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub is_period: bool,
    pub is_forecast: bool,
    pub is_today: bool,
}

/// One month of the calendar, laid out for a Sunday-first week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    /// e.g. "March 2024"
    pub title: String,
    /// Empty cells before the 1st.
    pub leading_blanks: u32,
    pub days: Vec<DayCell>,
}

/// `None` when `year`/`month` do not name a real month.
pub fn month_view(
    records: &[PeriodRecord],
    forecast: &BTreeSet<NaiveDate>,
    year: i32,
    month: u32,
    today: NaiveDate,
) -> Option<MonthView> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;

    let days = first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| {
            let is_period = prediction::is_actual_period_day(records, date, today);
            DayCell {
                date,
                is_period,
                is_forecast: !is_period && forecast.contains(&date),
                is_today: date == today,
            }
        })
        .collect();

    Some(MonthView {
        year,
        month,
        title: first.format("%B %Y").to_string(),
        leading_blanks: first.weekday().num_days_from_sunday(),
        days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn lays_out_march_2024() {
        let records = vec![PeriodRecord::new(1, date("2024-03-01"), None)];
        let forecast: BTreeSet<NaiveDate> = [date("2024-03-04"), date("2024-03-05")].into();
        let view = month_view(&records, &forecast, 2024, 3, date("2024-03-03")).unwrap();

        assert_eq!(view.title, "March 2024");
        // 2024-03-01 is a Friday
        assert_eq!(view.leading_blanks, 5);
        assert_eq!(view.days.len(), 31);

        assert!(view.days[0].is_period);
        assert!(view.days[2].is_period && view.days[2].is_today);
        assert!(!view.days[3].is_period && view.days[3].is_forecast);
        assert!(view.days[4].is_forecast);
        assert!(!view.days[5].is_forecast && !view.days[5].is_period);
    }

    #[test]
    fn leap_february() {
        let view = month_view(&[], &BTreeSet::new(), 2024, 2, date("2024-01-01")).unwrap();
        assert_eq!(view.days.len(), 29);
        // 2024-02-01 is a Thursday
        assert_eq!(view.leading_blanks, 4);
    }

    #[test]
    fn invalid_month() {
        assert!(month_view(&[], &BTreeSet::new(), 2024, 13, date("2024-01-01")).is_none());
    }
}
