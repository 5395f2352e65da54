use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};

use crate::analytics;
use crate::models::PeriodRecord;

/// How many future cycles the calendar forecast covers by default.
pub const DEFAULT_HORIZON_CYCLES: u32 = 24;

/// Assumed period length before any period has been completed.
pub const DEFAULT_PERIOD_DAYS: i64 = 5;

/// Predict the start of the next period from the average cycle length.
/// Requires at least one plausible start-to-start gap.
pub fn predicted_next_start(records: &[PeriodRecord]) -> Option<NaiveDate> {
    let cycle = rounded_cycle_length(records)?;
    let last = latest(records)?;
    shift(last.start_date, cycle)
}

/// Calendar days expected to fall inside a period that has not been logged
/// yet: the rest of an ongoing period, then `horizon_cycles` future periods
/// spaced by the average cycle length.
///
/// Needs at least two records. Days already covered by a logged period are
/// never reported.
pub fn forecast(
    records: &[PeriodRecord],
    today: NaiveDate,
    horizon_cycles: u32,
) -> BTreeSet<NaiveDate> {
    let mut days = BTreeSet::new();
    if records.len() < 2 {
        return days;
    }
    let Some(last) = latest(records) else {
        return days;
    };

    let duration = analytics::average_period_length(records)
        .map(|avg| avg.round() as i64)
        .unwrap_or(DEFAULT_PERIOD_DAYS);

    if last.is_active() {
        let elapsed = last.days_since_start(today).max(0);
        days.extend(((elapsed + 1)..duration).filter_map(|offset| shift(last.start_date, offset)));
    }

    if let Some(cycle) = rounded_cycle_length(records) {
        for i in 1..=i64::from(horizon_cycles) {
            let Some(predicted) = shift(last.start_date, i * cycle) else {
                break;
            };
            if predicted < today {
                continue;
            }
            days.extend((0..duration).filter_map(|offset| shift(predicted, offset)));
        }
    }

    days.retain(|day| !is_actual_period_day(records, *day, today));
    days
}

/// Whether `day` lies inside any logged period, counting an active period
/// through `today`.
pub fn is_actual_period_day(records: &[PeriodRecord], day: NaiveDate, today: NaiveDate) -> bool {
    records.iter().any(|r| r.covers(day, today))
}

fn rounded_cycle_length(records: &[PeriodRecord]) -> Option<i64> {
    analytics::average_cycle_length(records)
        .map(|avg| avg.round() as i64)
        .filter(|cycle| *cycle > 0)
}

fn latest(records: &[PeriodRecord]) -> Option<&PeriodRecord> {
    records.iter().max_by_key(|r| r.start_date)
}

fn shift(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::try_days(days)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn make_period(id: i64, start: &str, end: Option<&str>) -> PeriodRecord {
        PeriodRecord::new(id, date(start), end.map(date))
    }

    #[test]
    fn no_forecast_with_one_record() {
        let records = vec![make_period(1, "2024-03-01", None)];
        assert!(forecast(&records, date("2024-03-03"), 24).is_empty());
        assert!(forecast(&[], date("2024-03-03"), 24).is_empty());
    }

    #[test]
    fn predicts_next_start() {
        let records = vec![
            make_period(1, "2026-01-01", Some("2026-01-05")),
            make_period(2, "2026-01-29", Some("2026-02-02")),
        ];
        assert_eq!(predicted_next_start(&records), Some(date("2026-02-26")));
        assert_eq!(predicted_next_start(&records[..1]), None);
    }

    #[test]
    fn completes_an_active_period() {
        let records = vec![
            make_period(1, "2024-02-02", Some("2024-02-06")),
            make_period(2, "2024-03-01", None),
        ];
        let days = forecast(&records, date("2024-03-03"), 24);

        assert!(days.contains(&date("2024-03-04")));
        assert!(days.contains(&date("2024-03-05")));
        for logged in ["2024-03-01", "2024-03-02", "2024-03-03"] {
            assert!(!days.contains(&date(logged)));
        }
        assert!(!days.contains(&date("2024-03-06")));
    }

    #[test]
    fn projected_cycle_skips_logged_days() {
        let records = vec![
            make_period(1, "2024-02-02", Some("2024-02-06")),
            make_period(2, "2024-03-01", None),
        ];
        // the next cycle starts 2024-03-29, which the open period already covers
        let days = forecast(&records, date("2024-03-29"), 1);
        let expected: BTreeSet<NaiveDate> =
            ["2024-03-30", "2024-03-31", "2024-04-01", "2024-04-02"]
                .into_iter()
                .map(date)
                .collect();
        assert_eq!(days, expected);
    }

    #[test]
    fn overrunning_period_adds_no_remainder() {
        let records = vec![
            make_period(1, "2024-02-02", Some("2024-02-06")),
            make_period(2, "2024-03-01", None),
        ];
        let days = forecast(&records, date("2024-03-08"), 1);
        // only the next cycle: 2024-03-29 .. 2024-04-02
        let expected: Vec<NaiveDate> = (29..=31)
            .map(|d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap())
            .chain((1..=2).map(|d| NaiveDate::from_ymd_opt(2024, 4, d).unwrap()))
            .collect();
        assert_eq!(days.into_iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn projects_future_cycles() {
        let records = vec![
            make_period(1, "2024-01-01", Some("2024-01-04")),
            make_period(2, "2024-01-29", Some("2024-02-01")),
        ];
        let days = forecast(&records, date("2024-02-10"), 3);
        // three cycles of four days each
        assert_eq!(days.len(), 12);
        assert_eq!(days.first(), Some(&date("2024-02-26")));
        assert_eq!(days.last(), Some(&date("2024-04-25")));
    }

    #[test]
    fn skips_cycles_already_past() {
        let records = vec![
            make_period(1, "2024-01-01", Some("2024-01-04")),
            make_period(2, "2024-01-29", Some("2024-02-01")),
        ];
        let days = forecast(&records, date("2024-03-01"), 2);
        // 2024-02-26 is before today, only 2024-03-25 remains
        assert_eq!(days.first(), Some(&date("2024-03-25")));
        assert_eq!(days.len(), 4);
    }

    #[test]
    fn defaults_duration_without_completed_periods() {
        let records = vec![
            make_period(1, "2024-01-01", None),
            make_period(2, "2024-01-29", None),
        ];
        let days = forecast(&records, date("2024-01-29"), 1);
        // remainder of the ongoing period: days 2-5
        assert!(days.contains(&date("2024-01-30")));
        assert!(days.contains(&date("2024-02-02")));
        assert!(!days.contains(&date("2024-02-03")));
        // next cycle, five days long
        assert!(days.contains(&date("2024-02-26")));
        assert!(days.contains(&date("2024-03-01")));
        assert!(!days.contains(&date("2024-03-02")));
    }

    #[test]
    fn implausible_history_only_completes_current() {
        let records = vec![
            make_period(1, "2023-01-01", Some("2023-01-05")),
            make_period(2, "2024-03-01", None),
        ];
        let days = forecast(&records, date("2024-03-02"), 24);
        let expected = vec![date("2024-03-03"), date("2024-03-04"), date("2024-03-05")];
        assert_eq!(days.into_iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn forecast_is_repeatable() {
        let records = vec![
            make_period(2, "2024-01-29", Some("2024-02-02")),
            make_period(1, "2024-01-01", Some("2024-01-05")),
            make_period(3, "2024-02-26", None),
        ];
        let today = date("2024-02-27");
        assert_eq!(forecast(&records, today, 24), forecast(&records, today, 24));
    }
}
