//! Pure metric computation over period records.
//!
//! Nothing here reads a clock or keeps state: "today" is always a parameter,
//! and insufficient data comes back as `None` or an empty series.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::models::{
    CycleLengthPoint, CycleStatistics, DerivedMetrics, DurationPoint, MonthlyDays, PeriodRecord,
    PeriodStatus, RegularityLabel, WeekdayCount,
};
use crate::prediction;

/// Start-to-start gaps at or above this are treated as missed logging.
pub const MAX_PLAUSIBLE_CYCLE_DAYS: i64 = 90;

/// Coefficient of variation that maps to a regularity score of 0.
const CV_CEILING: f64 = 0.3;

/// Gaps between consecutive starts, oldest first.
pub fn compute_cycle_lengths(records: &[PeriodRecord]) -> Vec<CycleLengthPoint> {
    let mut starts: Vec<NaiveDate> = records.iter().map(|r| r.start_date).collect();
    starts.sort();

    starts
        .windows(2)
        .filter_map(|w| {
            let length = (w[1] - w[0]).num_days();
            (length > 0 && length < MAX_PLAUSIBLE_CYCLE_DAYS).then_some(CycleLengthPoint {
                date: w[1],
                length,
            })
        })
        .collect()
}

pub fn average_cycle_length(records: &[PeriodRecord]) -> Option<f64> {
    let lengths: Vec<f64> = compute_cycle_lengths(records)
        .iter()
        .map(|p| p.length as f64)
        .collect();
    mean(&lengths)
}

/// Durations of completed periods, oldest first.
pub fn period_durations(records: &[PeriodRecord]) -> Vec<DurationPoint> {
    let mut completed: Vec<&PeriodRecord> = records.iter().filter(|r| !r.is_active()).collect();
    completed.sort_by_key(|r| r.start_date);

    completed
        .into_iter()
        .filter_map(|r| {
            r.duration_days().map(|duration| DurationPoint {
                date: r.start_date,
                duration,
            })
        })
        .collect()
}

pub fn average_period_length(records: &[PeriodRecord]) -> Option<f64> {
    mean(&duration_values(records))
}

pub fn duration_std_dev(records: &[PeriodRecord]) -> Option<f64> {
    population_std_dev(&duration_values(records))
}

fn duration_values(records: &[PeriodRecord]) -> Vec<f64> {
    period_durations(records)
        .iter()
        .map(|p| p.duration as f64)
        .collect()
}

/// 100 for perfectly even cycles, falling linearly to 0 at a coefficient of
/// variation of 0.3. Needs at least two cycle lengths.
pub fn regularity_score(records: &[PeriodRecord]) -> Option<f64> {
    let lengths: Vec<f64> = compute_cycle_lengths(records)
        .iter()
        .map(|p| p.length as f64)
        .collect();
    if lengths.len() < 2 {
        return None;
    }

    let mu = mean(&lengths)?;
    if mu <= 0.0 {
        return None;
    }
    let cv = population_std_dev(&lengths)? / mu;

    Some(((1.0 - cv / CV_CEILING) * 100.0).clamp(0.0, 100.0))
}

pub fn regularity_label(score: Option<f64>) -> RegularityLabel {
    match score {
        None => RegularityLabel::NotEnoughData,
        Some(s) if s >= 80.0 => RegularityLabel::VeryRegular,
        Some(s) if s >= 60.0 => RegularityLabel::Regular,
        Some(s) if s >= 40.0 => RegularityLabel::ModerateVariation,
        Some(s) if s >= 20.0 => RegularityLabel::SomewhatIrregular,
        Some(_) => RegularityLabel::Irregular,
    }
}

/// Distinct start years, newest first.
pub fn available_years(records: &[PeriodRecord]) -> Vec<i32> {
    let years: BTreeSet<i32> = records.iter().map(|r| r.start_date.year()).collect();
    years.into_iter().rev().collect()
}

/// Records starting in `year`; everything when no year is given.
pub fn filter_by_year(records: &[PeriodRecord], year: Option<i32>) -> Vec<PeriodRecord> {
    match year {
        Some(year) => records
            .iter()
            .filter(|r| r.start_date.year() == year)
            .cloned()
            .collect(),
        None => records.to_vec(),
    }
}

/// Period days per calendar month.
///
/// With a year filter, the totals for that year. Without one, the average
/// per year: each month's total divided by the number of distinct start
/// years, rounded. Active records count through `today`.
///
/// Records are walked one month segment at a time, so the work per record is
/// bounded by the number of months it spans rather than its length in days.
pub fn monthly_day_counts(
    records: &[PeriodRecord],
    today: NaiveDate,
    year: Option<i32>,
) -> Vec<MonthlyDays> {
    let mut counts = [0u32; 12];

    for record in records {
        let first = record.start_date;
        let last = record.last_day(today);
        if last < first {
            continue;
        }
        if let Some(year) = year {
            if first.year() > year || last.year() < year {
                continue;
            }
        }

        let mut cursor = first;
        loop {
            let segment_end = end_of_month(cursor).min(last);
            if year.map_or(true, |y| cursor.year() == y) {
                let days = (segment_end - cursor).num_days() + 1;
                counts[cursor.month0() as usize] += u32::try_from(days).unwrap_or(0);
            }
            match segment_end.succ_opt() {
                Some(next) if next <= last => cursor = next,
                _ => break,
            }
        }
    }

    let divisor = match year {
        Some(_) => 1,
        None => available_years(records).len().max(1),
    };

    (1..=12u32)
        .zip(counts)
        .map(|(month, total)| MonthlyDays {
            month,
            days: (f64::from(total) / divisor as f64).round() as u32,
        })
        .collect()
}

fn end_of_month(date: NaiveDate) -> NaiveDate {
    let next_month = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    next_month
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// Period starts per weekday, Monday through Sunday. Every weekday that hits
/// the highest non-zero count is flagged.
pub fn weekday_start_counts(records: &[PeriodRecord], year: Option<i32>) -> Vec<WeekdayCount> {
    let mut counts = [0u32; 7];
    for record in filter_by_year(records, year) {
        counts[record.start_date.weekday().num_days_from_monday() as usize] += 1;
    }
    let max = counts.iter().copied().max().unwrap_or(0);

    let mut weekday = Weekday::Mon;
    counts
        .iter()
        .map(|&count| {
            let entry = WeekdayCount {
                weekday,
                count,
                is_max: max > 0 && count == max,
            };
            weekday = weekday.succ();
            entry
        })
        .collect()
}

/// The chronologically last open-ended record.
pub fn current_period(records: &[PeriodRecord]) -> Option<PeriodRecord> {
    records
        .iter()
        .filter(|r| r.is_active())
        .max_by_key(|r| r.start_date)
        .cloned()
}

/// Home-screen summary. Averages are reported to one decimal place.
pub fn cycle_statistics(records: &[PeriodRecord]) -> CycleStatistics {
    CycleStatistics {
        average_cycle_length: average_cycle_length(records).map(round_tenth),
        average_period_length: average_period_length(records).map(round_tenth),
        current_period: current_period(records),
        predicted_next_start: prediction::predicted_next_start(records),
    }
}

pub fn period_status(stats: &CycleStatistics, today: NaiveDate) -> PeriodStatus {
    if let Some(current) = &stats.current_period {
        return PeriodStatus::Active {
            day: (current.days_since_start(today) + 1).max(1),
        };
    }
    match stats.predicted_next_start {
        Some(predicted) => {
            let days = (predicted - today).num_days();
            match days {
                d if d > 0 => PeriodStatus::Upcoming { in_days: d },
                0 => PeriodStatus::DueToday,
                d => PeriodStatus::Late { days: -d },
            }
        }
        None => PeriodStatus::NotEnoughData,
    }
}

impl DerivedMetrics {
    /// Series and aggregates use the records of `year` (all records when
    /// `None`); the forecast always uses the full history.
    pub fn compute(
        records: &[PeriodRecord],
        today: NaiveDate,
        year: Option<i32>,
        horizon_cycles: u32,
    ) -> Self {
        let scoped = filter_by_year(records, year);
        let regularity_score = regularity_score(&scoped);

        Self {
            year,
            available_years: available_years(records),
            cycle_lengths: compute_cycle_lengths(&scoped),
            average_cycle_length: average_cycle_length(&scoped),
            durations: period_durations(&scoped),
            average_period_length: average_period_length(&scoped),
            duration_std_dev: duration_std_dev(&scoped),
            monthly_days: monthly_day_counts(records, today, year),
            weekday_starts: weekday_start_counts(records, year),
            regularity_score,
            regularity_label: regularity_label(regularity_score),
            forecast: prediction::forecast(records, today, horizon_cycles),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn population_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
