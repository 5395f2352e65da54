use std::collections::BTreeSet;
use std::fmt;

use chrono::{Month, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::dates;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodRecord {
    pub id: i64,
    #[serde(with = "dates::lenient")]
    pub start_date: NaiveDate,
    #[serde(default, with = "dates::lenient_opt")]
    pub end_date: Option<NaiveDate>,
}

impl PeriodRecord {
    pub fn new(id: i64, start_date: NaiveDate, end_date: Option<NaiveDate>) -> Self {
        Self {
            id,
            start_date,
            end_date,
        }
    }

    /// An open-ended record: the period is still ongoing.
    pub fn is_active(&self) -> bool {
        self.end_date.is_none()
    }

    /// Inclusive length in days. `None` while active, or when the end
    /// precedes the start.
    pub fn duration_days(&self) -> Option<i64> {
        let end = self.end_date?;
        let days = (end - self.start_date).num_days();
        (days >= 0).then_some(days + 1)
    }

    pub fn days_since_start(&self, today: NaiveDate) -> i64 {
        (today - self.start_date).num_days()
    }

    /// Last day counted as bleeding: the end date, or today for an active
    /// record.
    pub fn last_day(&self, today: NaiveDate) -> NaiveDate {
        self.end_date.unwrap_or(today)
    }

    /// Whether `day` falls inside `[start, end-or-today]`.
    pub fn covers(&self, day: NaiveDate, today: NaiveDate) -> bool {
        day >= self.start_date && day <= self.last_day(today)
    }
}

/// Summary shown on the home screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStatistics {
    pub average_cycle_length: Option<f64>,
    pub average_period_length: Option<f64>,
    pub current_period: Option<PeriodRecord>,
    pub predicted_next_start: Option<NaiveDate>,
}

/// One start-to-start gap, dated at the later start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleLengthPoint {
    pub date: NaiveDate,
    pub length: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DurationPoint {
    pub date: NaiveDate,
    pub duration: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthlyDays {
    /// 1-12
    pub month: u32,
    pub days: u32,
}

impl MonthlyDays {
    /// Three-letter month label, e.g. "Jan".
    pub fn month_name(&self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map(|m| &m.name()[..3])
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeekdayCount {
    pub weekday: Weekday,
    pub count: u32,
    pub is_max: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RegularityLabel {
    VeryRegular,
    Regular,
    ModerateVariation,
    SomewhatIrregular,
    Irregular,
    NotEnoughData,
}

impl fmt::Display for RegularityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::VeryRegular => "Very regular",
            Self::Regular => "Regular",
            Self::ModerateVariation => "Moderate variation",
            Self::SomewhatIrregular => "Somewhat irregular",
            Self::Irregular => "Irregular",
            Self::NotEnoughData => "Not enough data",
        };
        f.write_str(label)
    }
}

/// Everything the statistics screens chart, computed in one pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivedMetrics {
    /// `None` means all years.
    pub year: Option<i32>,
    pub available_years: Vec<i32>,
    pub cycle_lengths: Vec<CycleLengthPoint>,
    pub average_cycle_length: Option<f64>,
    pub durations: Vec<DurationPoint>,
    pub average_period_length: Option<f64>,
    pub duration_std_dev: Option<f64>,
    pub monthly_days: Vec<MonthlyDays>,
    pub weekday_starts: Vec<WeekdayCount>,
    pub regularity_score: Option<f64>,
    pub regularity_label: RegularityLabel,
    pub forecast: BTreeSet<NaiveDate>,
}

/// Where "today" sits relative to the current or next period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PeriodStatus {
    Active { day: i64 },
    Upcoming { in_days: i64 },
    DueToday,
    Late { days: i64 },
    NotEnoughData,
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn plural(n: i64) -> &'static str {
            if n == 1 {
                ""
            } else {
                "s"
            }
        }

        match *self {
            Self::Active { day } => write!(f, "Day {day}"),
            Self::Upcoming { in_days } => {
                write!(f, "Next expected in {in_days} day{}", plural(in_days))
            }
            Self::DueToday => f.write_str("Expected today"),
            Self::Late { days } => write!(f, "{days} day{} late", plural(days)),
            Self::NotEnoughData => f.write_str("Not enough data for prediction"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppData {
    pub periods: Vec<PeriodRecord>,
    #[serde(default)]
    pub settings: AppSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    pub auto_lock_minutes: u32,
    #[serde(default = "default_horizon")]
    pub forecast_horizon_cycles: u32,
    #[serde(default)]
    pub remember_passphrase: bool,
}

fn default_horizon() -> u32 {
    crate::prediction::DEFAULT_HORIZON_CYCLES
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_lock_minutes: 5,
            forecast_horizon_cycles: default_horizon(),
            remember_passphrase: false,
        }
    }
}
