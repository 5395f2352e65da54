//! Rules for changing the period record set: id assignment, at most one
//! open period, no two periods starting on the same day, ends never before
//! starts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::PeriodRecord;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("an open period already exists; end it before starting a new one")]
    OpenPeriodExists,
    #[error("a period starting on {0} already exists")]
    DuplicateStart(NaiveDate),
    #[error("period {0} not found")]
    NotFound(i64),
    #[error("period {0} is already ended")]
    AlreadyEnded(i64),
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Newest first.
pub fn list_periods(periods: &[PeriodRecord]) -> Vec<PeriodRecord> {
    let mut sorted = periods.to_vec();
    sorted.sort_by(|a, b| b.start_date.cmp(&a.start_date));
    sorted
}

pub fn start_period(
    periods: &mut Vec<PeriodRecord>,
    start_date: NaiveDate,
) -> Result<PeriodRecord, RecordError> {
    if periods.iter().any(PeriodRecord::is_active) {
        return Err(RecordError::OpenPeriodExists);
    }
    ensure_start_free(periods, start_date, None)?;

    let record = PeriodRecord::new(next_id(periods), start_date, None);
    periods.push(record.clone());
    Ok(record)
}

pub fn end_period(
    periods: &mut [PeriodRecord],
    id: i64,
    end_date: NaiveDate,
) -> Result<PeriodRecord, RecordError> {
    let record = find_mut(periods, id)?;
    if record.end_date.is_some() {
        return Err(RecordError::AlreadyEnded(id));
    }
    check_order(record.start_date, Some(end_date))?;

    record.end_date = Some(end_date);
    Ok(record.clone())
}

/// Replace both dates of a record. Re-opening a record is allowed only
/// while no other record is open.
pub fn update_period(
    periods: &mut [PeriodRecord],
    id: i64,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
) -> Result<PeriodRecord, RecordError> {
    check_order(start_date, end_date)?;
    if !periods.iter().any(|p| p.id == id) {
        return Err(RecordError::NotFound(id));
    }
    ensure_start_free(periods, start_date, Some(id))?;
    if end_date.is_none() && periods.iter().any(|p| p.id != id && p.is_active()) {
        return Err(RecordError::OpenPeriodExists);
    }

    let record = find_mut(periods, id)?;
    record.start_date = start_date;
    record.end_date = end_date;
    Ok(record.clone())
}

pub fn delete_period(
    periods: &mut Vec<PeriodRecord>,
    id: i64,
) -> Result<PeriodRecord, RecordError> {
    let index = periods
        .iter()
        .position(|p| p.id == id)
        .ok_or(RecordError::NotFound(id))?;
    Ok(periods.remove(index))
}

/// Merge a batch of records, oldest first. Rows whose start date is already
/// logged are skipped; the rest get fresh ids. Either the whole batch is
/// applied or nothing is.
pub fn import_periods(
    periods: &mut Vec<PeriodRecord>,
    incoming: &[PeriodRecord],
) -> Result<ImportSummary, RecordError> {
    let mut rows = incoming.to_vec();
    rows.sort_by_key(|r| r.start_date);

    let mut staged = periods.clone();
    let mut summary = ImportSummary {
        imported: 0,
        skipped: 0,
    };

    for row in rows {
        if staged.iter().any(|p| p.start_date == row.start_date) {
            summary.skipped += 1;
            continue;
        }
        let created = start_period(&mut staged, row.start_date)?;
        if let Some(end) = row.end_date {
            end_period(&mut staged, created.id, end)?;
        }
        summary.imported += 1;
    }

    *periods = staged;
    Ok(summary)
}

fn next_id(periods: &[PeriodRecord]) -> i64 {
    periods.iter().map(|p| p.id).max().unwrap_or(0) + 1
}

fn find_mut(periods: &mut [PeriodRecord], id: i64) -> Result<&mut PeriodRecord, RecordError> {
    periods
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or(RecordError::NotFound(id))
}

fn ensure_start_free(
    periods: &[PeriodRecord],
    start_date: NaiveDate,
    except: Option<i64>,
) -> Result<(), RecordError> {
    let taken = periods
        .iter()
        .any(|p| p.start_date == start_date && Some(p.id) != except);
    if taken {
        Err(RecordError::DuplicateStart(start_date))
    } else {
        Ok(())
    }
}

fn check_order(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), RecordError> {
    match end {
        Some(end) if end < start => Err(RecordError::EndBeforeStart { start, end }),
        _ => Ok(()),
    }
}
