//! Period log with cycle statistics and forecasts.
//!
//! [`analytics`] and [`prediction`] are the pure engine: they take a slice of
//! [`models::PeriodRecord`] plus "today" and return derived metrics and
//! forecast days. [`commands::AppState`] owns the unlocked record set, keeps
//! it in an encrypted [`storage::Vault`], and republishes a
//! [`commands::Dashboard`] whenever the records change.

pub mod analytics;
pub mod calendar;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod dates;
pub mod models;
pub mod prediction;
pub mod records;
pub mod storage;
