use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::analytics;
use crate::calendar::{self, MonthView};
use crate::credentials::{CredentialError, CredentialStore, PASSPHRASE_KEY};
use crate::crypto::CryptoError;
use crate::models::*;
use crate::prediction;
use crate::records::{self, ImportSummary, RecordError};
use crate::storage::{StorageError, Vault};

type Clock = Box<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("app is locked")]
    Locked,
    #[error("vault already exists")]
    AlreadySetUp,
    #[error("vault has not been set up")]
    NotSetUp,
    #[error("passphrase must not be empty")]
    EmptyPassphrase,
    #[error("no remembered passphrase")]
    NoRememberedPassphrase,
    #[error("no such month: {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("invalid import data: {0}")]
    Import(#[from] serde_json::Error),
    #[error("export failed: {0}")]
    Export(serde_json::Error),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("app state poisoned")]
    Poisoned,
}

/// Everything the home and statistics screens show, recomputed from the
/// record set whenever it changes.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Dashboard {
    pub today: NaiveDate,
    pub stats: CycleStatistics,
    pub status: PeriodStatus,
    pub metrics: DerivedMetrics,
}

impl Dashboard {
    pub fn compute(data: &AppData, today: NaiveDate) -> Self {
        let stats = analytics::cycle_statistics(&data.periods);
        Self {
            today,
            status: analytics::period_status(&stats, today),
            metrics: DerivedMetrics::compute(
                &data.periods,
                today,
                None,
                data.settings.forecast_horizon_cycles,
            ),
            stats,
        }
    }
}

/// Partial settings change; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub auto_lock_minutes: Option<u32>,
    pub forecast_horizon_cycles: Option<u32>,
    pub remember_passphrase: Option<bool>,
}

/// What `import_data` accepts: a bare record list or a full export.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportPayload {
    Records(Vec<PeriodRecord>),
    Archive(AppData),
}

/// Decrypted vault contents, held only while unlocked.
struct Session {
    passphrase: Zeroizing<String>,
    data: AppData,
    last_activity: Instant,
}

/// App state holding the decrypted data and passphrase while unlocked, and
/// publishing a fresh [`Dashboard`] after every change.
pub struct AppState {
    vault: Vault,
    credentials: Box<dyn CredentialStore>,
    clock: Clock,
    session: Mutex<Option<Session>>,
    dashboard: watch::Sender<Option<Dashboard>>,
}

impl AppState {
    pub fn new(vault: Vault, credentials: Box<dyn CredentialStore>) -> Self {
        let (dashboard, _) = watch::channel(None);
        Self {
            vault,
            credentials,
            clock: Box::new(|| chrono::Local::now().date_naive()),
            session: Mutex::new(None),
            dashboard,
        }
    }

    /// Replace the wall clock, e.g. with a fixed date.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Receives `Some(dashboard)` after unlock and every mutation, `None`
    /// after lock.
    pub fn subscribe(&self) -> watch::Receiver<Option<Dashboard>> {
        self.dashboard.subscribe()
    }

    pub fn dashboard(&self) -> Option<Dashboard> {
        self.dashboard.borrow().clone()
    }

    pub fn is_setup(&self) -> bool {
        self.vault.exists()
    }

    pub fn is_unlocked(&self) -> Result<bool, AppError> {
        Ok(self.session()?.is_some())
    }

    pub fn setup(&self, passphrase: &str, remember: bool) -> Result<(), AppError> {
        if passphrase.is_empty() {
            return Err(AppError::EmptyPassphrase);
        }
        if self.vault.exists() {
            return Err(AppError::AlreadySetUp);
        }

        let mut data = AppData::default();
        if remember {
            match self.credentials.save(PASSPHRASE_KEY, passphrase) {
                Ok(()) => data.settings.remember_passphrase = true,
                Err(e) => warn!(error = %e, "could not remember passphrase"),
            }
        }
        self.vault.save(passphrase, &data)?;

        info!(path = %self.vault.path().display(), "vault created");
        self.install(passphrase, data)
    }

    /// `Ok(false)` on a wrong passphrase.
    pub fn unlock(&self, passphrase: &str) -> Result<bool, AppError> {
        if !self.vault.exists() {
            return Err(AppError::NotSetUp);
        }
        let data = match self.vault.load(passphrase) {
            Ok(data) => data,
            Err(StorageError::Crypto(CryptoError::Decryption)) => {
                warn!("unlock failed: wrong passphrase");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if data.settings.remember_passphrase {
            if let Err(e) = self.credentials.save(PASSPHRASE_KEY, passphrase) {
                warn!(error = %e, "could not remember passphrase");
            }
        }

        info!(records = data.periods.len(), "vault unlocked");
        self.install(passphrase, data)?;
        Ok(true)
    }

    /// Unlock with the passphrase from the credential store. A stale entry
    /// is removed and `Ok(false)` returned, so the caller can ask again.
    pub fn unlock_remembered(&self) -> Result<bool, AppError> {
        let passphrase = self
            .credentials
            .load(PASSPHRASE_KEY)?
            .ok_or(AppError::NoRememberedPassphrase)?;

        let unlocked = self.unlock(&passphrase)?;
        if !unlocked {
            warn!("remembered passphrase rejected, forgetting it");
            self.credentials.delete(PASSPHRASE_KEY)?;
        }
        Ok(unlocked)
    }

    /// Lock the app: drop the passphrase and data from memory.
    pub fn lock(&self) -> Result<(), AppError> {
        let had_session = self.session()?.take().is_some();
        self.dashboard.send_replace(None);
        if had_session {
            info!("vault locked");
        }
        Ok(())
    }

    /// Lock when the session has been idle longer than the configured
    /// auto-lock delay. Returns whether it locked.
    pub fn lock_if_idle(&self, now: Instant) -> Result<bool, AppError> {
        let idle = {
            let guard = self.session()?;
            match guard.as_ref() {
                Some(session) => {
                    let minutes = u64::from(session.data.settings.auto_lock_minutes);
                    let limit = Duration::from_secs(minutes * 60);
                    now.saturating_duration_since(session.last_activity) >= limit
                }
                None => false,
            }
        };
        if idle {
            self.lock()?;
        }
        Ok(idle)
    }

    /// Remove any remembered passphrase and stop remembering it.
    pub fn forget_credentials(&self) -> Result<(), AppError> {
        self.credentials.delete(PASSPHRASE_KEY)?;
        if self.is_unlocked()? {
            self.mutate(|data| {
                data.settings.remember_passphrase = false;
                Ok(())
            })?;
        }
        info!("remembered passphrase removed");
        Ok(())
    }

    pub fn start_period(&self, date: NaiveDate) -> Result<PeriodRecord, AppError> {
        let record = self.mutate(|data| Ok(records::start_period(&mut data.periods, date)?))?;
        info!(id = record.id, "period started");
        Ok(record)
    }

    pub fn end_period(&self, id: i64, date: NaiveDate) -> Result<PeriodRecord, AppError> {
        let record = self.mutate(|data| Ok(records::end_period(&mut data.periods, id, date)?))?;
        info!(id, "period ended");
        Ok(record)
    }

    /// End the current period today, or start one today if none is open.
    pub fn toggle_period(&self) -> Result<PeriodRecord, AppError> {
        let today = self.today();
        let current = self.with_data(|data| analytics::current_period(&data.periods))?;
        match current {
            Some(current) => self.end_period(current.id, today),
            None => self.start_period(today),
        }
    }

    pub fn update_period(
        &self,
        id: i64,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Result<PeriodRecord, AppError> {
        let record = self.mutate(|data| {
            Ok(records::update_period(
                &mut data.periods,
                id,
                start_date,
                end_date,
            )?)
        })?;
        info!(id, "period updated");
        Ok(record)
    }

    pub fn delete_period(&self, id: i64) -> Result<PeriodRecord, AppError> {
        let record = self.mutate(|data| Ok(records::delete_period(&mut data.periods, id)?))?;
        info!(id, "period deleted");
        Ok(record)
    }

    pub fn list_periods(&self) -> Result<Vec<PeriodRecord>, AppError> {
        self.with_data(|data| records::list_periods(&data.periods))
    }

    pub fn get_stats(&self) -> Result<CycleStatistics, AppError> {
        self.with_data(|data| analytics::cycle_statistics(&data.periods))
    }

    pub fn get_status(&self) -> Result<PeriodStatus, AppError> {
        let today = self.today();
        self.with_data(|data| {
            analytics::period_status(&analytics::cycle_statistics(&data.periods), today)
        })
    }

    /// Statistics-screen metrics, optionally scoped to one year.
    pub fn get_metrics(&self, year: Option<i32>) -> Result<DerivedMetrics, AppError> {
        let today = self.today();
        self.with_data(|data| {
            DerivedMetrics::compute(
                &data.periods,
                today,
                year,
                data.settings.forecast_horizon_cycles,
            )
        })
    }

    pub fn get_month(&self, year: i32, month: u32) -> Result<MonthView, AppError> {
        let today = self.today();
        self.with_data(|data| {
            let forecast = prediction::forecast(
                &data.periods,
                today,
                data.settings.forecast_horizon_cycles,
            );
            calendar::month_view(&data.periods, &forecast, year, month, today)
        })?
        .ok_or(AppError::InvalidMonth { year, month })
    }

    pub fn get_settings(&self) -> Result<AppSettings, AppError> {
        self.with_data(|data| data.settings.clone())
    }

    /// Apply a settings change. The keychain follows `remember_passphrase`
    /// only once the vault has been saved; if the keychain then fails, the
    /// previous value is restored.
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<AppSettings, AppError> {
        let previous = self.get_settings()?.remember_passphrase;
        let settings = self.mutate(|data| {
            let settings = &mut data.settings;
            if let Some(minutes) = update.auto_lock_minutes {
                settings.auto_lock_minutes = minutes.clamp(1, 60);
            }
            if let Some(horizon) = update.forecast_horizon_cycles {
                settings.forecast_horizon_cycles = horizon.clamp(1, 48);
            }
            if let Some(remember) = update.remember_passphrase {
                settings.remember_passphrase = remember;
            }
            Ok(settings.clone())
        })?;

        if let Some(remember) = update.remember_passphrase {
            if let Err(e) = self.sync_remembered(remember) {
                warn!(error = %e, "keychain update failed, restoring setting");
                self.mutate(|data| {
                    data.settings.remember_passphrase = previous;
                    Ok(())
                })?;
                return Err(e);
            }
        }
        Ok(settings)
    }

    fn sync_remembered(&self, remember: bool) -> Result<(), AppError> {
        if remember {
            let passphrase = self
                .session()?
                .as_ref()
                .map(|s| s.passphrase.clone())
                .ok_or(AppError::Locked)?;
            self.credentials.save(PASSPHRASE_KEY, &passphrase)?;
        } else {
            self.credentials.delete(PASSPHRASE_KEY)?;
        }
        Ok(())
    }

    pub fn export_data(&self) -> Result<String, AppError> {
        let json = self.with_data(|data| {
            let mut export = data.clone();
            export.periods = records::list_periods(&data.periods);
            serde_json::to_string_pretty(&export)
        })?
        .map_err(AppError::Export)?;
        Ok(json)
    }

    /// Merge records from JSON (a record list or a full export). Ids in the
    /// input are ignored.
    pub fn import_data(&self, json: &str) -> Result<ImportSummary, AppError> {
        let incoming = match serde_json::from_str::<ImportPayload>(json) {
            Ok(ImportPayload::Records(records)) => records,
            Ok(ImportPayload::Archive(data)) => data.periods,
            // report the record-list error, which names the failing field
            Err(_) => serde_json::from_str::<Vec<PeriodRecord>>(json)?,
        };

        let summary =
            self.mutate(|data| Ok(records::import_periods(&mut data.periods, &incoming)?))?;
        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            "periods imported"
        );
        Ok(summary)
    }

    pub fn wipe_all_data(&self) -> Result<(), AppError> {
        self.lock()?;
        self.vault.wipe()?;
        self.credentials.delete(PASSPHRASE_KEY)?;
        info!("all data wiped");
        Ok(())
    }

    fn session(&self) -> Result<MutexGuard<'_, Option<Session>>, AppError> {
        self.session.lock().map_err(|_| AppError::Poisoned)
    }

    fn install(&self, passphrase: &str, data: AppData) -> Result<(), AppError> {
        let dashboard = Dashboard::compute(&data, self.today());
        *self.session()? = Some(Session {
            passphrase: Zeroizing::new(passphrase.to_owned()),
            data,
            last_activity: Instant::now(),
        });
        self.dashboard.send_replace(Some(dashboard));
        Ok(())
    }

    fn with_data<T>(&self, f: impl FnOnce(&AppData) -> T) -> Result<T, AppError> {
        let mut guard = self.session()?;
        let session = guard.as_mut().ok_or(AppError::Locked)?;
        session.last_activity = Instant::now();
        Ok(f(&session.data))
    }

    /// Apply a change to a copy of the data, persist it, then swap it in and
    /// publish a recomputed dashboard. A failed change or save leaves the
    /// session untouched.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut AppData) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let today = self.today();
        let mut guard = self.session()?;
        let session = guard.as_mut().ok_or(AppError::Locked)?;

        let mut data = session.data.clone();
        let out = f(&mut data)?;
        self.vault.save(&session.passphrase, &data)?;

        let dashboard = Dashboard::compute(&data, today);
        session.data = data;
        session.last_activity = Instant::now();
        drop(guard);

        debug!(status = %dashboard.status, "dashboard recomputed");
        self.dashboard.send_replace(Some(dashboard));
        Ok(out)
    }
}
