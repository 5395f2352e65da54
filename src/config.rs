//! Process configuration read from `MOONTHREAD_*` environment variables.
//!
//! A `.env` file in the working directory is loaded first when present.
//! Empty variables count as unset. Per-user preferences live inside the
//! vault instead (see `AppSettings`).

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::storage::VAULT_FILE_NAME;

pub const ENV_PREFIX: &str = "MOONTHREAD";
pub const DATA_DIR_ENV: &str = "MOONTHREAD_DATA_DIR";
pub const LOG_ENV: &str = "MOONTHREAD_LOG";
pub const PASSPHRASE_ENV: &str = "MOONTHREAD_PASSPHRASE";

const APP_DIR_NAME: &str = "moonthread";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration loading failed: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("data directory not found; set MOONTHREAD_DATA_DIR")]
    NoDataDir,
}

/// The variables as they arrive, before defaults that need the filesystem.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    log: String,
    #[serde(default)]
    passphrase: Option<String>,
}

fn default_log_filter() -> String {
    "info".to_owned()
}

#[derive(Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log_filter: String,
    pub passphrase: Option<Zeroizing<String>>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load(environment())
    }

    /// Build from an explicit variable map instead of the process
    /// environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load(environment().source(Some(vars.into_iter().collect())))
    }

    fn load(source: ::config::Environment) -> Result<Self, ConfigError> {
        let raw: RawConfig = ::config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;

        let data_dir = match raw.data_dir {
            Some(dir) => dir,
            None => dirs::data_local_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join(APP_DIR_NAME),
        };

        Ok(Self {
            data_dir,
            log_filter: raw.log,
            passphrase: raw.passphrase.map(Zeroizing::new),
        })
    }

    pub fn vault_path(&self) -> PathBuf {
        self.data_dir.join(VAULT_FILE_NAME)
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX).ignore_empty(true)
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("log_filter", &self.log_filter)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_vars(vars(&[
            (DATA_DIR_ENV, "/tmp/mt"),
            (LOG_ENV, "moonthread=debug"),
            (PASSPHRASE_ENV, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/mt"));
        assert_eq!(config.vault_path(), PathBuf::from("/tmp/mt/vault.mt"));
        assert_eq!(config.log_filter, "moonthread=debug");
        assert_eq!(config.passphrase.as_deref().map(String::as_str), Some("secret"));
    }

    #[test]
    fn empty_values_fall_back() {
        let config =
            Config::from_vars(vars(&[(DATA_DIR_ENV, "/tmp/mt"), (PASSPHRASE_ENV, "")])).unwrap();

        assert_eq!(config.log_filter, "info");
        assert!(config.passphrase.is_none());
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let config = Config::from_vars(vars(&[
            (DATA_DIR_ENV, "/tmp/mt"),
            ("OTHERAPP_LOG", "trace"),
        ]))
        .unwrap();

        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn debug_hides_passphrase() {
        let config =
            Config::from_vars(vars(&[(DATA_DIR_ENV, "/tmp/mt"), (PASSPHRASE_ENV, "secret")]))
                .unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
