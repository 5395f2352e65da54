use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{self, KdfParams};
use crate::models::AppData;

pub const VAULT_FILE_NAME: &str = "vault.mt";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no vault at {0}")]
    Missing(PathBuf),
}

/// The encrypted file holding every period record and the user settings.
#[derive(Debug, Clone)]
pub struct Vault {
    path: PathBuf,
    kdf: KdfParams,
}

impl Vault {
    pub fn new(path: impl Into<PathBuf>, kdf: KdfParams) -> Self {
        Self {
            path: path.into(),
            kdf,
        }
    }

    /// `<dir>/vault.mt` with the default key derivation cost.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(VAULT_FILE_NAME), KdfParams::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a vault has been created (i.e. the app has been set up).
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Encrypt and write `data`. The file is replaced atomically so a crash
    /// mid-write leaves the previous vault intact.
    pub fn save(&self, passphrase: &str, data: &AppData) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let json = Zeroizing::new(serde_json::to_vec(data)?);
        let sealed = crypto::seal(passphrase, &json, &self.kdf)?;

        let staging = self.path.with_extension("mt.tmp");
        let replaced = fs::write(&staging, &sealed).and_then(|_| fs::rename(&staging, &self.path));
        if let Err(e) = replaced {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), records = data.periods.len(), "vault saved");
        Ok(())
    }

    /// Read and decrypt the vault.
    pub fn load(&self, passphrase: &str) -> Result<AppData, StorageError> {
        if !self.exists() {
            return Err(StorageError::Missing(self.path.clone()));
        }
        let sealed = fs::read(&self.path)?;
        let json = crypto::open(passphrase, &sealed)?;
        let data: AppData = serde_json::from_slice(&json)?;

        debug!(path = %self.path.display(), records = data.periods.len(), "vault loaded");
        Ok(data)
    }

    /// Delete all data permanently.
    pub fn wipe(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
