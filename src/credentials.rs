use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use tracing::{debug, warn};
use zeroize::Zeroizing;

pub const SERVICE_NAME: &str = "com.moonthread.vault";

/// Key under which a remembered vault passphrase is kept.
pub const PASSPHRASE_KEY: &str = "vault-passphrase";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential backend error: {0}")]
    Backend(String),
}

/// A named-secret store: save, load and delete by key. Deleting a key that
/// does not exist succeeds.
pub trait CredentialStore: Send + Sync {
    fn save(&self, key: &str, secret: &str) -> Result<(), CredentialError>;
    fn load(&self, key: &str) -> Result<Option<Zeroizing<String>>, CredentialError>;
    fn delete(&self, key: &str) -> Result<(), CredentialError>;
}

/// Secrets kept in process memory only.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Zeroizing<String>>>, CredentialError>
    {
        self.entries
            .lock()
            .map_err(|e| CredentialError::Backend(e.to_string()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, key: &str, secret: &str) -> Result<(), CredentialError> {
        self.entries()?
            .insert(key.to_owned(), Zeroizing::new(secret.to_owned()));
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Zeroizing<String>>, CredentialError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// The platform secret service (Keychain, Credential Manager, Secret Service).
pub struct KeyringCredentialStore {
    service: String,
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, CredentialError> {
        Entry::new(&self.service, key).map_err(|e| CredentialError::Backend(e.to_string()))
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save(&self, key: &str, secret: &str) -> Result<(), CredentialError> {
        self.entry(key)?.set_password(secret).map_err(|e| {
            warn!(service = %self.service, key, error = %e, "keychain write failed");
            CredentialError::Backend(e.to_string())
        })?;
        debug!(service = %self.service, key, "secret stored in keychain");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Zeroizing<String>>, CredentialError> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                warn!(service = %self.service, key, error = %e, "keychain read failed");
                Err(CredentialError::Backend(e.to_string()))
            }
        }
    }

    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        match self.entry(key)?.delete_password() {
            Ok(()) => {
                debug!(service = %self.service, key, "secret removed from keychain");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        assert!(store.load(PASSPHRASE_KEY).unwrap().is_none());

        store.save(PASSPHRASE_KEY, "hunter2").unwrap();
        assert_eq!(
            store.load(PASSPHRASE_KEY).unwrap().as_deref().map(String::as_str),
            Some("hunter2")
        );

        store.save(PASSPHRASE_KEY, "replaced").unwrap();
        assert_eq!(
            store.load(PASSPHRASE_KEY).unwrap().as_deref().map(String::as_str),
            Some("replaced")
        );
    }

    #[test]
    fn deleting_missing_key_is_fine() {
        let store = MemoryCredentialStore::new();
        store.delete("absent").unwrap();

        store.save("present", "x").unwrap();
        store.delete("present").unwrap();
        assert!(store.load("present").unwrap().is_none());
    }
}
