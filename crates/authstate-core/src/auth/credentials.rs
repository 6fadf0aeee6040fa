use anyhow::{Context, Result};
use keyring::Entry;

use super::storage::SessionStorage;

const SERVICE_NAME: &str = "authstate";

/// Session slots kept in the OS keychain, one entry per slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringStorage;

impl KeyringStorage {
    pub fn new() -> Self {
        Self
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, key).context("Failed to create keyring entry")
    }
}

impl SessionStorage for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read session slot from keychain"),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store session slot in keychain")
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session slot from keychain"),
        }
    }
}
