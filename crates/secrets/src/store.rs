//! The secret store seam used by the connection resolver

use anyhow::{bail, Result};
use std::cell::RefCell;
use std::collections::HashMap;

use crate::vault::VaultError;

/// Password lookup keyed by a service name and an account name.
///
/// The service is usually derived from the server base URL, the account is
/// the login name on that server.
pub trait SecretStore {
    /// Look up a secret. `Ok(None)` means nothing is stored for the pair.
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>>;

    /// Store (or replace) a secret.
    fn set_secret(&self, service: &str, account: &str, value: &str) -> Result<()>;
}

impl<S: SecretStore + ?Sized> SecretStore for &S {
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>> {
        (**self).get_secret(service, account)
    }

    fn set_secret(&self, service: &str, account: &str, value: &str) -> Result<()> {
        (**self).set_secret(service, account, value)
    }
}

/// Non-persistent store, handy for tests and `--password`-only sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored secrets
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .borrow()
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn set_secret(&self, service: &str, account: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            bail!(VaultError::EmptyValue);
        }
        self.entries
            .borrow_mut()
            .insert((service.to_string(), account.to_string()), value.to_string());
        Ok(())
    }
}
