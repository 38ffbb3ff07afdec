//! Session persistence in the OS credential store.
//!
//! Only the refresh token is kept; access tokens are short-lived and are
//! re-obtained from it on the next start. The `keyring` crate maps to
//! Keychain on macOS, DPAPI on Windows and the Secret Service on Linux.

use keyring::Entry;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{AppError, AppResult};

const SERVICE_NAME: &str = "back-office";

const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_LAST_EMAIL: &str = "last_email";

/// Where the persisted session lives.
pub trait SessionStore: Send + Sync {
    fn load(&self, key: &str) -> Option<Zeroizing<String>>;
    fn save(&self, key: &str, value: &str) -> AppResult<()>;
    fn delete(&self, key: &str) -> AppResult<()>;

    fn refresh_token(&self) -> Option<Zeroizing<String>> {
        self.load(KEY_REFRESH_TOKEN)
    }

    fn save_refresh_token(&self, token: &str) -> AppResult<()> {
        self.save(KEY_REFRESH_TOKEN, token)
    }

    /// Pre-fills the login form.
    fn last_email(&self) -> Option<String> {
        self.load(KEY_LAST_EMAIL).map(|v| v.to_string())
    }

    fn save_last_email(&self, email: &str) -> AppResult<()> {
        self.save(KEY_LAST_EMAIL, email)
    }

    /// Forget the session. The remembered email survives logout.
    fn clear_session(&self) -> AppResult<()> {
        self.delete(KEY_REFRESH_TOKEN)
    }
}

// ---------------------------------------------------------------------------
// OS keyring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    service: String,
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringSessionStore {
    /// `service` namespaces the entries; one per backend project lets two
    /// installations coexist on the same machine.
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> AppResult<Entry> {
        Entry::new(&self.service, key).map_err(|e| AppError::LocalStore(e.to_string()))
    }
}

impl SessionStore for KeyringSessionStore {
    fn load(&self, key: &str) -> Option<Zeroizing<String>> {
        let entry = match self.entry(key) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(value) => Some(Zeroizing::new(value)),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to read credential");
                None
            }
        }
    }

    fn save(&self, key: &str, value: &str) -> AppResult<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| AppError::LocalStore(e.to_string()))?;
        info!(key, "keyring: credential stored");
        Ok(())
    }

    fn delete(&self, key: &str) -> AppResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AppError::LocalStore(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store: nothing survives a restart. Used in tests and when
/// the platform has no credential service.
#[derive(Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &str) -> Option<Zeroizing<String>> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn save(&self, key: &str, value: &str) -> AppResult<()> {
        self.values
            .lock()
            .map_err(|e| AppError::LocalStore(e.to_string()))?
            .insert(key.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    fn delete(&self, key: &str) -> AppResult<()> {
        self.values
            .lock()
            .map_err(|e| AppError::LocalStore(e.to_string()))?
            .remove(key);
        Ok(())
    }
}
