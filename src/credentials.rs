//! Credential persistence: the session cookie pair goes to the OS secret
//! store via `keyring`, and a small `config.json` (last username only)
//! lives under the platform app-data directory via `directories`.
//!
//! Grounded on `sweetmcp-client-autoconfig`'s use of `directories::ProjectDirs`
//! for a per-user config path, generalized here to also hold a `keyring`
//! entry per the credential-storage note in SPEC_FULL.md §4.2.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::client::cookie::CookieJar;
use crate::config::KEYRING_SERVICE;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("no config directory available for this platform")]
    NoConfigDir,
    #[error("failed to read config file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no stored session for user {0}")]
    NoStoredSession(String),
}

/// The two session cookies persisted across runs, serialized as a single
/// JSON blob in the keyring entry so one secret covers both.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    auth_cookie: Option<String>,
    two_factor_cookie: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LocalConfig {
    last_username: Option<String>,
}

/// Reads and writes session cookies for `username` to the OS keyring, and
/// tracks the last-used username in a local config file.
pub struct CredentialStore {
    app_name: &'static str,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            app_name: KEYRING_SERVICE,
        }
    }

    /// Persist `jar` as the stored session for `username`, and remember
    /// `username` as the last-used login.
    pub fn save_session(&self, username: &str, jar: &CookieJar) -> Result<(), CredentialError> {
        let stored = StoredSession {
            auth_cookie: jar.auth.clone(),
            two_factor_cookie: jar.two_factor_auth.clone(),
        };
        let json = serde_json::to_string(&stored).expect("StoredSession serializes");

        let entry = keyring::Entry::new(self.app_name, username)?;
        entry.set_password(&json)?;

        self.set_last_username(username)?;
        Ok(())
    }

    /// Load a previously stored session for `username`, if any.
    pub fn load_session(&self, username: &str) -> Result<CookieJar, CredentialError> {
        let entry = keyring::Entry::new(self.app_name, username)?;
        let json = match entry.get_password() {
            Ok(json) => json,
            Err(keyring::Error::NoEntry) => {
                return Err(CredentialError::NoStoredSession(username.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let stored: StoredSession =
            serde_json::from_str(&json).map_err(|source| CredentialError::ParseConfig {
                path: PathBuf::from("<keyring>"),
                source,
            })?;

        Ok(CookieJar::new(stored.auth_cookie, stored.two_factor_cookie))
    }

    /// Remove a stored session for `username`, ignoring a missing entry.
    pub fn clear_session(&self, username: &str) -> Result<(), CredentialError> {
        let entry = keyring::Entry::new(self.app_name, username)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The most recently saved username, if a config file exists.
    pub fn last_username(&self) -> Result<Option<String>, CredentialError> {
        let path = self.config_path()?;
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&path).map_err(|source| CredentialError::ReadConfig {
                path: path.clone(),
                source,
            })?;
        let config: LocalConfig =
            serde_json::from_str(&contents).map_err(|source| CredentialError::ParseConfig {
                path: path.clone(),
                source,
            })?;
        Ok(config.last_username)
    }

    fn set_last_username(&self, username: &str) -> Result<(), CredentialError> {
        let path = self.config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CredentialError::WriteConfig {
                path: path.clone(),
                source,
            })?;
        }
        let config = LocalConfig {
            last_username: Some(username.to_string()),
        };
        let json = serde_json::to_string_pretty(&config).expect("LocalConfig serializes");
        std::fs::write(&path, json).map_err(|source| CredentialError::WriteConfig { path, source })
    }

    fn config_path(&self) -> Result<PathBuf, CredentialError> {
        let dirs = directories::ProjectDirs::from("", "", self.app_name)
            .ok_or(CredentialError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.json"))
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
