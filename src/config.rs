//! File-based persistence settings.
//!
//! ```toml
//! key = "app-state"
//! dir = "/var/lib/myapp/state"
//!
//! [encryption]
//! key_env = "MYAPP_STATE_KEY"
//! ```
//!
//! The encryption key itself never lives in the config file: `key_env` names
//! an environment variable holding 64 hex characters (an AES-256 key).

use crate::cipher::SecretKey;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable read when `[encryption]` omits `key_env`.
pub const DEFAULT_KEY_ENV: &str = "BOLSA_SECRET_KEY";

#[derive(Clone, Debug, Deserialize)]
pub struct PersistConfig {
    /// Storage key the state is saved under.
    pub key: String,
    /// Directory for [`FileStorage`](crate::FileStorage) records.
    pub dir: PathBuf,
    #[serde(default)]
    pub encryption: Option<EncryptionConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

fn default_key_env() -> String {
    DEFAULT_KEY_ENV.to_string()
}

impl PersistConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Resolve the encryption key, if encryption is configured.
    pub fn secret_key(&self) -> Result<Option<SecretKey>, ConfigError> {
        let Some(encryption) = &self.encryption else {
            return Ok(None);
        };
        let hex = std::env::var(&encryption.key_env)
            .map_err(|_| ConfigError::MissingEnv(encryption.key_env.clone()))?;
        Ok(Some(SecretKey::from_hex(&hex)?))
    }
}
