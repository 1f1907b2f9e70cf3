use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::BufWriter;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Credential sent with every request. Formatting never shows more than the
/// first four characters.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn masked(&self) -> String {
        let visible: String = self.0.chars().take(4).collect();
        if self.0.chars().count() > 4 {
            format!("{visible}****")
        } else {
            "****".to_string()
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.masked()).finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Key and wallet as persisted in the user's home directory.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub wallet: String,
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("api_key", &self.key())
            .field("wallet", &self.wallet)
            .finish()
    }
}

impl StoredCredentials {
    pub fn new(api_key: impl Into<String>, wallet: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            wallet: wallet.into(),
        }
    }

    pub fn key(&self) -> ApiKey {
        ApiKey::new(self.api_key.clone())
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.wallet.trim().is_empty()
    }

    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".aichain_config.json"))
    }

    /// Missing or unreadable files load as empty credentials.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let parsed = fs::read_to_string(path)
            .context("Failed to read credentials file")
            .and_then(|contents| {
                serde_json::from_str::<Self>(&contents).context("Failed to parse credentials file")
            });

        match parsed {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("Ignoring stored credentials at {:?}: {:#}", path, e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create credentials directory")?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .context("Failed to open credentials file")?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            file.set_permissions(Permissions::from_mode(0o600))
                .context("Failed to restrict credentials file permissions")?;
        }

        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, self).context("Failed to write credentials file")?;
        info!("Credentials saved to: {:?}", path);
        Ok(())
    }

    /// Replaces the stored key and keeps whatever wallet is already on disk.
    pub fn update_api_key_at(path: &Path, api_key: &str) -> Result<()> {
        let mut credentials = Self::load_from(path);
        credentials.api_key = api_key.to_string();
        credentials.save_to(path)
    }

    pub fn clear_at(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).context("Failed to delete credentials file")?;
            info!("Deleted credentials file at {:?}", path);
        } else {
            warn!("No credentials file found at {:?}", path);
        }
        Ok(())
    }
}

pub fn load_config() -> Result<StoredCredentials> {
    Ok(StoredCredentials::load_from(&StoredCredentials::default_path()?))
}

pub fn save_config(api_key: &str, wallet: &str) -> Result<()> {
    StoredCredentials::new(api_key, wallet).save_to(&StoredCredentials::default_path()?)
}

pub fn load_api_key() -> Result<String> {
    Ok(load_config()?.api_key)
}

pub fn save_api_key(api_key: &str) -> Result<()> {
    StoredCredentials::update_api_key_at(&StoredCredentials::default_path()?, api_key)
}

pub fn clear() -> Result<()> {
    StoredCredentials::clear_at(&StoredCredentials::default_path()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".aichain_config.json");

        StoredCredentials::new("k", "w").save_to(&path).unwrap();
        let loaded = StoredCredentials::load_from(&path);

        assert_eq!(loaded, StoredCredentials::new("k", "w"));
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"api_key": "k", "wallet": "w"}));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");

        StoredCredentials::new("k", "w").save_to(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = StoredCredentials::load_from(&dir.path().join("absent.json"));
        assert_eq!(loaded, StoredCredentials::default());
        assert!(!loaded.is_complete());
    }

    #[test]
    fn test_malformed_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(&path, "not json at all").unwrap();

        assert_eq!(StoredCredentials::load_from(&path), StoredCredentials::default());
    }

    #[test]
    fn test_missing_keys_default_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(&path, r#"{"api_key": "abc"}"#).unwrap();

        let loaded = StoredCredentials::load_from(&path);
        assert_eq!(loaded.api_key, "abc");
        assert_eq!(loaded.wallet, "");
    }

    #[test]
    fn test_update_api_key_keeps_wallet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        StoredCredentials::new("old", "wallet1").save_to(&path).unwrap();

        StoredCredentials::update_api_key_at(&path, "new").unwrap();
        assert_eq!(
            StoredCredentials::load_from(&path),
            StoredCredentials::new("new", "wallet1")
        );
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        StoredCredentials::new("k", "w").save_to(&path).unwrap();

        StoredCredentials::clear_at(&path).unwrap();
        assert!(!path.exists());
        // second clear is a no-op
        StoredCredentials::clear_at(&path).unwrap();
    }

    #[test]
    fn test_api_key_is_masked() {
        let key = ApiKey::new("sk-live-1234567890");
        assert_eq!(key.to_string(), "sk-l****");
        assert!(!format!("{:?}", key).contains("1234567890"));
        assert_eq!(ApiKey::new("abc").to_string(), "****");
        assert_eq!(key.expose(), "sk-live-1234567890");
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let creds = StoredCredentials::new("secret-value", "wallet1");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret-value"));
        assert!(debug.contains("wallet1"));
    }
}
