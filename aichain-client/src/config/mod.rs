use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, warn};

fn default_api_url() -> String {
    "https://us-central1-aichain-launchpad.cloudfunctions.net".to_string()
}

fn default_heartbeat_path() -> String {
    "/heartbeat".to_string()
}

fn default_account_api_url() -> String {
    "https://api.aichain.io/v1".to_string()
}

fn default_heartbeat_interval() -> u64 {
    300 // 5 min
}

fn default_request_timeout() -> u64 {
    10
}

fn default_gpu_query_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_heartbeat_path")]
    pub heartbeat_path: String,
    #[serde(default = "default_account_api_url")]
    pub account_api_url: String,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_gpu_query_timeout")]
    pub gpu_query_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub trust_invalid_server_cert: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            heartbeat_path: default_heartbeat_path(),
            account_api_url: default_account_api_url(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            request_timeout_secs: default_request_timeout(),
            gpu_query_timeout_secs: default_gpu_query_timeout(),
            log_level: default_log_level(),
            trust_invalid_server_cert: false,
        }
    }
}

/// Everything the transport client and the heartbeat loop need, resolved once
/// at construction.
#[derive(Debug, Clone)]
pub struct HeartbeatSettings {
    pub endpoint: String,
    pub account_api_url: String,
    pub timeout: Duration,
    pub interval: Duration,
    /// Budget for one GPU inventory query; a slower probe reports no GPU.
    pub sample_timeout: Duration,
    pub trust_invalid_server_cert: bool,
}

impl HeartbeatSettings {
    /// Settings for a local endpoint, used by tests and ad-hoc runs.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        let config = Config::default();
        Self {
            endpoint: endpoint.into(),
            account_api_url: config.account_api_url,
            timeout: Duration::from_secs(config.request_timeout_secs),
            interval: Duration::from_secs(config.heartbeat_interval_secs),
            sample_timeout: Duration::from_secs(config.gpu_query_timeout_secs),
            trust_invalid_server_cert: false,
        }
    }
}

impl Config {
    pub fn heartbeat_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            self.heartbeat_path.trim_start_matches('/')
        )
    }

    pub fn heartbeat_settings(&self) -> HeartbeatSettings {
        HeartbeatSettings {
            endpoint: self.heartbeat_url(),
            account_api_url: self.account_api_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            interval: Duration::from_secs(self.heartbeat_interval_secs),
            sample_timeout: Duration::from_secs(self.gpu_query_timeout_secs),
            trust_invalid_server_cert: self.trust_invalid_server_cert,
        }
    }

    /// Zero durations would turn the loop into a busy spin or fail every request.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_secs == 0 {
            bail!("heartbeat_interval_secs must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        if self.gpu_query_timeout_secs == 0 {
            bail!("gpu_query_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .validate()
                .with_context(|| format!("Invalid config file {:?}", config_path))?;
            Ok(config)
        } else {
            warn!("Config file not found, using defaults");
            let config = Self::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        let config_dir = config_path
            .parent()
            .context("Failed to get config directory")?;

        fs::create_dir_all(config_dir).context("Failed to create config directory")?;

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, contents).context("Failed to write config file")?;

        info!("Config saved to: {:?}", config_path);
        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("aichain-helper").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.heartbeat_interval_secs, 300);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.log_level, "info");
        assert!(!config.trust_invalid_server_cert);
    }

    #[test]
    fn test_heartbeat_url_joins_cleanly() {
        let mut config = Config::default();
        assert_eq!(
            config.heartbeat_url(),
            "https://us-central1-aichain-launchpad.cloudfunctions.net/heartbeat"
        );

        config.api_url = "http://127.0.0.1:8080/".to_string();
        config.heartbeat_path = "heartbeat".to_string();
        assert_eq!(config.heartbeat_url(), "http://127.0.0.1:8080/heartbeat");
    }

    #[test]
    fn test_heartbeat_settings() {
        let config = Config {
            heartbeat_interval_secs: 30,
            request_timeout_secs: 2,
            ..Default::default()
        };
        let settings = config.heartbeat_settings();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.timeout, Duration::from_secs(2));
        assert_eq!(settings.sample_timeout, Duration::from_secs(5));
        assert_eq!(settings.endpoint, config.heartbeat_url());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"request_timeout_secs": 3}"#).unwrap();
        assert_eq!(config.request_timeout_secs, 3);
        assert_eq!(config.heartbeat_interval_secs, 300);
        assert_eq!(config.heartbeat_path, "/heartbeat");
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = Config {
            api_url: "http://localhost:9000".to_string(),
            trust_invalid_server_cert: true,
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        for field in [
            "heartbeat_interval_secs",
            "request_timeout_secs",
            "gpu_query_timeout_secs",
        ] {
            fs::write(&path, format!(r#"{{"{field}": 0}}"#)).unwrap();
            let err = Config::load_from(&path).unwrap_err();
            assert!(format!("{err:#}").contains(field), "{err:#}");
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }
}
