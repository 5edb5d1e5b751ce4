//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/huddle/config.toml)
//! 3. Environment variables (HUDDLE_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::BackoffPolicy;

/// Environment variable prefix
const ENV_PREFIX: &str = "HUDDLE";

/// Default quota for the local edit buffer file (5 MiB)
pub const DEFAULT_BUFFER_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (presence database, edit buffer)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Identity of the local user, as issued by the auth provider
    #[serde(default)]
    pub user_id: Option<String>,

    /// Name shown next to our cursor on other clients
    #[serde(default)]
    pub display_name: Option<String>,

    /// Color shown for our cursor on other clients (e.g. "#4287f5")
    #[serde(default)]
    pub display_color: Option<String>,

    /// Realtime collaboration server URL (optional)
    #[serde(default)]
    pub sync_url: Option<String>,

    /// Presence timings
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Reconnect backoff
    #[serde(default)]
    pub reconnect: BackoffPolicy,

    /// Maximum size of the local edit buffer file
    #[serde(default = "default_buffer_quota")]
    pub buffer_quota_bytes: u64,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Presence registry and client timings, all in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Maximum age of a record that still counts as present
    pub freshness_window_ms: u64,
    /// How often a joined client refreshes its record
    pub heartbeat_interval_ms: u64,
    /// How often subscriptions re-read the registry without a change signal
    pub poll_interval_ms: u64,
    /// How often the sweeper runs
    pub cleanup_interval_ms: u64,
    /// Records older than this are deleted by the sweeper
    pub cleanup_older_than_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            freshness_window_ms: 15_000,
            heartbeat_interval_ms: 5_000,
            poll_interval_ms: 2_000,
            cleanup_interval_ms: 60_000,
            cleanup_older_than_ms: 60_000,
        }
    }
}

impl PresenceConfig {
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Poll interval, never longer than the freshness window
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.min(self.freshness_window_ms).max(1))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            user_id: None,
            display_name: None,
            display_color: None,
            sync_url: None,
            presence: PresenceConfig::default(),
            reconnect: BackoffPolicy::default(),
            buffer_quota_bytes: DEFAULT_BUFFER_QUOTA_BYTES,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (HUDDLE_DATA_DIR, HUDDLE_SYNC_URL, HUDDLE_USER_ID, HUDDLE_DISPLAY_NAME)
    /// 2. Config file (~/.config/huddle/config.toml or HUDDLE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty strings clear the optional values
        if let Ok(val) = std::env::var(format!("{}_SYNC_URL", ENV_PREFIX)) {
            self.sync_url = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_USER_ID", ENV_PREFIX)) {
            self.user_id = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_DISPLAY_NAME", ENV_PREFIX)) {
            self.display_name = non_empty(val);
        }
    }

    /// Set a scalar value by key, as used by `huddle config set`
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "user_id" => self.user_id = non_empty(value.to_string()),
            "display_name" => self.display_name = non_empty(value.to_string()),
            "display_color" => self.display_color = non_empty(value.to_string()),
            "sync_url" => self.sync_url = non_empty(value.to_string()),
            "log_file" => self.log_file = non_empty(value.to_string()).map(PathBuf::from),
            "buffer_quota_bytes" => self.buffer_quota_bytes = parse_number(key, value)?,
            "freshness_window_ms" => self.presence.freshness_window_ms = parse_number(key, value)?,
            "heartbeat_interval_ms" => {
                self.presence.heartbeat_interval_ms = parse_number(key, value)?
            }
            "cleanup_older_than_ms" => {
                self.presence.cleanup_older_than_ms = parse_number(key, value)?
            }
            "cleanup_interval_ms" => self.presence.cleanup_interval_ms = parse_number(key, value)?,
            "poll_interval_ms" => self.presence.poll_interval_ms = parse_number(key, value)?,
            "reconnect_base_ms" => self.reconnect.base_ms = parse_number(key, value)?,
            "reconnect_max_ms" => self.reconnect.max_ms = parse_number(key, value)?,
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        }
        Ok(())
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with HUDDLE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("huddle")
            .join("config.toml")
    }

    /// Get the path to the presence SQLite database
    pub fn presence_db_path(&self) -> PathBuf {
        self.data_dir.join("presence.db")
    }

    /// Get the path to the local edit buffer file
    pub fn buffer_path(&self) -> PathBuf {
        self.data_dir.join("edit_buffer.json")
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("{} must be a non-negative integer, got {:?}", key, value))
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("huddle")
}

fn default_buffer_quota() -> u64 {
    DEFAULT_BUFFER_QUOTA_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "HUDDLE_DATA_DIR",
        "HUDDLE_SYNC_URL",
        "HUDDLE_USER_ID",
        "HUDDLE_DISPLAY_NAME",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.sync_url.is_none());
        assert!(config.user_id.is_none());
        assert!(config.data_dir.ends_with("huddle"));
        assert_eq!(config.presence.freshness_window_ms, 15_000);
        assert_eq!(config.reconnect.base_ms, 30_000);
        assert_eq!(config.reconnect.max_ms, 300_000);
        assert_eq!(config.buffer_quota_bytes, DEFAULT_BUFFER_QUOTA_BYTES);
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.presence_db_path().ends_with("presence.db"));
        assert!(config.buffer_path().ends_with("edit_buffer.json"));
    }

    #[test]
    fn test_poll_interval_bounded_by_freshness_window() {
        let presence = PresenceConfig {
            freshness_window_ms: 1_000,
            poll_interval_ms: 5_000,
            ..PresenceConfig::default()
        };
        assert_eq!(presence.poll_interval(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("HUDDLE_DATA_DIR", "/tmp/huddle-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/huddle-test"));
    }

    #[test]
    fn test_env_override_identity() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("HUDDLE_USER_ID", "user-7");
        env::set_var("HUDDLE_DISPLAY_NAME", "Ada");
        config.apply_env_overrides();
        assert_eq!(config.user_id.as_deref(), Some("user-7"));
        assert_eq!(config.display_name.as_deref(), Some("Ada"));

        // Empty string clears it
        env::set_var("HUDDLE_USER_ID", "");
        config.apply_env_overrides();
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_env_override_sync_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("HUDDLE_SYNC_URL", "ws://localhost:3030");
        config.apply_env_overrides();
        assert_eq!(config.sync_url, Some("ws://localhost:3030".to_string()));

        env::set_var("HUDDLE_SYNC_URL", "");
        config.apply_env_overrides();
        assert!(config.sync_url.is_none());
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("display_color", "#ff0000").unwrap();
        config.set_value("reconnect_base_ms", "1000").unwrap();
        config.set_value("freshness_window_ms", "20000").unwrap();

        assert_eq!(config.display_color.as_deref(), Some("#ff0000"));
        assert_eq!(config.reconnect.base_ms, 1000);
        assert_eq!(config.presence.freshness_window_ms, 20_000);

        config.set_value("poll_interval_ms", "250").unwrap();
        config.set_value("cleanup_interval_ms", "90000").unwrap();
        assert_eq!(config.presence.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.presence.cleanup_interval(), Duration::from_millis(90_000));

        assert!(config.set_value("reconnect_max_ms", "soon").is_err());
        assert!(config.set_value("poll_interval_ms", "-1").is_err());
        assert!(config.set_value("favorite_color", "blue").is_err());
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/huddle"),
            user_id: Some("user-1".to_string()),
            sync_url: Some("ws://sync.example.com".to_string()),
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("[presence]"));
        assert!(toml_str.contains("[reconnect]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.user_id, config.user_id);
        assert_eq!(parsed.sync_url, config.sync_url);
        assert_eq!(parsed.presence, config.presence);
    }

    #[test]
    fn test_load_from_str_partial_tables() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            user_id = "u-42"

            [presence]
            freshness_window_ms = 30000

            [reconnect]
            base_ms = 500
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.user_id.as_deref(), Some("u-42"));
        assert_eq!(config.presence.freshness_window_ms, 30_000);
        // Unset fields fall back to defaults
        assert_eq!(config.presence.heartbeat_interval_ms, 5_000);
        assert_eq!(config.reconnect.base_ms, 500);
        assert_eq!(config.reconnect.max_ms, 300_000);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("HUDDLE_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.sync_url.is_none());
        assert!(config.data_dir.exists());
    }
}
