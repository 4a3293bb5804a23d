//! Configuration loading and management
//!
//! Handles parsing of `simplr.toml` in the data directory. Every field has a
//! default, so an absent file is equivalent to an empty one.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::profile::Profile;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Profile configuration
    #[serde(default)]
    pub profile: ProfileConfig,

    /// Retention sweep configuration
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Reminder configuration
    #[serde(default)]
    pub reminders: ReminderConfig,

    /// Search index configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Badge counter configuration
    #[serde(default)]
    pub badge: BadgeConfig,

    /// Category cache configuration
    #[serde(default)]
    pub categories: CategoryConfig,
}

/// Profile-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Profile used when none is persisted or requested
    #[serde(default = "default_profile")]
    pub default: String,
}

fn default_profile() -> String {
    Profile::Personal.tag().to_string()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            default: default_profile(),
        }
    }
}

/// Retention sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Completed tasks older than this many days are purged
    #[serde(default = "default_completed_days")]
    pub completed_days: u32,
}

fn default_completed_days() -> u32 {
    7
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            completed_days: default_completed_days(),
        }
    }
}

impl RetentionConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.completed_days))
    }
}

/// Reminder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Body used when a task has no description
    #[serde(default = "default_reminder_body")]
    pub default_body: String,
}

fn default_reminder_body() -> String {
    "Task reminder".to_string()
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            default_body: default_reminder_body(),
        }
    }
}

/// Search index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Domain tag attached to every indexed item
    #[serde(default = "default_search_domain")]
    pub domain: String,

    /// Days after completion before a completed task's entry expires
    #[serde(default = "default_completed_expiration_days")]
    pub completed_expiration_days: u32,
}

fn default_search_domain() -> String {
    "app.simplr.tasks".to_string()
}

fn default_completed_expiration_days() -> u32 {
    30
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            domain: default_search_domain(),
            completed_expiration_days: default_completed_expiration_days(),
        }
    }
}

impl SearchConfig {
    pub fn completed_expiration(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.completed_expiration_days))
    }
}

/// Badge counter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeConfig {
    /// Debounce window for `request_update`
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// TTL of the cached count used by the storage refresh path
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Delay before the single retry of a failed badge write
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_retry_delay_ms() -> u64 {
    250
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl BadgeConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Category cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// How long a rebuilt lookup map is trusted
    #[serde(default = "default_category_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

fn default_category_cache_ttl_ms() -> u64 {
    5000
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_category_cache_ttl_ms(),
        }
    }
}

impl CategoryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Config {
    /// Load configuration from a `simplr.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a data directory, or return defaults
    pub fn load_from_dir(data_dir: &Path) -> Self {
        let config_path = data_dir.join(crate::storage::CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("ignoring invalid {}: {err}", config_path.display());
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parsed default profile.
    pub fn default_profile(&self) -> Result<Profile> {
        self.profile.default.parse()
    }

    fn validate(&self) -> Result<()> {
        self.default_profile().map_err(|_| {
            Error::InvalidConfig(format!(
                "profile.default '{}' is not a known profile",
                self.profile.default
            ))
        })?;

        if self.retention.completed_days == 0 {
            return Err(Error::InvalidConfig(
                "retention.completed_days must be >= 1".to_string(),
            ));
        }

        if self.search.domain.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "search.domain cannot be empty".to_string(),
            ));
        }
        if self.search.completed_expiration_days == 0 {
            return Err(Error::InvalidConfig(
                "search.completed_expiration_days must be >= 1".to_string(),
            ));
        }

        if self.badge.debounce_ms > 60_000 {
            return Err(Error::InvalidConfig(
                "badge.debounce_ms must be <= 60000".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_parses_all_sections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("simplr.toml");
        let content = r#"
[profile]
default = "work"

[retention]
completed_days = 14

[reminders]
default_body = "Ping"

[search]
domain = "test.domain"
completed_expiration_days = 10

[badge]
debounce_ms = 100
cache_ttl_secs = 5
retry_delay_ms = 10

[categories]
cache_ttl_ms = 250
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.default_profile().expect("profile"), Profile::Work);
        assert_eq!(cfg.retention.completed_days, 14);
        assert_eq!(cfg.reminders.default_body, "Ping");
        assert_eq!(cfg.search.domain, "test.domain");
        assert_eq!(cfg.search.completed_expiration_days, 10);
        assert_eq!(cfg.badge.debounce(), Duration::from_millis(100));
        assert_eq!(cfg.badge.cache_ttl(), Duration::from_secs(5));
        assert_eq!(cfg.badge.retry_delay(), Duration::from_millis(10));
        assert_eq!(cfg.categories.cache_ttl(), Duration::from_millis(250));
    }

    #[test]
    fn unknown_default_profile_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("simplr.toml");
        fs::write(&path, "[profile]\ndefault = \"school\"").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_retention_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("simplr.toml");
        fs::write(&path, "[retention]\ncompleted_days = 0").expect("write config");

        assert!(matches!(Config::load(&path), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn load_from_dir_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_dir(dir.path());
        assert_eq!(cfg.retention.completed_days, 7);
        assert_eq!(cfg.badge.debounce_ms, 500);
        assert_eq!(cfg.categories.cache_ttl_ms, 5000);
    }

    #[test]
    fn load_from_dir_falls_back_on_invalid_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("simplr.toml"), "this = [not valid").expect("write");
        let cfg = Config::load_from_dir(dir.path());
        assert_eq!(cfg.profile.default, "personal");
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        Config::default().save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("completed_days = 7"));
    }
}
