//! Configuration management with TOML, environment variables, and CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Etsy shop name to monitor
    #[serde(default)]
    pub shop: String,

    /// Hour of day (0-23) the daily counters reset at
    #[serde(default = "default_reset_hour")]
    pub default_reset_hour: u32,

    /// Minutes between scrape cycles
    #[serde(default = "default_scrape_interval_minutes")]
    pub scrape_interval_minutes: u64,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Base delay before each page request in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Random jitter added to delay (0 to this value)
    #[serde(default = "default_delay_jitter_ms")]
    pub delay_jitter_ms: u64,

    /// Adafruit IO username
    #[serde(default)]
    pub aio_username: Option<String>,

    /// Adafruit IO key
    #[serde(default)]
    pub aio_password: Option<String>,

    /// Discord webhook URL for change notifications
    #[serde(default)]
    pub discord_webhook: Option<String>,

    /// Fallback avatar for webhook messages when the shop avatar isn't scraped
    #[serde(default)]
    pub discord_avatar_url: Option<String>,
}

fn default_reset_hour() -> u32 {
    14
}

fn default_scrape_interval_minutes() -> u64 {
    10
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_delay_jitter_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shop: String::new(),
            default_reset_hour: default_reset_hour(),
            scrape_interval_minutes: default_scrape_interval_minutes(),
            proxy: None,
            delay_ms: default_delay_ms(),
            delay_jitter_ms: default_delay_jitter_ms(),
            aio_username: None,
            aio_password: None,
            discord_webhook: None,
            discord_avatar_url: None,
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // 1. Explicit path takes precedence
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // 2. Try current directory
        let local_config = Path::new("config.toml");
        if local_config.exists() {
            debug!("Found config.toml in current directory");
            return Self::from_file(local_config);
        }

        // 3. Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("etsy-tracker").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        // 4. Return default config
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(shop) = std::env::var("ETSY_STORE_NAME") {
            self.shop = shop;
        }

        if let Ok(hour) = std::env::var("DEFAULT_RESET_HOUR") {
            if let Ok(h) = hour.parse() {
                self.default_reset_hour = h;
            }
        }

        if let Ok(minutes) = std::env::var("SCRAPE_INTERVAL_MINUTES") {
            if let Ok(m) = minutes.parse() {
                self.scrape_interval_minutes = m;
            }
        }

        if let Ok(proxy) = std::env::var("ETSY_PROXY") {
            self.proxy = Some(proxy);
        }

        if let Ok(username) = std::env::var("AIO_USERNAME") {
            self.aio_username = Some(username);
        }

        if let Ok(password) = std::env::var("AIO_PASSWORD") {
            self.aio_password = Some(password);
        }

        if let Ok(webhook) = std::env::var("DISCORD_WEBHOOK") {
            self.discord_webhook = Some(webhook);
        }

        if let Ok(avatar) = std::env::var("DISCORD_AVATAR_URL") {
            self.discord_avatar_url = Some(avatar);
        }

        self
    }

    /// Rejects configurations the tracker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.shop.trim().is_empty() {
            anyhow::bail!("No shop configured. Set ETSY_STORE_NAME or --shop.");
        }
        if self.default_reset_hour > 23 {
            anyhow::bail!("Reset hour must be 0-23, got {}", self.default_reset_hour);
        }
        if self.scrape_interval_minutes == 0 {
            anyhow::bail!("Scrape interval must be at least 1 minute");
        }
        Ok(())
    }

    /// True when both Adafruit IO credentials are present.
    pub fn has_aio_credentials(&self) -> bool {
        self.aio_username.is_some() && self.aio_password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.shop, "");
        assert_eq!(config.default_reset_hour, 14);
        assert_eq!(config.scrape_interval_minutes, 10);
        assert_eq!(config.delay_ms, 2000);
        assert_eq!(config.delay_jitter_ms, 500);
        assert!(config.proxy.is_none());
        assert!(config.aio_username.is_none());
        assert!(config.aio_password.is_none());
        assert!(config.discord_webhook.is_none());
        assert!(config.discord_avatar_url.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            shop = "MyStore"
            default_reset_hour = 9
            scrape_interval_minutes = 15
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.shop, "MyStore");
        assert_eq!(config.default_reset_hour, 9);
        assert_eq!(config.scrape_interval_minutes, 15);
        // untouched fields keep their defaults
        assert_eq!(config.delay_ms, 2000);
    }

    #[test]
    fn test_config_from_toml_all_fields() {
        let toml = r#"
            shop = "MyStore"
            default_reset_hour = 6
            scrape_interval_minutes = 30
            proxy = "socks5://localhost:1080"
            delay_ms = 5000
            delay_jitter_ms = 2000
            aio_username = "user"
            aio_password = "aio_key"
            discord_webhook = "https://discord.com/api/webhooks/1/abc"
            discord_avatar_url = "https://img.example/a.png"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.shop, "MyStore");
        assert_eq!(config.default_reset_hour, 6);
        assert_eq!(config.scrape_interval_minutes, 30);
        assert_eq!(config.proxy, Some("socks5://localhost:1080".to_string()));
        assert_eq!(config.delay_ms, 5000);
        assert_eq!(config.delay_jitter_ms, 2000);
        assert!(config.has_aio_credentials());
        assert_eq!(config.discord_webhook, Some("https://discord.com/api/webhooks/1/abc".into()));
        assert_eq!(config.discord_avatar_url, Some("https://img.example/a.png".into()));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "shop = \"FileStore\"").unwrap();
        writeln!(file, "scrape_interval_minutes = 20").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.shop, "FileStore");
        assert_eq!(config.scrape_interval_minutes, 20);
    }

    #[test]
    fn test_config_from_missing_file() {
        let result = Config::from_file("/nonexistent/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [").unwrap();

        let result = Config::from_file(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_empty_shop() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_hour() {
        let config =
            Config { shop: "MyStore".into(), default_reset_hour: 24, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config =
            Config { shop: "MyStore".into(), scrape_interval_minutes: 0, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_reasonable_config() {
        let config = Config { shop: "MyStore".into(), ..Config::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_has_aio_credentials_requires_both() {
        let mut config = Config { aio_username: Some("user".into()), ..Config::default() };
        assert!(!config.has_aio_credentials());

        config.aio_password = Some("key".into());
        assert!(config.has_aio_credentials());
    }
}
