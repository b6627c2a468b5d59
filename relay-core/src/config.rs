use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    engine::RefreshPolicy, location::LocationOptions, location::LocationSource,
    provider::FetcherKind,
};

/// Environment variable that overrides the API key from the config file.
pub const SECRET_ENV: &str = "WEATHER_SECRET";

/// Value left behind by builds that never had a real key injected.
pub const API_KEY_PLACEHOLDER: &str = "WEATHER_API_KEY_PLACEHOLDER";

/// Timing knobs, all in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// How long a position fix stays good.
    pub gps_cache_secs: u64,
    /// Minimum age before the weather is fetched again.
    pub weather_interval_secs: u64,
    /// Period of the staleness check. Defaults per fetcher kind when unset.
    pub poll_interval_secs: Option<u64>,
    pub location_timeout_secs: u64,
    pub location_max_age_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            gps_cache_secs: 3 * 60 * 60,
            weather_interval_secs: 15 * 60,
            poll_interval_secs: None,
            location_timeout_secs: 15,
            location_max_age_secs: 60,
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// fetcher = "forecast"
///
/// [location]
/// kind = "static"
/// latitude = 52.37
/// longitude = 4.89
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenWeather API key.
    pub api_key: Option<String>,

    /// Weather source: "current", "forecast" or "fixed".
    pub fetcher: String,

    /// Override for the OpenWeather base URL.
    pub base_url: Option<String>,

    pub location: LocationSource,

    pub timing: Timing,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            fetcher: FetcherKind::Forecast.as_str().to_string(),
            base_url: None,
            location: LocationSource::default(),
            timing: Timing::default(),
        }
    }
}

impl Config {
    /// Return the fetcher as a strongly-typed FetcherKind.
    pub fn fetcher_kind(&self) -> Result<FetcherKind> {
        FetcherKind::try_from(self.fetcher.as_str())
    }

    pub fn set_fetcher(&mut self, kind: FetcherKind) {
        self.fetcher = kind.as_str().to_string();
    }

    /// Load config from the platform config directory and apply the
    /// environment override for the API key.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;
        cfg.apply_secret(std::env::var(SECRET_ENV).ok());
        Ok(cfg)
    }

    /// Load config from `path`, or return defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config directory.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-relay", "weather-relay")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// A non-empty secret replaces whatever key the file holds.
    pub fn apply_secret(&mut self, secret: Option<String>) {
        if let Some(secret) = secret.filter(|s| !s.trim().is_empty()) {
            self.api_key = Some(secret.trim().to_string());
        }
    }

    /// True when a real key is present (not empty, not the build placeholder).
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|k| !k.is_empty() && k != API_KEY_PLACEHOLDER)
    }

    /// The key as it may appear in logs: first 8 characters only.
    pub fn masked_api_key(&self) -> String {
        match self.api_key.as_deref() {
            Some(key) if self.has_api_key() => {
                let prefix: String = key.chars().take(8).collect();
                format!("{prefix}...")
            }
            _ => "MISSING".to_string(),
        }
    }

    /// Log the key state once at startup.
    pub fn warn_if_key_missing(&self) -> Result<()> {
        let kind = self.fetcher_kind()?;
        tracing::info!("API key loaded: {}", self.masked_api_key());
        if kind.needs_api_key() && !self.has_api_key() {
            tracing::warn!(
                "No API key found! Set {SECRET_ENV} or run `weather-relay configure`."
            );
        }
        Ok(())
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            gps_cache_duration: seconds(self.timing.gps_cache_secs),
            weather_update_interval: seconds(self.timing.weather_interval_secs),
            location: LocationOptions {
                timeout: Duration::from_secs(self.timing.location_timeout_secs),
                maximum_age: Duration::from_secs(self.timing.location_max_age_secs),
            },
        }
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        let secs = match self.timing.poll_interval_secs {
            Some(secs) => secs,
            None => self.fetcher_kind()?.default_poll_secs(),
        };
        if secs == 0 {
            return Err(anyhow!("timing.poll_interval_secs must be greater than zero"));
        }
        Ok(Duration::from_secs(secs))
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_battery_strategy() {
        let cfg = Config::default();
        assert_eq!(cfg.fetcher_kind().unwrap(), FetcherKind::Forecast);
        assert_eq!(cfg.location, LocationSource::Ip);

        let policy = cfg.refresh_policy();
        assert_eq!(policy.gps_cache_duration, chrono::Duration::hours(3));
        assert_eq!(policy.weather_update_interval, chrono::Duration::minutes(15));
        assert_eq!(policy.location, LocationOptions::default());
    }

    #[test]
    fn poll_interval_follows_fetcher_unless_set() {
        let mut cfg = Config::default();
        assert_eq!(cfg.poll_interval().unwrap(), Duration::from_secs(300));

        cfg.set_fetcher(FetcherKind::Current);
        assert_eq!(cfg.poll_interval().unwrap(), Duration::from_secs(900));

        cfg.timing.poll_interval_secs = Some(42);
        assert_eq!(cfg.poll_interval().unwrap(), Duration::from_secs(42));

        cfg.timing.poll_interval_secs = Some(0);
        assert!(cfg.poll_interval().is_err());
    }

    #[test]
    fn secret_overrides_file_key() {
        let mut cfg = Config {
            api_key: Some("from-file".into()),
            ..Config::default()
        };

        cfg.apply_secret(None);
        assert_eq!(cfg.api_key.as_deref(), Some("from-file"));

        cfg.apply_secret(Some("   ".into()));
        assert_eq!(cfg.api_key.as_deref(), Some("from-file"));

        cfg.apply_secret(Some("from-env\n".into()));
        assert_eq!(cfg.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn placeholder_counts_as_missing() {
        let mut cfg = Config::default();
        assert!(!cfg.has_api_key());
        assert_eq!(cfg.masked_api_key(), "MISSING");

        cfg.api_key = Some(API_KEY_PLACEHOLDER.into());
        assert!(!cfg.has_api_key());
        assert_eq!(cfg.masked_api_key(), "MISSING");

        cfg.api_key = Some("0123456789abcdef".into());
        assert!(cfg.has_api_key());
        assert_eq!(cfg.masked_api_key(), "01234567...");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.fetcher, "forecast");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config {
            api_key: Some("KEY".into()),
            location: LocationSource::Static {
                latitude: 52.37,
                longitude: 4.89,
            },
            ..Config::default()
        };
        cfg.set_fetcher(FetcherKind::Current);
        cfg.timing.poll_interval_secs = Some(120);
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("KEY"));
        assert_eq!(loaded.fetcher_kind().unwrap(), FetcherKind::Current);
        assert_eq!(loaded.location, cfg.location);
        assert_eq!(loaded.timing, cfg.timing);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: Config = toml::from_str("fetcher = \"fixed\"\n[timing]\ngps_cache_secs = 60\n")
            .unwrap();
        assert_eq!(cfg.fetcher_kind().unwrap(), FetcherKind::Fixed);
        assert_eq!(cfg.timing.gps_cache_secs, 60);
        assert_eq!(cfg.timing.weather_interval_secs, 900);
        assert_eq!(cfg.location, LocationSource::Ip);
    }
}
