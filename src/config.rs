//! Layered configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `stepgate.toml` in the working directory
//! 3. `<user config dir>/stepgate/config.toml`
//! 4. the file named by `STEPGATE_CONFIG_PATH`
//! 5. `STEPGATE_` environment variables, nested with `__`
//!    (`STEPGATE_REPLAY__TIMEOUT=30s`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recorder::types::VALIDATION_AREA_SIZE;
use crate::replay::waiter::{
    MatchPolicy, DEFAULT_POLL_INTERVAL, DEFAULT_THRESHOLD, DEFAULT_TIMEOUT,
};

pub const CONFIG_FILE: &str = "stepgate.toml";
pub const CONFIG_PATH_ENV: &str = "STEPGATE_CONFIG_PATH";
pub const ENV_PREFIX: &str = "STEPGATE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recorder: RecorderConfig,
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Size of the screenshot taken at every press, anchored at its top-left.
    pub validation_area: (u32, u32),
    pub screenshot_dir: PathBuf,
    /// Pause between launching and the start of recording.
    #[serde(with = "humantime_serde")]
    pub countdown: Duration,
    /// Longest the control loop blocks before re-checking the stop signal.
    #[serde(with = "humantime_serde")]
    pub stop_poll_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            validation_area: VALIDATION_AREA_SIZE,
            screenshot_dir: PathBuf::from("screenshots"),
            countdown: Duration::from_secs(3),
            stop_poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Pause before the first action so the operator can refocus the target.
    #[serde(with = "humantime_serde")]
    pub lead_in: Duration,
    pub threshold: f64,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            lead_in: Duration::from_secs(4),
            threshold: DEFAULT_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ReplayConfig {
    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            threshold: self.threshold,
            timeout: self.timeout,
            poll_interval: self.poll_interval,
        }
    }
}

impl Config {
    /// Load from every source listed in the module docs.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE));

        if let Some(user_file) = user_config_file() {
            figment = figment.merge(Toml::file(user_file));
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            figment = figment.merge(Toml::file(path));
        }

        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with a single TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (width, height) = self.recorder.validation_area;
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid(format!(
                "validation_area must be non-empty, got {width}x{height}"
            )));
        }
        if self.recorder.stop_poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "recorder.stop_poll_interval must be greater than zero".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.replay.threshold) {
            return Err(ConfigError::Invalid(format!(
                "replay.threshold must be within [-1, 1], got {}",
                self.replay.threshold
            )));
        }
        if self.replay.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "replay.timeout must be greater than zero".to_string(),
            ));
        }
        if self.replay.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "replay.poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stepgate").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.recorder.validation_area, (200, 100));
        assert_eq!(config.recorder.screenshot_dir, PathBuf::from("screenshots"));
        assert_eq!(config.replay.lead_in, Duration::from_secs(4));
        assert_eq!(config.replay.threshold, 0.85);
        assert_eq!(config.replay.timeout, Duration::from_secs(20));
        assert_eq!(config.replay.poll_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_overrides_only_what_it_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stepgate.toml");
        std::fs::write(
            &path,
            concat!(
                "[replay]\nthreshold = 0.9\ntimeout = \"45s\"\n\n",
                "[recorder]\nscreenshot_dir = \"shots\"\n",
            ),
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.replay.threshold, 0.9);
        assert_eq!(config.replay.timeout, Duration::from_secs(45));
        assert_eq!(config.replay.poll_interval, Duration::from_secs(1));
        assert_eq!(config.recorder.screenshot_dir, PathBuf::from("shots"));
        assert_eq!(config.recorder.validation_area, (200, 100));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stepgate.toml");
        std::fs::write(&path, "[replay]\nthreshold = 1.5\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = Config::default();
        config.replay.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stepgate.toml");
        std::fs::write(&path, "[replay]\ntimeout = \"0s\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("timeout")));
    }

    #[test]
    fn match_policy_mirrors_replay_settings() {
        let config = ReplayConfig {
            threshold: 0.5,
            ..ReplayConfig::default()
        };
        let policy = config.match_policy();
        assert_eq!(policy.threshold, 0.5);
        assert_eq!(policy.timeout, DEFAULT_TIMEOUT);
    }
}
