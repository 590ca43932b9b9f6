//! Scheduler and session configuration
//!
//! Loaded from `config.toml` in the platform config directory. Every key is
//! optional; a missing file yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{FlashcardError, Result};

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Collection database path (defaults to the platform data directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    pub scheduler: SchedulerConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Default location: `~/.config/recall/config.toml` on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("recall").join("config.toml"))
    }

    /// Default collection database location
    pub fn default_database_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|p| p.join("recall").join("collection.db"))
    }

    /// Load and validate a config file. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.scheduler.validate()?;
        Ok(config)
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.clone().or_else(Self::default_database_path)
    }
}

/// Ceiling for `maximum_interval_days`, well inside chrono's date range
const MAXIMUM_INTERVAL_LIMIT_DAYS: f64 = 1_000_000.0;

/// Options consumed by the scheduling policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Learning step delays in seconds, ascending
    pub learning_steps: Vec<u32>,
    pub graduating_interval_days: f64,
    pub easy_interval_days: f64,
    /// Upper bound on any interval, in days
    pub maximum_interval_days: f64,
    pub starting_ease: f64,
    pub ease_floor: f64,
    pub hard_interval_multiplier: f64,
    pub easy_bonus_multiplier: f64,
    pub lapse_ease_penalty: f64,
    pub hard_ease_penalty: f64,
    pub easy_ease_bonus: f64,
    /// Fraction of the interval kept on a lapse (0 discards it)
    pub lapse_interval_multiplier: f64,
    /// Maximum relative jitter applied to review due dates
    pub fuzz_fraction: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            learning_steps: vec![60, 600],
            graduating_interval_days: 1.0,
            easy_interval_days: 4.0,
            maximum_interval_days: 36_500.0,
            starting_ease: 2.5,
            ease_floor: 1.3,
            hard_interval_multiplier: 1.2,
            easy_bonus_multiplier: 1.3,
            lapse_ease_penalty: 0.20,
            hard_ease_penalty: 0.15,
            easy_ease_bonus: 0.15,
            lapse_interval_multiplier: 0.0,
            fuzz_fraction: 0.05,
        }
    }
}

impl SchedulerConfig {
    /// Same options with fuzz disabled, for previews and reproducible runs
    pub fn without_fuzz(&self) -> Self {
        Self {
            fuzz_fraction: 0.0,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FlashcardError::InvalidConfig(msg));

        if self.learning_steps.is_empty() {
            return invalid("learning_steps must not be empty".to_string());
        }
        if self.learning_steps.contains(&0) {
            return invalid("learning_steps must be positive".to_string());
        }
        if self.learning_steps.windows(2).any(|w| w[0] > w[1]) {
            return invalid(format!(
                "learning_steps must be ascending, got {:?}",
                self.learning_steps
            ));
        }
        if !(self.graduating_interval_days > 0.0) {
            return invalid("graduating_interval_days must be positive".to_string());
        }
        if self.easy_interval_days < self.graduating_interval_days {
            return invalid("easy_interval_days must be at least graduating_interval_days".to_string());
        }
        if !(self.maximum_interval_days >= self.easy_interval_days) {
            return invalid("maximum_interval_days must be at least easy_interval_days".to_string());
        }
        if !(self.maximum_interval_days <= MAXIMUM_INTERVAL_LIMIT_DAYS) {
            return invalid(format!(
                "maximum_interval_days must not exceed {}",
                MAXIMUM_INTERVAL_LIMIT_DAYS
            ));
        }
        if !(self.ease_floor > 1.0) {
            return invalid("ease_floor must be greater than 1.0".to_string());
        }
        if self.starting_ease < self.ease_floor {
            return invalid("starting_ease must be at least ease_floor".to_string());
        }
        if !(self.hard_interval_multiplier > 0.0) {
            return invalid("hard_interval_multiplier must be positive".to_string());
        }
        if !(self.easy_bonus_multiplier >= 1.0) {
            return invalid("easy_bonus_multiplier must be at least 1.0".to_string());
        }
        for (name, value) in [
            ("lapse_ease_penalty", self.lapse_ease_penalty),
            ("hard_ease_penalty", self.hard_ease_penalty),
            ("easy_ease_bonus", self.easy_ease_bonus),
        ] {
            if !(value >= 0.0) {
                return invalid(format!("{} must not be negative", name));
            }
        }
        if !(0.0..=1.0).contains(&self.lapse_interval_multiplier) {
            return invalid("lapse_interval_multiplier must be within [0, 1]".to_string());
        }
        if !(0.0..0.5).contains(&self.fuzz_fraction) {
            return invalid("fuzz_fraction must be within [0, 0.5)".to_string());
        }

        Ok(())
    }
}

/// Options consumed by the review session driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of new cards introduced in one session
    pub new_card_limit: Option<usize>,
    /// Learning cards due within this many seconds are shown when nothing
    /// else is due
    pub learn_ahead_secs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            new_card_limit: Some(20),
            learn_ahead_secs: 1200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.learning_steps, vec![60, 600]);
        assert_eq!(config.without_fuzz().fuzz_fraction, 0.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [scheduler]
            learning_steps = [30, 300, 3600]
            starting_ease = 2.0

            [session]
            learn_ahead_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.learning_steps, vec![30, 300, 3600]);
        assert_eq!(config.scheduler.starting_ease, 2.0);
        assert_eq!(config.scheduler.ease_floor, 1.3);
        assert_eq!(config.session.learn_ahead_secs, 0);
        assert_eq!(config.session.new_card_limit, Some(20));
        assert!(config.database.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad = [
            "[scheduler]\nlearning_steps = []",
            "[scheduler]\nlearning_steps = [600, 60]",
            "[scheduler]\nease_floor = 0.9",
            "[scheduler]\nstarting_ease = 1.0",
            "[scheduler]\nfuzz_fraction = 0.7",
            "[scheduler]\neasy_bonus_multiplier = 0.8",
            "[scheduler]\neasy_interval_days = 0.5",
            "[scheduler]\nmaximum_interval_days = 2.0",
            "[scheduler]\nmaximum_interval_days = 1e12",
        ];
        for content in bad {
            assert!(
                matches!(AppConfig::from_toml(content), Err(FlashcardError::InvalidConfig(_))),
                "accepted {}",
                content
            );
        }

        assert!(matches!(
            AppConfig::from_toml("[scheduler]\nlearning_steps = \"soon\""),
            Err(FlashcardError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_load_missing_and_present_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config, AppConfig::default());

        fs::write(&path, "database = \"/tmp/cards.db\"\n").unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.database_path(), Some(PathBuf::from("/tmp/cards.db")));
    }
}
