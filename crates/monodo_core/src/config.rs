//! Runtime configuration.
//!
//! # Responsibility
//! - Collect data directory, logging, cadence, language and permission
//!   settings in one typed value.
//! - Read overrides from `MONODO_*` environment variables.
//!
//! # Invariants
//! - `data_dir` is absolute once loaded from the environment.
//! - `tick_interval` is at least one second.

use crate::i18n::Language;
use crate::logging::default_log_level;
use crate::notify::NotificationPermission;
use crate::scheduler::policy::TICK_INTERVAL;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DATA_DIR: &str = "MONODO_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "MONODO_LOG_LEVEL";
pub const ENV_TICK_SECS: &str = "MONODO_TICK_SECS";
pub const ENV_LANG: &str = "MONODO_LANG";
pub const ENV_NOTIFICATIONS: &str = "MONODO_NOTIFICATIONS";

const DEFAULT_DB_FILE_NAME: &str = "monodo.sqlite3";
const DATA_DIR_NAME: &str = ".monodo";
const LOG_DIR_NAME: &str = "logs";

/// Configuration errors, one per offending variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingHome,
    RelativeDataDir(PathBuf),
    InvalidTickSeconds(String),
    UnsupportedLanguage(String),
    InvalidPermission(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHome => write!(
                f,
                "cannot resolve data directory: set {ENV_DATA_DIR} or HOME"
            ),
            Self::RelativeDataDir(path) => write!(
                f,
                "{ENV_DATA_DIR} must be an absolute path, got `{}`",
                path.display()
            ),
            Self::InvalidTickSeconds(value) => write!(
                f,
                "{ENV_TICK_SECS} must be a positive integer, got `{value}`"
            ),
            Self::UnsupportedLanguage(value) => {
                write!(f, "{ENV_LANG} must be `en` or `zh`, got `{value}`")
            }
            Self::InvalidPermission(value) => write!(
                f,
                "{ENV_NOTIFICATIONS} must be granted|denied|default, got `{value}`"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Effective application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonodoConfig {
    pub data_dir: PathBuf,
    pub db_file_name: String,
    pub log_level: String,
    pub tick_interval: Duration,
    pub language: Language,
    pub notification_permission: NotificationPermission,
}

impl MonodoConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            log_level: default_log_level().to_string(),
            tick_interval: TICK_INTERVAL,
            language: Language::default(),
            // Local CLI host: the user opted in by running the watcher.
            notification_permission: NotificationPermission::Granted,
        }
    }

    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = match non_empty(lookup(ENV_DATA_DIR)) {
            Some(value) => PathBuf::from(value),
            None => non_empty(lookup("HOME"))
                .map(|home| PathBuf::from(home).join(DATA_DIR_NAME))
                .ok_or(ConfigError::MissingHome)?,
        };
        if !data_dir.is_absolute() {
            return Err(ConfigError::RelativeDataDir(data_dir));
        }

        let mut config = Self::with_data_dir(data_dir);

        if let Some(level) = non_empty(lookup(ENV_LOG_LEVEL)) {
            // Validated by `init_logging`, which owns the level vocabulary.
            config.log_level = level;
        }
        if let Some(value) = non_empty(lookup(ENV_TICK_SECS)) {
            let secs = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidTickSeconds(value.clone()))?;
            config.tick_interval = Duration::from_secs(secs);
        }
        if let Some(value) = non_empty(lookup(ENV_LANG)) {
            config.language =
                Language::parse(&value).ok_or(ConfigError::UnsupportedLanguage(value))?;
        }
        if let Some(value) = non_empty(lookup(ENV_NOTIFICATIONS)) {
            config.notification_permission = NotificationPermission::parse(&value)
                .ok_or(ConfigError::InvalidPermission(value))?;
        }

        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file_name)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
