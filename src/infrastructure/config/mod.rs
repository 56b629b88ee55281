//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::application::errors::ConfigError;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub reviews: ReviewsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Employee directory paging
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DirectoryConfig {
    pub page_size: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { page_size: 5 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReviewsConfig {
    /// How many reviews a profile shows, newest first
    pub profile_limit: u64,
}

impl Default for ReviewsConfig {
    fn default() -> Self {
        Self { profile_limit: 10 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "freelance-desk".to_string(),
                prefix: "/".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("freelance-desk.db"),
            },
            directory: DirectoryConfig::default(),
            reviews: ReviewsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Environment overrides on top of whatever was loaded
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("DESK_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }

        match std::env::var("DESK_PAGE_SIZE").map(|v| v.parse::<u64>()) {
            Ok(Ok(size)) if size > 0 => self.directory.page_size = size,
            Ok(_) => tracing::warn!("Ignoring invalid DESK_PAGE_SIZE"),
            Err(_) => {}
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.page_size == 0 {
            return Err(ConfigError::InvalidValue("directory.page-size must be positive".to_string()));
        }
        if self.reviews.profile_limit == 0 {
            return Err(ConfigError::InvalidValue("reviews.profile-limit must be positive".to_string()));
        }
        if self.bot.prefix.is_empty() {
            return Err(ConfigError::InvalidValue("bot.prefix must not be empty".to_string()));
        }
        Ok(())
    }
}
