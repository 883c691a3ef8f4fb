use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

use crate::errors::{DonnaError, DonnaResult};

const APP_DIR: &str = "donna";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub chat: ChatConfig,
    pub google_calendar: GoogleCalendarConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Timezone used for day spans and for displaying times
    pub timezone: String,
    /// Log level
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model name sent with every completion request
    pub model: String,
    /// API key (optional - falls back to environment variable)
    pub api_key: Option<String>,
    /// OpenAI-compatible API root, without the trailing /chat/completions
    pub base_url: String,
    /// Banner printed when a chat session starts
    pub title: String,
    /// Prompt shown while waiting for input
    pub input_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleCalendarConfig {
    /// OAuth2 client secrets file downloaded from the Google console
    pub client_secrets_path: Option<PathBuf>,
    /// Where the authorized token is persisted
    pub token_path: Option<PathBuf>,
    pub calendar_id: String,
    pub api_base_url: String,
    pub max_results: u32,
    /// Attempts for rate-limited or transient failures (1 disables retries)
    pub max_retries: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            api_key: None, // Falls back to OPENAI_API_KEY environment variable
            base_url: "https://api.openai.com/v1".to_string(),
            title: "GPT Bot".to_string(),
            input_prompt: "What is up?".to_string(),
        }
    }
}

impl Default for GoogleCalendarConfig {
    fn default() -> Self {
        Self {
            client_secrets_path: None,
            token_path: None,
            calendar_id: "primary".to_string(),
            api_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            max_results: 10,
            max_retries: 3,
        }
    }
}

impl Config {
    pub async fn load() -> Result<Config> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path).await
        } else {
            info!("Config file not found, creating default configuration");
            let default_config = Config::default();
            default_config.save().await?;
            Ok(default_config)
        }
    }

    pub async fn load_from(path: &std::path::Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path).await
    }

    pub async fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, content)
            .await
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.toml"))
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR);

        Ok(config_dir)
    }

    pub fn get_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
            .context("Failed to get data directory")?
            .join(APP_DIR);

        Ok(data_dir)
    }

    /// Get API key from config or environment variable
    pub fn get_api_key(&self) -> Option<String> {
        self.chat
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    /// Get timezone as parsed Tz object
    pub fn get_timezone(&self) -> DonnaResult<chrono_tz::Tz> {
        self.general
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| DonnaError::config(format!("Unknown timezone '{}'", self.general.timezone)))
    }

    pub fn client_secrets_path(&self) -> Result<PathBuf> {
        match &self.google_calendar.client_secrets_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::get_config_dir()?.join("client_secret.json")),
        }
    }

    pub fn token_path(&self) -> Result<PathBuf> {
        match &self.google_calendar.token_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::get_data_dir()?.join("token.json")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chat.model, "gpt-3.5-turbo");
        assert_eq!(config.google_calendar.calendar_id, "primary");
        assert_eq!(config.google_calendar.max_results, 10);
        assert_eq!(config.get_timezone().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [general]
            timezone = "Europe/Bucharest"

            [chat]
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();

        assert_eq!(config.get_timezone().unwrap(), chrono_tz::Europe::Bucharest);
        assert_eq!(config.chat.model, "gpt-4o-mini");
        assert_eq!(config.chat.input_prompt, "What is up?");
        assert_eq!(config.google_calendar.max_retries, 3);
    }

    #[test]
    fn test_invalid_timezone() {
        let mut config = Config::default();
        config.general.timezone = "Mars/Olympus".to_string();
        assert!(matches!(config.get_timezone(), Err(DonnaError::Config { .. })));
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.chat.api_key = Some("sk-test".to_string());
        config.save_to(&path).await.unwrap();

        let reloaded = Config::load_from(&path).await.unwrap();
        assert_eq!(reloaded.chat.api_key.as_deref(), Some("sk-test"));
        assert_eq!(reloaded.get_api_key().as_deref(), Some("sk-test"));
    }
}
