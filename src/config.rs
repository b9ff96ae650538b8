use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::provider::DEFAULT_ENDPOINT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Messenger auth token. Required to run the bot loop; admin commands
    /// work without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default = "default_provider_endpoint")]
    pub provider_endpoint: String,
    /// Port for the keep-alive endpoint; disabled when unset.
    #[serde(default)]
    pub keepalive_port: Option<u16>,
}

fn default_provider_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Config {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("facebot")
        });

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let config_path = data_dir.join("config.json");
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .context("Failed to read config.json")?;
            match serde_json::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("config.json is invalid ({}), using defaults", e);
                    Self::default_config()
                }
            }
        } else {
            let config = Self::default_config();
            let json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize default config")?;
            std::fs::write(&config_path, json).context("Failed to write config.json")?;
            config
        };
        config.data_dir = data_dir;

        // Environment takes precedence over the file.
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if !token.is_empty() {
                config.bot_token = Some(token);
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            match port.parse() {
                Ok(port) => config.keepalive_port = Some(port),
                Err(_) => warn!("ignoring unparseable PORT value: {}", port),
            }
        }

        Ok(config)
    }

    fn default_config() -> Config {
        Config {
            data_dir: PathBuf::new(),
            bot_token: None,
            provider_endpoint: default_provider_endpoint(),
            keepalive_port: None,
        }
    }

    /// The bot cannot start without an auth token; this is the only fatal
    /// configuration error.
    pub fn require_bot_token(&self) -> Result<&str> {
        self.bot_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| anyhow!("BOT_TOKEN is not set; export it or add bot_token to config.json"))
    }

    pub fn entitlements_file(&self) -> PathBuf {
        self.data_dir.join("entitlements.json")
    }

    /// Where the shell drops the most recent generated face.
    pub fn photo_file(&self) -> PathBuf {
        self.data_dir.join("face.jpg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(Some(dir.path().to_path_buf())).unwrap();

        assert_eq!(config.provider_endpoint, DEFAULT_ENDPOINT);
        assert!(dir.path().join("config.json").exists());
        assert_eq!(config.entitlements_file(), dir.path().join("entitlements.json"));
    }

    #[test]
    fn test_invalid_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "not json at all").unwrap();

        let config = Config::new(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.provider_endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let config = Config {
            data_dir: PathBuf::new(),
            bot_token: None,
            provider_endpoint: default_provider_endpoint(),
            keepalive_port: None,
        };
        assert!(config.require_bot_token().is_err());

        let config = Config {
            bot_token: Some("123:abc".to_string()),
            ..config
        };
        assert_eq!(config.require_bot_token().unwrap(), "123:abc");
    }
}
