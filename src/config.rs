use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Endpoint the demo scripts were written against.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8001/v1";

/// The local server does not check the bearer token, but the protocol
/// envelope requires one.
pub const DEFAULT_API_KEY: &str = "not-needed";

pub const DEFAULT_MODEL: &str = "TinyLlama/TinyLlama-1.1B-Chat-v1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub default_system_message: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            model: DEFAULT_MODEL.to_string(),
            default_system_message: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] xdg::BaseDirectoriesError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error deserializing TOML: {0}")]
    Read(#[from] toml::de::Error),
}

impl Config {
    /// Read the config file, falling back to defaults when none exists.
    pub fn read() -> Result<Self, Error> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let toml = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&toml)?)
    }

    fn path() -> Result<PathBuf, Error> {
        Ok(xdg::BaseDirectories::with_prefix("chat-client")?.place_config_file("config.toml")?)
    }
}
