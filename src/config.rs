use anyhow::{anyhow, Context, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub history_file: Option<PathBuf>,
    #[serde(default)]
    pub use_mock: bool,
    /// Mock oracle reply, only read from the environment.
    #[serde(skip)]
    pub mock_reply: Option<String>,
    /// When set, commands run in their own process group so a timeout
    /// also kills anything they spawned.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    #[serde(default)]
    pub selection_timeout_secs: Option<u64>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: default_model(),
            api_base: default_api_base(),
            shell: default_shell(),
            history_file: None,
            use_mock: false,
            mock_reply: None,
            command_timeout_secs: None,
            selection_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from file, environment variables, or create default
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_path(&Self::get_config_path()?)? {
            Some(config) => config,
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };

        // Environment variables override config file
        if let Ok(api_key) = std::env::var("GEMINI_API_KEY") {
            config.gemini_api_key = Some(api_key);
        }

        if std::env::var("REDO_USE_MOCK").is_ok() {
            config.use_mock = true;
        }

        if let Ok(reply) = std::env::var("REDO_MOCK_REPLY") {
            config.mock_reply = Some(reply);
        }

        Ok(config)
    }

    /// Reads a config file. An absent file is `Ok(None)`; a file that
    /// cannot be read or parsed is an error.
    fn load_from_path(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded config from: {}", path.display());
        Ok(Some(config))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.toml"))
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let home = home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(".redo"))
    }

    /// Set API key and save config
    pub fn set_api_key(&mut self, api_key: String) -> Result<()> {
        self.gemini_api_key = Some(api_key);
        self.save()?;
        info!("API key saved to config file");
        Ok(())
    }

    pub fn get_api_key(&self) -> Option<&str> {
        self.gemini_api_key.as_deref()
    }

    pub fn is_mock_mode(&self) -> bool {
        self.use_mock
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn selection_timeout(&self) -> Option<Duration> {
        self.selection_timeout_secs.map(Duration::from_secs)
    }

    pub fn show_config_info() -> Result<()> {
        let config_path = Self::get_config_path()?;
        println!("Configuration file: {}", config_path.display());

        if let Some(config) = Self::load_from_path(&config_path)? {
            println!("Status: Found");
            println!("API Key: {}", if config.gemini_api_key.is_some() { "Set" } else { "Not set" });
            println!("Model: {}", config.model);
            println!("Shell: {}", config.shell);
            println!("Mock mode: {}", config.use_mock);
        } else {
            println!("Status: Not found (using defaults)");
        }

        println!("\nTo set API key:");
        println!("  redo --set-api-key <your-key>");
        println!("\nOr set environment variable:");
        println!("  export GEMINI_API_KEY=<your-key>");

        Ok(())
    }
}
