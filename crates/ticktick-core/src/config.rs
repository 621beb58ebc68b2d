//! Configuration management for ticktick-tools.
//!
//! Handles loading and saving configuration from TOML files.
//! Config files are stored in platform-specific locations:
//!
//! - **macOS/Linux**: `~/.config/ticktick-tools/config.toml`
//! - **Windows**: `%APPDATA%\ticktick-tools\config.toml`
//!
//! Environment variables override file values at load time, so a token
//! can be injected without touching the config file.

use crate::{Error, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config directory name.
const CONFIG_DIR_NAME: &str = "ticktick-tools";

// =============================================================================
// Configuration structures
// =============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// API endpoint configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// OAuth credentials and tokens
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Display preferences (timezone, week start)
    #[serde(default)]
    pub display: DisplayConfig,
}

/// API endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// TickTick Open API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// OAuth application credentials and the current token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Authorization endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            access_token: None,
            refresh_token: None,
        }
    }
}

/// Display preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Default IANA timezone for tasks without one; `None` means the
    /// system local zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// First day of the week for week-window queries.
    #[serde(default = "default_week_start")]
    pub week_start: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: None,
            week_start: default_week_start(),
        }
    }
}

impl DisplayConfig {
    /// Week start as a chrono weekday, defaulting to Monday on any
    /// unparseable value.
    pub fn week_start_day(&self) -> Weekday {
        self.week_start.parse().unwrap_or(Weekday::Mon)
    }
}

fn default_base_url() -> String {
    "https://api.ticktick.com/open/v1".to_string()
}

fn default_auth_url() -> String {
    "https://ticktick.com/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://ticktick.com/oauth/token".to_string()
}

fn default_week_start() -> String {
    "monday".to_string()
}

// =============================================================================
// Config implementation
// =============================================================================

impl Config {
    /// Get the configuration directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(CONFIG_DIR_NAME))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location.
    ///
    /// Returns a default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns a default config if the file doesn't exist.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!(path = ?path, "Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        debug!(path = ?path, "Loading config");

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        info!(path = ?path, "Config loaded successfully");
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        debug!(path = ?path, "Saving config");

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        info!(path = ?path, "Config saved successfully");
        Ok(())
    }

    /// Overlay environment variables onto the loaded config.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TICKTICK_ACCESS_TOKEN") {
            if !token.is_empty() {
                self.oauth.access_token = Some(token);
            }
        }
        if let Ok(id) = std::env::var("TICKTICK_CLIENT_ID") {
            if !id.is_empty() {
                self.oauth.client_id = Some(id);
            }
        }
        if let Ok(secret) = std::env::var("TICKTICK_CLIENT_SECRET") {
            if !secret.is_empty() {
                self.oauth.client_secret = Some(secret);
            }
        }
        if let Ok(url) = std::env::var("TICKTICK_BASE_URL") {
            if !url.is_empty() {
                self.api.base_url = url;
            }
        }
        if let Ok(tz) = std::env::var("TICKTICK_DISPLAY_TIMEZONE") {
            if !tz.is_empty() {
                self.display.timezone = Some(tz);
            }
        }
    }

    /// Set a configuration value by key path.
    ///
    /// Key format: `section.field` (e.g., `oauth.client_id`, `display.timezone`)
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(Error::Config(format!(
                "Invalid config key '{}'. Expected format: section.field",
                key
            )));
        }

        let (section, field) = (parts[0], parts[1]);

        match section {
            "api" => match field {
                "base_url" | "url" => self.api.base_url = value.to_string(),
                _ => {
                    return Err(Error::Config(format!("Unknown api config field: {}", field)));
                }
            },
            "oauth" => match field {
                "client_id" => self.oauth.client_id = Some(value.to_string()),
                "client_secret" => self.oauth.client_secret = Some(value.to_string()),
                "auth_url" => self.oauth.auth_url = value.to_string(),
                "token_url" => self.oauth.token_url = value.to_string(),
                "access_token" => self.oauth.access_token = Some(value.to_string()),
                "refresh_token" => self.oauth.refresh_token = Some(value.to_string()),
                _ => {
                    return Err(Error::Config(format!(
                        "Unknown oauth config field: {}",
                        field
                    )));
                }
            },
            "display" => match field {
                "timezone" => {
                    // Reject typos at set time; "local" means the system zone.
                    if !value.eq_ignore_ascii_case("local") {
                        crate::timezone::parse_zone(value)?;
                    }
                    self.display.timezone = Some(value.to_string());
                }
                "week_start" => {
                    value.parse::<Weekday>().map_err(|_| {
                        Error::Config(format!(
                            "Invalid week_start '{}'. Use a weekday name like 'monday'",
                            value
                        ))
                    })?;
                    self.display.week_start = value.to_string();
                }
                _ => {
                    return Err(Error::Config(format!(
                        "Unknown display config field: {}",
                        field
                    )));
                }
            },
            _ => {
                return Err(Error::Config(format!("Unknown config section: {}", section)));
            }
        }

        Ok(())
    }

    /// Get a configuration value by key path.
    ///
    /// Key format: `section.field` (e.g., `oauth.client_id`, `display.timezone`)
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(Error::Config(format!(
                "Invalid config key '{}'. Expected format: section.field",
                key
            )));
        }

        let (section, field) = (parts[0], parts[1]);

        match section {
            "api" => match field {
                "base_url" | "url" => Ok(Some(self.api.base_url.clone())),
                _ => Err(Error::Config(format!("Unknown api config field: {}", field))),
            },
            "oauth" => match field {
                "client_id" => Ok(self.oauth.client_id.clone()),
                "client_secret" => Ok(self.oauth.client_secret.clone()),
                "auth_url" => Ok(Some(self.oauth.auth_url.clone())),
                "token_url" => Ok(Some(self.oauth.token_url.clone())),
                "access_token" => Ok(self.oauth.access_token.clone()),
                "refresh_token" => Ok(self.oauth.refresh_token.clone()),
                _ => Err(Error::Config(format!(
                    "Unknown oauth config field: {}",
                    field
                ))),
            },
            "display" => match field {
                "timezone" => Ok(self.display.timezone.clone()),
                "week_start" => Ok(Some(self.display.week_start.clone())),
                _ => Err(Error::Config(format!(
                    "Unknown display config field: {}",
                    field
                ))),
            },
            _ => Err(Error::Config(format!("Unknown config section: {}", section))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
