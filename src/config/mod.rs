//! Configuration and session storage

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Page size for the initial history load.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Silence after the last keystroke before "stop typing" is sent.
pub const DEFAULT_TYPING_TIMEOUT_MS: u64 = 3000;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the messaging REST API (e.g. https://api.example.org/api)
    pub api_url: Option<String>,
    /// Base URL of the realtime socket server
    pub socket_url: Option<String>,
    /// Session token issued by the platform
    pub token: Option<String>,
    /// Current user id
    pub user_id: Option<String>,
    /// Display name sent with typing signals
    pub user_name: Option<String>,
    /// Arabic display name sent with typing signals
    pub user_name_ar: Option<String>,
    /// Messages fetched when a conversation is opened
    pub page_size: usize,
    /// Outbound typing debounce in milliseconds
    pub typing_timeout_ms: u64,
    /// Retire remote typing indicators after this long without a stop event.
    /// Unset keeps them until the stop event arrives.
    pub remote_typing_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            socket_url: None,
            token: None,
            user_id: None,
            user_name: None,
            user_name_ar: None,
            page_size: DEFAULT_PAGE_SIZE,
            typing_timeout_ms: DEFAULT_TYPING_TIMEOUT_MS,
            remote_typing_timeout_ms: None,
        }
    }
}

/// Everything needed to talk to the backend as the current user.
#[derive(Debug, Clone)]
pub struct Session {
    pub api_url: String,
    pub socket_url: String,
    pub token: String,
    pub user_id: String,
    pub user_name: String,
    pub user_name_ar: Option<String>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "club-chat", "club-chat")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Directory for runtime files such as the TUI log.
    pub fn data_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "club-chat", "club-chat")
            .context("Could not determine data directory")?;
        let dir = proj_dirs.data_dir().to_path_buf();
        fs::create_dir_all(&dir).context("Failed to create data directory")?;
        Ok(dir)
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains the token)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Resolve the session, failing with guidance when anything is missing.
    pub fn require_session(&self) -> Result<Session> {
        let hint = "Run 'club-chat configure' first.";
        let api_url = self
            .api_url
            .clone()
            .with_context(|| format!("No API URL configured. {}", hint))?;
        let socket_url = self.socket_url.clone().unwrap_or_else(|| api_origin(&api_url));
        let token = self
            .token
            .clone()
            .with_context(|| format!("No session token configured. {}", hint))?;
        let user_id = self
            .user_id
            .clone()
            .with_context(|| format!("No user id configured. {}", hint))?;

        Ok(Session {
            api_url: api_url.trim_end_matches('/').to_string(),
            socket_url: socket_url.trim_end_matches('/').to_string(),
            token,
            user_name: self.user_name.clone().unwrap_or_else(|| user_id.clone()),
            user_name_ar: self.user_name_ar.clone(),
            user_id,
        })
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn remote_typing_timeout(&self) -> Option<Duration> {
        self.remote_typing_timeout_ms.map(Duration::from_millis)
    }
}

/// Scheme and host of the API URL; the socket server usually shares it.
fn api_origin(api_url: &str) -> String {
    match url::Url::parse(api_url) {
        Ok(parsed) => parsed.origin().ascii_serialization(),
        Err(_) => api_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = Config::from_toml("api_url = \"https://api.example.org/api\"\n").unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.typing_timeout(), Duration::from_millis(3000));
        assert!(config.remote_typing_timeout().is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config {
            api_url: Some("https://api.example.org/api".to_string()),
            token: Some("tok".to_string()),
            user_id: Some("u1".to_string()),
            remote_typing_timeout_ms: Some(10_000),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.user_id.as_deref(), Some("u1"));
        assert_eq!(back.remote_typing_timeout_ms, Some(10_000));
    }

    #[test]
    fn test_require_session_reports_missing_token() {
        let config = Config {
            api_url: Some("https://api.example.org/api".to_string()),
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let err = assert_err!(config.require_session());
        assert!(format!("{:#}", err).contains("token"));
    }

    #[test]
    fn test_socket_url_defaults_to_api_origin() {
        let config = Config {
            api_url: Some("https://api.example.org/api/".to_string()),
            token: Some("tok".to_string()),
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let session = assert_ok!(config.require_session());
        assert_eq!(session.api_url, "https://api.example.org/api");
        assert_eq!(session.socket_url, "https://api.example.org");
        assert_eq!(session.user_name, "u1");
    }
}
