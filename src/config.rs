// Client configuration (~/.config/todo-client/config.yaml)

use crate::session::TokenLifetimes;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding `api_base`
pub const API_BASE_ENV: &str = "TODO_API_BASE";

const APP_DIR: &str = "todo-client";
const TOKENS_DB: &str = "tokens.db";

/// Settings for the backend connection and local token persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Backend origin, optionally with a path prefix
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Lifetime of a stored access token
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,

    /// Lifetime of a stored refresh token
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,

    /// Directory holding `tokens.db`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_access_ttl() -> u64 {
    60 * 60
}

fn default_refresh_ttl() -> u64 {
    180 * 24 * 60 * 60
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            data_dir: default_data_dir(),
        }
    }
}

impl ClientConfig {
    /// Default config file location, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
    }

    /// Load from `path` (or the default location), then apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_base) = lookup(API_BASE_ENV).filter(|v| !v.trim().is_empty()) {
            debug!(api_base = %api_base, "api_base overridden from environment");
            self.api_base = api_base;
        }
    }

    pub fn token_lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access: Duration::from_secs(self.access_token_ttl_secs),
            refresh: Duration::from_secs(self.refresh_token_ttl_secs),
        }
    }

    pub fn tokens_path(&self) -> PathBuf {
        self.data_dir.join(TOKENS_DB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base, "http://localhost:8000");
        assert_eq!(config.access_token_ttl_secs, 3600);
        assert_eq!(config.refresh_token_ttl_secs, 15_552_000);
        assert!(config.tokens_path().ends_with("todo-client/tokens.db"));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = ClientConfig::from_yaml("api_base: https://todo.example.com/api\n").unwrap();
        assert_eq!(config.api_base, "https://todo.example.com/api");
        assert_eq!(config.access_token_ttl_secs, 3600);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(ClientConfig::from_yaml("api_bsae: http://x\n").is_err());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(ClientConfig::from_yaml("   \n").unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            format!("access_token_ttl_secs: 60\ndata_dir: {}\n", dir.path().display()),
        )
        .unwrap();

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.access_token_ttl_secs, 60);
        assert_eq!(config.tokens_path(), dir.path().join("tokens.db"));
        assert_eq!(config.token_lifetimes().access, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ClientConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config.access_token_ttl_secs, 3600);
    }

    #[test]
    fn test_env_override() {
        let mut config = ClientConfig::default();
        config.apply_overrides(|key| (key == API_BASE_ENV).then(|| "http://10.0.0.2:9000".to_string()));
        assert_eq!(config.api_base, "http://10.0.0.2:9000");

        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.api_base, "http://10.0.0.2:9000");
    }
}
