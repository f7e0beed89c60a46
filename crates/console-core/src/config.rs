//! Console configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub tree: TreeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConsoleConfig {
    /// Load config from a file. `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else {
            Self::from_toml(&content)?
        };
        Ok(config)
    }

    /// Parse TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `CONSOLE_BASE_URL` / `CONSOLE_TOKEN` overrides.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("CONSOLE_BASE_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
        if let Ok(token) = std::env::var("CONSOLE_TOKEN") {
            if !token.trim().is_empty() {
                self.auth.access_token = Some(token);
            }
        }
        self
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.api.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.auth.max_refresh_cycles == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.max_refresh_cycles",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.tree.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tree.page_size",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Backing service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Headers sent with every call.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            default_headers: BTreeMap::new(),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in milliseconds. `0` disables automatic eviction.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

fn default_ttl_ms() -> u64 {
    60_000
}

impl CacheConfig {
    /// `None` means entries are never evicted by timer.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_ms > 0).then(|| Duration::from_millis(self.ttl_ms))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
        }
    }
}

/// Credential and error-code settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// Body error codes that mean the credential expired.
    #[serde(default = "default_auth_expired_codes")]
    pub auth_expired_codes: Vec<String>,

    /// Body error codes that mean the service is unavailable.
    #[serde(default = "default_unavailable_codes")]
    pub unavailable_codes: Vec<String>,

    /// Refresh cycles a single call may go through before giving up.
    #[serde(default = "default_max_refresh_cycles")]
    pub max_refresh_cycles: u32,
}

fn default_refresh_path() -> String {
    "/api/auth/refresh".to_string()
}

fn default_auth_expired_codes() -> Vec<String> {
    vec!["TOKEN_EXPIRED".to_string(), "TOKEN_INVALID".to_string()]
}

fn default_unavailable_codes() -> Vec<String> {
    vec!["SERVICE_UNAVAILABLE".to_string()]
}

fn default_max_refresh_cycles() -> u32 {
    2
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            refresh_path: default_refresh_path(),
            auth_expired_codes: default_auth_expired_codes(),
            unavailable_codes: default_unavailable_codes(),
            max_refresh_cycles: default_max_refresh_cycles(),
        }
    }
}

/// Resource tree settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
}

fn default_page_size() -> u64 {
    50
}

fn default_search_debounce_ms() -> u64 {
    300
}

impl TreeConfig {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            search_debounce_ms: default_search_debounce_ms(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Generate a default console.toml config file.
pub fn generate_default_config(base_url: &str) -> String {
    format!(
        r#"# Admin console client configuration

[api]
base_url = "{base_url}"
timeout_ms = 30000

[cache]
# 0 disables automatic eviction
ttl_ms = 60000

[auth]
# access_token = "..."
# refresh_token = "..."
refresh_path = "/api/auth/refresh"
auth_expired_codes = ["TOKEN_EXPIRED", "TOKEN_INVALID"]
unavailable_codes = ["SERVICE_UNAVAILABLE"]
max_refresh_cycles = 2

[tree]
page_size = 50
search_debounce_ms = 300

[logging]
level = "info"
format = "human"
"#,
        base_url = base_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ConsoleConfig::from_toml("").unwrap();
        assert_eq!(config.api.timeout_ms, 30_000);
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.auth.max_refresh_cycles, 2);
        assert_eq!(config.tree.page_size, 50);
        assert_eq!(config.logging.format, LogFormat::Human);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_config_round_trips() {
        let text = generate_default_config("https://console.example");
        let config = ConsoleConfig::from_toml(&text).unwrap();
        assert_eq!(config.api.base_url, "https://console.example");
        assert_eq!(config.auth.refresh_path, "/api/auth/refresh");
    }

    #[test]
    fn test_zero_ttl_disables_eviction() {
        let config = ConsoleConfig::from_toml("[cache]\nttl_ms = 0\n").unwrap();
        assert_eq!(config.cache.ttl(), None);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = ConsoleConfig::from_toml("[tree]\npage_size = 0\n").unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "tree.page_size"),
            other => panic!("expected invalid page size, got {:?}", other),
        }
    }

    #[test]
    fn test_load_json_by_extension() {
        let dir = std::env::temp_dir().join(format!("console-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("console.json");
        std::fs::write(&path, r#"{"api": {"base_url": "https://json.example"}}"#).unwrap();

        let config = ConsoleConfig::load(&path).unwrap();
        assert_eq!(config.api.base_url, "https://json.example");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
