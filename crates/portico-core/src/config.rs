//! Configuration loading.
//!
//! Sources, lowest priority first:
//! 1. built-in defaults ([`defaults`])
//! 2. a TOML file (explicit path, or `portico.toml` in the working directory)
//! 3. environment variables ([`env_vars`])
//!
//! The ticket signing secret is only ever read from the environment.

use crate::origin::{Origin, OriginError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default values.
pub mod defaults {
    /// Ticket validity window.
    pub const TICKET_TTL_SECS: i64 = 60;
    /// Tolerated clock difference between issuer and validator.
    pub const CLOCK_SKEW_SECS: i64 = 0;
    /// Maximum number of live consumed-ticket ids remembered by a validator.
    pub const REPLAY_CAPACITY: usize = 10_000;
    /// How long the plugin SDK waits for `SESSION_INIT`.
    pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
    /// Per-call deadline for action requests.
    pub const ACTION_TIMEOUT_MS: u64 = 30_000;
    pub const BIND: &str = "127.0.0.1:9480";
    pub const HOST_ORIGIN: &str = "http://localhost:9480";
    pub const CONFIG_FILE: &str = "portico.toml";
    /// Query parameter carrying the ticket on plugin URLs.
    pub const TICKET_QUERY_PARAM: &str = "ticket";
}

/// Environment variable names and typed accessors.
pub mod env_vars {
    pub const CONFIG: &str = "PORTICO_CONFIG";
    pub const TICKET_SECRET: &str = "PORTICO_TICKET_SECRET";
    pub const TICKET_TTL_SECS: &str = "PORTICO_TICKET_TTL_SECS";
    pub const CLOCK_SKEW_SECS: &str = "PORTICO_CLOCK_SKEW_SECS";
    pub const HANDSHAKE_TIMEOUT_MS: &str = "PORTICO_HANDSHAKE_TIMEOUT_MS";
    pub const ACTION_TIMEOUT_MS: &str = "PORTICO_ACTION_TIMEOUT_MS";
    pub const BIND: &str = "PORTICO_BIND";
    pub const LOG_JSON: &str = "PORTICO_LOG_JSON";

    fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
        std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
    }

    pub fn ticket_secret() -> Option<String> {
        std::env::var(TICKET_SECRET).ok().filter(|s| !s.is_empty())
    }

    pub fn ticket_ttl_secs() -> Option<i64> {
        parsed(TICKET_TTL_SECS)
    }

    pub fn clock_skew_secs() -> Option<i64> {
        parsed(CLOCK_SKEW_SECS)
    }

    pub fn handshake_timeout_ms() -> Option<u64> {
        parsed(HANDSHAKE_TIMEOUT_MS)
    }

    pub fn action_timeout_ms() -> Option<u64> {
        parsed(ACTION_TIMEOUT_MS)
    }

    pub fn bind() -> Option<String> {
        std::env::var(BIND).ok().filter(|s| !s.is_empty())
    }

    /// Whether logs should be emitted as JSON (container deployments).
    pub fn log_json() -> bool {
        parsed(LOG_JSON).unwrap_or(false)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: defaults::BIND.to_string(),
        }
    }
}

/// Ticket issuance and validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketSettings {
    pub ttl_secs: i64,
    pub clock_skew_secs: i64,
    pub replay_capacity: usize,
    /// Reject a second presentation of the same ticket.
    pub single_use: bool,
}

impl Default for TicketSettings {
    fn default() -> Self {
        Self {
            ttl_secs: defaults::TICKET_TTL_SECS,
            clock_skew_secs: defaults::CLOCK_SKEW_SECS,
            replay_capacity: defaults::REPLAY_CAPACITY,
            single_use: true,
        }
    }
}

/// Plugin SDK deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkSettings {
    pub handshake_timeout_ms: u64,
    pub action_timeout_ms: u64,
}

impl Default for SdkSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: defaults::HANDSHAKE_TIMEOUT_MS,
            action_timeout_ms: defaults::ACTION_TIMEOUT_MS,
        }
    }
}

impl SdkSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

/// Host page settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Origin of the host application page.
    pub origin: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            origin: defaults::HOST_ORIGIN.to_string(),
        }
    }
}

/// Static credential directory and entitlements for development deployments.
///
/// Production deployments plug their own user directory in through the
/// ticket crate's verifier traits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// bearer token -> user id
    pub tokens: BTreeMap<String, String>,
    /// user id -> entitled plugin ids
    pub entitlements: BTreeMap<String, Vec<String>>,
}

/// One registered plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    /// URL the frame is pointed at (without ticket).
    pub base_url: String,
    /// Directory served behind the ticket gate, if this server hosts the plugin.
    #[serde(default)]
    pub asset_dir: Option<PathBuf>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl PluginEntry {
    pub fn origin(&self) -> Result<Origin, OriginError> {
        Origin::parse(&self.base_url)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PorticoConfig {
    pub server: ServerSettings,
    pub tickets: TicketSettings,
    pub sdk: SdkSettings,
    pub host: HostSettings,
    pub auth: AuthSettings,
    pub plugins: BTreeMap<String, PluginEntry>,
}

impl PorticoConfig {
    /// Load from `path`, or from `portico.toml` when present, then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(env_vars::CONFIG).ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                info!(category = "config", path = %path.display(), "Loading config file");
                Self::from_file(&path)?
            }
            None if Path::new(defaults::CONFIG_FILE).exists() => {
                info!(category = "config", "Loading config from: {}", defaults::CONFIG_FILE);
                Self::from_file(Path::new(defaults::CONFIG_FILE))?
            }
            None => {
                info!(category = "config", "No config file, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override file values with any `PORTICO_*` variables that are set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(ttl) = env_vars::ticket_ttl_secs() {
            self.tickets.ttl_secs = ttl;
        }
        if let Some(skew) = env_vars::clock_skew_secs() {
            self.tickets.clock_skew_secs = skew;
        }
        if let Some(ms) = env_vars::handshake_timeout_ms() {
            self.sdk.handshake_timeout_ms = ms;
        }
        if let Some(ms) = env_vars::action_timeout_ms() {
            self.sdk.action_timeout_ms = ms;
        }
        if let Some(bind) = env_vars::bind() {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tickets.ttl_secs <= 0 {
            return Err(ConfigError::invalid("tickets.ttl_secs", "must be positive"));
        }
        if self.tickets.clock_skew_secs < 0 {
            return Err(ConfigError::invalid(
                "tickets.clock_skew_secs",
                "must not be negative",
            ));
        }
        if self.tickets.clock_skew_secs >= self.tickets.ttl_secs {
            warn!(
                category = "config",
                skew = self.tickets.clock_skew_secs,
                ttl = self.tickets.ttl_secs,
                "Clock skew tolerance is not smaller than the ticket TTL"
            );
        }
        if self.tickets.replay_capacity == 0 && self.tickets.single_use {
            return Err(ConfigError::invalid(
                "tickets.replay_capacity",
                "must be positive when single_use is enabled",
            ));
        }
        if self.sdk.handshake_timeout_ms == 0 {
            return Err(ConfigError::invalid("sdk.handshake_timeout_ms", "must be positive"));
        }
        if self.sdk.action_timeout_ms == 0 {
            return Err(ConfigError::invalid("sdk.action_timeout_ms", "must be positive"));
        }
        Origin::parse(&self.host.origin)
            .map_err(|e| ConfigError::invalid("host.origin", e.to_string()))?;

        for (id, entry) in &self.plugins {
            if id.trim().is_empty() {
                return Err(ConfigError::invalid("plugins", "empty plugin id"));
            }
            entry
                .origin()
                .map_err(|e| ConfigError::invalid(format!("plugins.{}.base_url", id), e.to_string()))?;
        }
        Ok(())
    }

    pub fn host_origin(&self) -> Result<Origin, OriginError> {
        Origin::parse(&self.host.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
bind = "0.0.0.0:8080"

[tickets]
ttl_secs = 90
clock_skew_secs = 5

[host]
origin = "https://app.example.com"

[auth.tokens]
"dev-token-1" = "u1"

[auth.entitlements]
u1 = ["crm"]

[plugins.crm]
base_url = "https://crm.plugins.example.com/index.html"
asset_dir = "plugins/crm"
"#;

    #[test]
    fn test_parse_sample() {
        let config = PorticoConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.tickets.ttl_secs, 90);
        assert_eq!(config.tickets.clock_skew_secs, 5);
        assert!(config.tickets.single_use);
        assert_eq!(config.sdk.handshake_timeout_ms, defaults::HANDSHAKE_TIMEOUT_MS);
        assert_eq!(config.auth.tokens.get("dev-token-1").map(String::as_str), Some("u1"));

        let crm = &config.plugins["crm"];
        assert_eq!(crm.origin().unwrap().as_str(), "https://crm.plugins.example.com");
        assert_eq!(crm.asset_dir.as_deref(), Some(Path::new("plugins/crm")));
    }

    #[test]
    fn test_defaults() {
        let config = PorticoConfig::default();
        assert_eq!(config.tickets.ttl_secs, 60);
        assert_eq!(config.sdk.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.sdk.action_timeout(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PorticoConfig::default();
        config.tickets.ttl_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let bad_plugin = r#"
[plugins.x]
base_url = "not a url"
"#;
        let config = PorticoConfig::from_toml_str(bad_plugin).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("plugins.x.base_url"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portico.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = PorticoConfig::from_file(&path).unwrap();
        assert_eq!(config.host_origin().unwrap().as_str(), "https://app.example.com");

        let missing = PorticoConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
