//! Node configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full configuration for a Splitter node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SplitterConfig {
    /// Transport settings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Peer session settings.
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// TCP listen port. 0 picks a free port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address other peers should dial, when it differs from the bound one.
    #[serde(default)]
    pub advertise_addr: Option<String>,
    /// Base URL for invite links. Without it only invite codes are printed.
    #[serde(default)]
    pub invite_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Delay before recreating a failed identity, in seconds.
    #[serde(default = "default_identity_retry_delay_secs")]
    pub identity_retry_delay_secs: u64,
    /// How long a join waits for the host before reporting a timeout, in seconds.
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    7400
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./splitter-data")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_identity_retry_delay_secs() -> u64 {
    3
}
fn default_join_timeout_secs() -> u64 {
    10
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
            advertise_addr: None,
            invite_base_url: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity_retry_delay_secs: default_identity_retry_delay_secs(),
            join_timeout_secs: default_join_timeout_secs(),
        }
    }
}

impl SessionConfig {
    pub fn identity_retry_delay(&self) -> Duration {
        Duration::from_secs(self.identity_retry_delay_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

impl SplitterConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: SplitterConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// The `host:port` the TCP transport binds.
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.network.listen_addr, self.network.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SplitterConfig::default();
        assert_eq!(config.network.port, 7400);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.session.identity_retry_delay(), Duration::from_secs(3));
        assert!(config.network.advertise_addr.is_none());
    }

    #[test]
    fn test_listen_socket() {
        let config = SplitterConfig::default();
        assert_eq!(config.listen_socket(), "0.0.0.0:7400");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = SplitterConfig::default();
        config.network.invite_base_url = Some("https://splitter.example/".into());
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let decoded: SplitterConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(decoded.network.port, config.network.port);
        assert_eq!(decoded.network.invite_base_url, config.network.invite_base_url);
        assert_eq!(decoded.session.join_timeout_secs, 10);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let config = SplitterConfig::load(Path::new("/nonexistent/splitter.toml")).unwrap();
        assert_eq!(config.network.port, 7400);
    }

    #[test]
    fn test_config_from_toml_partial() {
        let toml_str = r#"
[network]
port = 7500

[session]
identity_retry_delay_secs = 1
"#;
        let config: SplitterConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.network.port, 7500);
        assert_eq!(config.session.identity_retry_delay(), Duration::from_secs(1));
        // Defaults for unspecified
        assert_eq!(config.session.join_timeout_secs, 10);
        assert_eq!(config.logging.format, "text");
    }
}
