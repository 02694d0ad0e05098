//! Agent configuration file.
//!
//! The agent reads a TOML file, written by `corral-agent register`:
//!
//! ```toml
//! server_url = "http://corral.example.com:8080"
//! host_name = "host-1"
//! api_key = "..."
//! version = "0.1.0"
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use corral_core::Name;

use crate::error::{AgentError, Result};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/corral/agent.toml";

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the control API, without the `/api/v1` prefix.
    pub server_url: String,
    /// This host's record name.
    pub host_name: Name,
    /// Plaintext host API key.
    pub api_key: String,
    /// Installed agent version, compared against the server's `client_version`.
    pub version: String,

    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "AgentConfig::default_log_level")]
    pub log_level: String,

    /// Directory holding cached facts, log offsets and IPs.
    #[serde(default = "AgentConfig::default_state_dir")]
    pub state_dir: PathBuf,

    /// Seconds between cycles in daemon mode.
    #[serde(default = "AgentConfig::default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Timeout for each control API call.
    #[serde(default = "AgentConfig::default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Flush a log batch once it holds this many bytes.
    #[serde(default = "AgentConfig::default_log_flush_bytes")]
    pub log_flush_bytes: usize,

    /// Flush a log batch once it is this many seconds old.
    #[serde(default = "AgentConfig::default_log_flush_secs")]
    pub log_flush_secs: u64,
}

impl AgentConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_state_dir() -> PathBuf {
        PathBuf::from("/var/lib/corral-agent")
    }

    const fn default_poll_interval() -> u64 {
        60
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_log_flush_bytes() -> usize {
        8192
    }

    const fn default_log_flush_secs() -> u64 {
        20
    }

    /// A configuration with defaults for everything but the identity.
    #[must_use]
    pub fn new(server_url: String, host_name: Name, api_key: String, version: String) -> Self {
        Self {
            server_url,
            host_name,
            api_key,
            version,
            log_level: Self::default_log_level(),
            state_dir: Self::default_state_dir(),
            poll_interval_secs: Self::default_poll_interval(),
            request_timeout_secs: Self::default_request_timeout(),
            log_flush_bytes: Self::default_log_flush_bytes(),
            log_flush_secs: Self::default_log_flush_secs(),
        }
    }

    /// Load the configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("read {}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| AgentError::Config(format!("parse {}: {e}", path.display())))
    }

    /// Atomically write the configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Config` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self).map_err(|e| AgentError::Config(e.to_string()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| AgentError::Config(format!("create {}: {e}", dir.display())))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AgentError::Config(e.to_string()))?;
        tmp.write_all(raw.as_bytes())
            .map_err(|e| AgentError::Config(e.to_string()))?;
        tmp.persist(path)
            .map_err(|e| AgentError::Config(format!("write {}: {}", path.display(), e.error)))?;
        Ok(())
    }

    /// Interval between daemon cycles.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Timeout for control API calls.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Maximum age of an unflushed log batch.
    #[must_use]
    pub const fn log_flush_interval(&self) -> Duration {
        Duration::from_secs(self.log_flush_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn minimal_file_fills_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            server_url = "http://corral:8080"
            host_name = "host-1"
            api_key = "K"
            version = "0.1.0"
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_flush_bytes, 8192);
        assert_eq!(config.log_flush_interval(), Duration::from_secs(20));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn rejects_invalid_host_name() {
        let result: std::result::Result<AgentConfig, _> = toml::from_str(
            r#"
            server_url = "http://corral:8080"
            host_name = "../etc"
            api_key = "K"
            version = "0.1.0"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/agent.toml");
        let mut config = AgentConfig::new(
            "http://corral:8080".into(),
            Name::parse("host-1").unwrap(),
            "K".into(),
            "0.1.0".into(),
        );
        config.poll_interval_secs = 5;
        config.save(&path).unwrap();

        assert_eq!(AgentConfig::load(&path).unwrap(), config);
        assert!(matches!(
            AgentConfig::load(&dir.path().join("missing.toml")),
            Err(AgentError::Config(_))
        ));
    }
}
