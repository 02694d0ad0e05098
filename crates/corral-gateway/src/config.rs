//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP gateway.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Prefix under which the API routes are mounted.
    #[serde(default = "GatewayConfig::default_api_prefix")]
    pub api_prefix: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Agent binary served to hosts that need to update.
    #[serde(default)]
    pub agent_binary: Option<PathBuf>,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_api_prefix() -> String {
        "/api/v1".to_string()
    }

    const fn default_max_body() -> usize {
        16 * 1024 * 1024
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            api_prefix: Self::default_api_prefix(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            agent_binary: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.api_prefix, "/api/v1");
        assert_eq!(config.max_body_bytes, 16 * 1024 * 1024);
        assert!(config.agent_binary.is_none());
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"agent_binary": "/usr/lib/corral/corral-agent"}"#).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.agent_binary.as_deref(),
            Some(std::path::Path::new("/usr/lib/corral/corral-agent"))
        );
        assert!(config.cors_origins.is_empty());
    }
}
