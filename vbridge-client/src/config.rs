//! Viewer configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientFileConfig {
    pub network: NetworkConfig,
    pub auth: AuthConfig,
    pub viewer: ViewerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server address (IP:port).
    pub server: String,
    /// Connection timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Password login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Frames to decode before disconnecting.
    pub frames: u64,
    /// Longest wait on the socket between two polls of the connection.
    pub poll_interval_ms: u64,
    /// Requested depth bounds; 0 keeps the server's choice.
    pub quality_min: u8,
    pub quality_max: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:5000".into(),
            timeout_ms: 5000,
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            frames: 10,
            poll_interval_ms: 5,
            quality_min: 0,
            quality_max: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientFileConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.network.timeout_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.viewer.poll_interval_ms.max(1))
    }
}

impl ViewerConfig {
    /// Depth bounds to request, when both are set.
    pub fn quality(&self) -> Option<(u8, u8)> {
        (self.quality_min > 0 && self.quality_max > 0).then_some((self.quality_min, self.quality_max))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ClientFileConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("server"));
        assert!(text.contains("frames"));
    }

    #[test]
    fn roundtrip_config() {
        let mut cfg = ClientFileConfig::default();
        cfg.auth.name = "ann".into();
        cfg.viewer.quality_min = 2;
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ClientFileConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.network.server, "127.0.0.1:5000");
    }

    #[test]
    fn quality_needs_both_bounds() {
        let mut viewer = ViewerConfig::default();
        assert_eq!(viewer.quality(), None);
        viewer.quality_min = 2;
        assert_eq!(viewer.quality(), None);
        viewer.quality_max = 6;
        assert_eq!(viewer.quality(), Some((2, 6)));
    }

    #[test]
    fn intervals_are_never_zero() {
        let mut cfg = ClientFileConfig::default();
        cfg.viewer.poll_interval_ms = 0;
        cfg.network.timeout_ms = 0;
        assert_eq!(cfg.poll_interval(), Duration::from_millis(1));
        assert_eq!(cfg.timeout(), Duration::from_millis(1));
    }
}
