//! Configuration for the VBridge server.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vbridge_core::{Quality, ServerConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerFileConfig {
    pub network: NetworkConfig,
    pub capture: CaptureConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    /// Identity to access level, consulted for level-1 logins.
    pub acl: BTreeMap<String, u8>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to accept viewers on.
    pub listen: String,
    /// Longest wait between two passes over the connections.
    pub poll_interval_ms: u64,
}

/// Screen capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum time between two grabs.
    pub grab_interval_ms: u64,
    /// Colour depth a changed tile starts at.
    pub quality_min: u8,
    /// Colour depth refinement stops at.
    pub quality_max: u8,
    /// Size of the synthetic test-pattern screen.
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a previous master's input blocks a takeover.
    pub master_grace_ms: u64,
    /// Revoke all access after this long without activity; 0 disables.
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub users: Vec<UserEntry>,
}

/// One password login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    pub password: String,
    /// 2 for full control, 1 to defer to the ACL.
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".into(),
            poll_interval_ms: 10,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            grab_interval_ms: 30,
            quality_min: 3,
            quality_max: 5,
            width: 640,
            height: 480,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            master_grace_ms: 200,
            idle_timeout_secs: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerFileConfig {
    /// Load configuration from a TOML file, falling back to defaults.
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

    /// Convert into the core server settings.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            grab_interval: Duration::from_millis(self.capture.grab_interval_ms.max(1)),
            master_grace: Duration::from_millis(self.session.master_grace_ms),
            idle_timeout: (self.session.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.session.idle_timeout_secs)),
            quality: Quality::new(self.capture.quality_min, self.capture.quality_max),
        }
    }

    /// Test-pattern size, at least one tile each way.
    pub fn screen_size(&self) -> (u32, u32) {
        (
            u32::from(self.capture.width.max(8)),
            u32::from(self.capture.height.max(8)),
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let mut cfg = ServerFileConfig::default();
        cfg.auth.users.push(UserEntry {
            name: "alice".into(),
            password: "secret".into(),
            level: 2,
        });
        cfg.acl.insert("bob".into(), 1);
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("listen"));
        assert!(text.contains("master_grace_ms"));

        let parsed: ServerFileConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: ServerFileConfig = toml::from_str(
            r#"
            [network]
            listen = "127.0.0.1:6000"

            [acl]
            carol = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.network.listen, "127.0.0.1:6000");
        assert_eq!(cfg.network.poll_interval_ms, 10);
        assert_eq!(cfg.capture, CaptureConfig::default());
        assert_eq!(cfg.acl.get("carol"), Some(&2));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = ServerFileConfig::load(Path::new("/nonexistent/vbridge-server.toml"));
        assert_eq!(cfg, ServerFileConfig::default());
    }

    #[test]
    fn to_server_config_clamps() {
        let mut cfg = ServerFileConfig::default();
        cfg.capture.grab_interval_ms = 0;
        cfg.capture.quality_min = 0;
        cfg.capture.quality_max = 12;
        cfg.capture.width = 2;
        let core = cfg.to_server_config();
        assert_eq!(core.grab_interval, Duration::from_millis(1));
        assert_eq!(core.quality, Quality::new(1, 8));
        assert_eq!(core.idle_timeout, None);
        assert_eq!(cfg.screen_size(), (8, 480));

        cfg.session.idle_timeout_secs = 60;
        assert_eq!(cfg.to_server_config().idle_timeout, Some(Duration::from_secs(60)));
    }
}
