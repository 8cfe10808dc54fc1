//! Configuration resolution for chatbridge.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (JSON, passed explicitly)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)
//!
//! Everything is read once at process start.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Default relay listen port.
pub const DEFAULT_PORT: u16 = 3001;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Port the relay server listens on.
    pub port: u16,
    /// Directory holding the Session Engine's authentication state.
    pub auth_dir: PathBuf,
    pub session: SessionSettings,
    pub engine: EngineSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            auth_dir: default_auth_dir(),
            session: SessionSettings::default(),
            engine: EngineSettings::default(),
        }
    }
}

/// Session lifecycle tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSettings {
    /// Fixed delay before a transient close is retried.
    pub reconnect_delay_secs: u64,
    /// Bounded wait for the connect/pairing handshake. `0` disables it.
    pub handshake_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: 5,
            handshake_timeout_secs: 60,
        }
    }
}

impl SessionSettings {
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub const fn handshake_timeout(&self) -> Option<Duration> {
        if self.handshake_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.handshake_timeout_secs))
        }
    }
}

/// Sidecar Session Engine process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    /// Executable implementing the engine side of the sidecar protocol.
    pub command: Option<PathBuf>,
    /// Extra arguments passed to `command`.
    pub args: Vec<String>,
    /// How long a send waits for the engine's acknowledgement.
    pub send_timeout_secs: u64,
    /// Grace period for the engine process to exit before it is killed.
    pub terminate_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            send_timeout_secs: 30,
            terminate_timeout_secs: 5,
        }
    }
}

impl EngineSettings {
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub const fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }
}

/// Load configuration with hierarchical resolution.
///
/// CLI overrides are the caller's job; this covers defaults, the optional
/// settings file and the process environment.
pub fn load_config(settings_file: Option<&Path>) -> Result<BridgeConfig> {
    let mut config = match settings_file {
        Some(path) => load_config_file(path)?,
        None => BridgeConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.auth_dir = expand_home(&config.auth_dir);

    Ok(config)
}

/// Default authentication-state directory: `~/.chatbridge/whatsapp-auth`.
pub fn default_auth_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatbridge")
        .join("whatsapp-auth")
}

/// Expand a leading `~` against the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

fn load_config_file(path: &Path) -> Result<BridgeConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply environment overrides read through `lookup`.
///
/// Values that fail to parse are ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut BridgeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = parse_env(&lookup, "BRIDGE_PORT") {
        config.port = port;
    }
    if let Some(dir) = lookup("AUTH_DIR").filter(|v| !v.is_empty()) {
        config.auth_dir = PathBuf::from(dir);
    }
    if let Some(secs) = parse_env(&lookup, "BRIDGE_RECONNECT_DELAY_SECS") {
        config.session.reconnect_delay_secs = secs;
    }
    if let Some(secs) = parse_env(&lookup, "BRIDGE_HANDSHAKE_TIMEOUT_SECS") {
        config.session.handshake_timeout_secs = secs;
    }
    if let Some(secs) = parse_env(&lookup, "BRIDGE_SEND_TIMEOUT_SECS") {
        config.engine.send_timeout_secs = secs;
    }
    if let Some(cmd) = lookup("BRIDGE_ENGINE_CMD").filter(|v| !v.is_empty()) {
        config.engine.command = Some(PathBuf::from(cmd));
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
