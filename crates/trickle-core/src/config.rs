//! Configuration system for trickle.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TRICKLE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/trickle/config.toml
//!   3. ~/.config/trickle/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::chunk::TEXT_CHUNK_SIZE;

/// Well-known streaming port.
pub const STREAMING_PORT: u16 = 2345;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrickleConfig {
    pub server: ServerSettings,
    pub client: ClientSettings,
    pub logging: LoggingSettings,
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// UDP port the server listens on.
    pub port: u16,
    /// File to stream. Required to start a server.
    pub payload: Option<PathBuf>,
    /// Bytes per datagram. 1000 for text; raise for media.
    pub chunk_size: usize,
    /// Delay between consecutive chunks, and between a request and the first chunk.
    pub cadence_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Where received bytes are appended.
    pub output: PathBuf,
    /// Local port. 0 = ephemeral.
    pub local_port: u16,
    /// Delay before the request datagram is sent.
    pub request_delay_ms: u64,
    /// `trickled fetch` exits after this long without new data. 0 = never.
    pub idle_exit_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Protocol events after this point are no longer logged.
    pub cutoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Point-to-point link rate in bits per second.
    pub data_rate_bps: u64,
    /// One-way propagation delay.
    pub link_delay_ms: u64,
    /// Receive-side byte error rate. 0 = lossless.
    pub error_rate: f64,
    /// Seed for the error model.
    pub seed: u64,
    /// Stop the simulated run here. 0 = run until idle.
    pub stop_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: STREAMING_PORT,
            payload: None,
            chunk_size: TEXT_CHUNK_SIZE,
            cadence_ms: 60,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            output: PathBuf::from("text_out.txt"),
            local_port: 0,
            request_delay_ms: 1000,
            idle_exit_ms: 3000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { cutoff_ms: 5000 }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            data_rate_bps: 5_000_000, // 5 Mbps
            link_delay_ms: 2,
            error_rate: 0.0,
            seed: 1,
            stop_ms: 0,
        }
    }
}

impl ServerSettings {
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }
}

impl ClientSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl LoggingSettings {
    pub fn cutoff(&self) -> Duration {
        Duration::from_millis(self.cutoff_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("trickle")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl TrickleConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            TrickleConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a specific file, without env overrides.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TRICKLE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&TrickleConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply TRICKLE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(p) = var("TRICKLE_SERVER__PORT").and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }
        if let Some(v) = var("TRICKLE_SERVER__PAYLOAD") {
            self.server.payload = Some(PathBuf::from(v));
        }
        if let Some(n) = var("TRICKLE_SERVER__CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.server.chunk_size = n;
        }
        if let Some(v) = var("TRICKLE_CLIENT__OUTPUT") {
            self.client.output = PathBuf::from(v);
        }
        if let Some(r) = var("TRICKLE_SIMULATION__ERROR_RATE").and_then(|v| v.parse().ok()) {
            self.simulation.error_rate = r;
        }
    }
}
