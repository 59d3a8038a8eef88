//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ClusterConfig: which role this process plays (ingestor or simulator).
//!     - BrokerConfig: where the MQTT broker lives and how long to wait for it.
//!     - TopicsConfig / RoomsConfig: the channel root and the known room set.
//!     - ReconnectConfig: capped exponential backoff for the ingestor.
//!     - SimulatorConfig: publish interval.
//!     - HistoryConfig / LogSinkConfig / ApiConfig: consumer-side extras.
//!
//! every section has a serde default, so a partial file is fine.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::RoomId;
use crate::error::{HubError, Result};
use crate::topics::{TopicMap, DEFAULT_ROOT};

/// env var naming an explicit config file
pub const CONFIG_ENV: &str = "SMARTBUILDING_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HostConfig {
    pub cluster: ClusterConfig,
    pub broker: BrokerConfig,
    pub topics: TopicsConfig,
    pub rooms: RoomsConfig,
    pub reconnect: ReconnectConfig,
    pub simulator: SimulatorConfig,
    pub history: HistoryConfig,
    pub log_sink: LogSinkConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Ingestor,
    Simulator,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ClusterConfig {
    pub role: Role,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keepalive_seconds: u64,
    pub connect_timeout_seconds: u64,
    /// client id prefix; the role initial and process id are appended and the
    /// result is cut to 23 bytes
    pub client_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".to_string(),
            port: 1883,
            keepalive_seconds: 60,
            connect_timeout_seconds: 10,
            client_id: "smartbuilding".to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TopicsConfig {
    pub root: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoomsConfig {
    pub names: Vec<String>,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            names: (1..=4).map(|i| format!("Room {}", i)).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            factor: 2.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorConfig {
    pub interval_seconds: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { interval_seconds: 5 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub poll_interval_seconds: u64,
    pub max_points: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 2,
            max_points: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogSinkConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub queue_capacity: usize,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("sensor_data.jsonl"),
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: true,
        }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            HubError::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: HostConfig = toml::from_str(content)
            .map_err(|e| HubError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from $SMARTBUILDING_CONFIG, then the usual locations, then defaults.
    ///
    /// an explicit path that fails to load is an error; the fallback search
    /// only warns.
    pub fn load_or_default() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let config = Self::load(&path)?;
            tracing::info!(path = %path, "[CONFIG] Loaded");
            return Ok(config);
        }

        let paths = [
            PathBuf::from("config").join("host.toml"),
            PathBuf::from("..").join("config").join("host.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "[CONFIG] Loaded");
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "[CONFIG] Failed to load");
                    }
                }
            }
        }

        tracing::warn!("[CONFIG] No config file found - using defaults");
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if self.broker.host.trim().is_empty() {
            return Err(HubError::Config("broker.host is empty".to_string()));
        }
        if self.broker.connect_timeout_seconds == 0 {
            return Err(HubError::Config(
                "broker.connect_timeout_seconds must be > 0".to_string(),
            ));
        }
        if self.simulator.interval_seconds == 0 || self.history.poll_interval_seconds == 0 {
            return Err(HubError::Config("intervals must be > 0".to_string()));
        }
        if self.history.max_points == 0 {
            return Err(HubError::Config("history.max_points must be > 0".to_string()));
        }
        if self.reconnect.initial_delay_ms == 0 {
            return Err(HubError::Config(
                "reconnect.initial_delay_ms must be > 0".to_string(),
            ));
        }
        if self.reconnect.factor.is_nan() || self.reconnect.factor < 1.0 {
            return Err(HubError::Config(
                "reconnect.factor must be >= 1.0".to_string(),
            ));
        }
        if self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms {
            return Err(HubError::Config(
                "reconnect.max_delay_ms is below initial_delay_ms".to_string(),
            ));
        }
        // room set and channel names are checked by the topic map itself
        self.topic_map().map(|_| ())
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.names.iter().map(|n| RoomId::new(n.trim())).collect()
    }

    pub fn topic_map(&self) -> Result<TopicMap> {
        TopicMap::new(&self.topics.root, self.room_ids())
    }

    /// Print configuration summary
    pub fn log_summary(&self) {
        tracing::info!(
            role = ?self.cluster.role,
            broker = %self.broker.address(),
            keepalive_s = self.broker.keepalive_seconds,
            topic_root = %self.topics.root,
            rooms = self.rooms.names.len(),
            log_level = %self.logging.level,
            "[CONFIG] Host configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = HostConfig::default();
        assert_eq!(config.cluster.role, Role::Ingestor);
        assert_eq!(config.broker.address(), "broker.hivemq.com:1883");
        assert_eq!(config.broker.keepalive(), Duration::from_secs(60));
        assert_eq!(config.rooms.names, vec!["Room 1", "Room 2", "Room 3", "Room 4"]);
        assert_eq!(config.simulator.interval_seconds, 5);
        assert_eq!(config.history.max_points, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = HostConfig::from_toml(
            r#"
            [cluster]
            role = "simulator"

            [broker]
            host = "localhost"

            [rooms]
            names = ["Lobby", "Server Room"]
            "#,
        )
        .unwrap();
        assert_eq!(config.cluster.role, Role::Simulator);
        assert_eq!(config.broker.address(), "localhost:1883");
        assert_eq!(
            config.topic_map().unwrap().topics(),
            vec!["smartbuilding/Lobby", "smartbuilding/ServerRoom"]
        );
    }

    #[test]
    fn colliding_rooms_fail_validation() {
        let err = HostConfig::from_toml(
            r#"
            [rooms]
            names = ["Room 1", "Room1"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, HubError::Config(_)));
    }

    #[test]
    fn zero_intervals_fail_validation() {
        assert!(HostConfig::from_toml("[simulator]\ninterval_seconds = 0").is_err());
        assert!(HostConfig::from_toml("[broker]\nconnect_timeout_seconds = 0").is_err());
        assert!(HostConfig::from_toml("[rooms]\nnames = []").is_err());
    }

    #[test]
    fn reconnect_backoff_must_grow_from_a_nonzero_delay() {
        let zero = HostConfig::from_toml("[reconnect]\ninitial_delay_ms = 0\nmax_delay_ms = 0");
        assert!(matches!(zero, Err(HubError::Config(_))));
        assert!(HostConfig::from_toml("[reconnect]\ninitial_delay_ms = 0").is_err());
        assert!(HostConfig::from_toml("[reconnect]\nfactor = 0.5").is_err());
        assert!(HostConfig::from_toml("[reconnect]\nfactor = nan").is_err());
        assert!(HostConfig::from_toml("[reconnect]\nmax_delay_ms = 100").is_err());

        let ok = HostConfig::from_toml("[reconnect]\ninitial_delay_ms = 1\nfactor = 1.0").unwrap();
        assert_eq!(ok.reconnect.initial_delay_ms, 1);
    }

    #[test]
    fn shipped_host_toml_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join("host.toml");
        let config = HostConfig::load(path).unwrap();
        assert_eq!(config.topic_map().unwrap().topics().len(), 4);
        assert!(config.log_sink.enabled);
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(HostConfig::from_toml("[cluster]\nrole = \"spoke\"").is_err());
    }
}
