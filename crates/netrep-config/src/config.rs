//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted configuration inside the config directory.
const CONFIG_FILE: &str = "config.ron";

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Transport settings (addresses, framing, compression).
    pub network: NetworkConfig,
    /// Replication settings handed to the relay dispatcher at startup.
    pub replication: ReplicationConfig,
    /// Instrumentation thresholds and sample retention.
    pub monitoring: MonitoringConfig,
    /// Simulated network impairment applied at startup.
    pub simulation: SimulationConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address of the authority process.
    pub server_address: String,
    /// Authority TCP port.
    pub server_port: u16,
    /// Maximum observers the authority accepts.
    pub max_connections: u32,
    /// Largest frame payload accepted on the wire, in bytes.
    pub max_payload_size: u32,
    /// Payloads at least this large are LZ4-compressed when compression is on.
    pub compression_threshold: u32,
}

/// Replication behaviour. The relay's `ReplicationSettings` takes its defaults from here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Seconds between replication passes.
    pub replication_interval: f32,
    /// Distance beyond which entities are not relevant to a viewer.
    pub max_replication_distance: f32,
    /// Compress outgoing payloads.
    pub enable_compression: bool,
    /// Allow clients to predict changes before the authority confirms them.
    pub enable_client_prediction: bool,
    /// Track an explicit interest set.
    pub enable_interest_management: bool,
    /// Accepted prediction error before correction.
    pub prediction_tolerance: f32,
    /// Upper bound on replications per second.
    pub max_replication_frequency: u32,
    /// Cull by distance in relevancy checks.
    pub enable_relevancy: bool,
    /// Per-connection bandwidth budget in KB/s.
    pub bandwidth_limit_kb: f32,
}

/// Instrumentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Average latency (ms) above which performance is flagged.
    pub max_latency_ms: f32,
    /// Bandwidth (KB/s) above which performance is flagged.
    pub max_bandwidth_kb: f32,
    /// Replication count above which performance is flagged.
    pub max_replications: u64,
    /// Number of latency/bandwidth samples retained.
    pub sample_window: usize,
    /// Start latency and bandwidth measurement immediately.
    pub measure_on_start: bool,
}

/// Simulated impairment. Values are recorded only; see the relay docs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Enable simulation at startup.
    pub enabled: bool,
    /// Added latency in milliseconds.
    pub latency_ms: f32,
    /// Packet loss percentage (0 - 100).
    pub packet_loss_pct: f32,
    /// Bandwidth cap in KB/s (0 = unlimited).
    pub bandwidth_limit_kb: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log every replication at info level.
    pub debug_logging: bool,
    /// Directory for stats exports and debug-build JSON logs.
    pub export_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 7777,
            max_connections: 64,
            max_payload_size: 1_048_576,
            compression_threshold: 256,
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replication_interval: 0.05,
            max_replication_distance: 15_000.0,
            enable_compression: true,
            enable_client_prediction: true,
            enable_interest_management: true,
            prediction_tolerance: 0.1,
            max_replication_frequency: 60,
            enable_relevancy: true,
            bandwidth_limit_kb: 100.0,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: 100.0,
            max_bandwidth_kb: 100.0,
            max_replications: 1000,
            sample_window: 600,
            measure_on_start: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_logging: false,
            export_dir: None,
        }
    }
}

/// Platform config directory for netrep (e.g. `~/.config/netrep`).
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("netrep"))
        .ok_or(ConfigError::NoConfigDir)
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::WriteError {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::WriteError {
            path: config_path.clone(),
            source,
        })
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
