//! Passive replication counters and caller-fed latency/bandwidth samples.
//!
//! Nothing here measures the network. Latency and bandwidth samples come
//! from whoever owns the transport; the relay only counts accepted requests.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use netrep_config::MonitoringConfig;
use serde::Serialize;

use crate::registry::{EntityHandle, EntityRecord, Registry};

/// Estimated per-entity bandwidth when no samples exist, in KB/s.
pub const ESTIMATED_KB_PER_ENTITY: f32 = 0.1;

/// Text export file name.
pub const EXPORT_TEXT_FILE: &str = "replication_data.txt";
/// JSON export file name.
pub const EXPORT_JSON_FILE: &str = "replication_data.json";

/// Upper bounds used by [`InstrumentationSnapshot::within_thresholds`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceThresholds {
    /// Maximum average latency in milliseconds.
    pub max_latency_ms: f32,
    /// Maximum bandwidth in KB/s.
    pub max_bandwidth_kb: f32,
    /// Maximum total replications.
    pub max_replications: u64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            max_latency_ms: 100.0,
            max_bandwidth_kb: 100.0,
            max_replications: 1000,
        }
    }
}

/// Which measurements are running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitoringState {
    pub network_profiling: bool,
    pub performance_monitoring: bool,
    pub latency_measurement: bool,
    pub bandwidth_monitoring: bool,
}

/// Failure writing an export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize export: {0}")]
    Json(#[from] serde_json::Error),
}

/// Counters and sample histories.
#[derive(Debug)]
pub struct Instrumentation {
    total_replications: u64,
    last_event_time: Option<f64>,
    current_latency_ms: f32,
    current_bandwidth_kb: f32,
    latency_history: VecDeque<f32>,
    bandwidth_history: VecDeque<f32>,
    sample_window: usize,
    thresholds: PerformanceThresholds,
    monitoring: MonitoringState,
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::from_config(&MonitoringConfig::default())
    }
}

impl Instrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds instrumentation with thresholds and history bound from config.
    pub fn from_config(config: &MonitoringConfig) -> Self {
        let sample_window = config.sample_window.max(1);
        let mut inst = Self {
            total_replications: 0,
            last_event_time: None,
            current_latency_ms: 0.0,
            current_bandwidth_kb: 0.0,
            latency_history: VecDeque::with_capacity(sample_window),
            bandwidth_history: VecDeque::with_capacity(sample_window),
            sample_window,
            thresholds: PerformanceThresholds {
                max_latency_ms: config.max_latency_ms,
                max_bandwidth_kb: config.max_bandwidth_kb,
                max_replications: config.max_replications,
            },
            monitoring: MonitoringState::default(),
        };
        if config.measure_on_start {
            inst.start_performance_monitoring();
            inst.start_latency_measurement();
            inst.start_bandwidth_monitoring();
        }
        inst
    }

    /// Counts one accepted request at `timestamp` seconds.
    pub fn record_event(&mut self, timestamp: f64) {
        self.total_replications += 1;
        self.last_event_time = Some(timestamp);
    }

    /// Adds a latency sample. Ignored unless latency measurement is running.
    pub fn record_latency(&mut self, ms: f32) {
        if !self.monitoring.latency_measurement {
            return;
        }
        self.current_latency_ms = ms;
        push_bounded(&mut self.latency_history, ms, self.sample_window);
    }

    /// Adds a bandwidth sample. Ignored unless bandwidth monitoring is running.
    pub fn record_bandwidth(&mut self, kb: f32) {
        if !self.monitoring.bandwidth_monitoring {
            return;
        }
        self.current_bandwidth_kb = kb;
        push_bounded(&mut self.bandwidth_history, kb, self.sample_window);
    }

    pub fn total_replications(&self) -> u64 {
        self.total_replications
    }

    pub fn last_event_time(&self) -> Option<f64> {
        self.last_event_time
    }

    pub fn current_latency_ms(&self) -> f32 {
        self.current_latency_ms
    }

    pub fn current_bandwidth_kb(&self) -> f32 {
        self.current_bandwidth_kb
    }

    /// Mean latency. The window is accepted for API shape but the mean is
    /// taken over the whole retained history, since samples carry no time.
    pub fn average_latency_over(&self, _window_secs: f32) -> f32 {
        mean(&self.latency_history)
    }

    /// Mean bandwidth; see [`Self::average_latency_over`] for the window.
    pub fn average_bandwidth_over(&self, _window_secs: f32) -> f32 {
        mean(&self.bandwidth_history)
    }

    pub fn thresholds(&self) -> PerformanceThresholds {
        self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: PerformanceThresholds) {
        self.thresholds = thresholds;
        tracing::info!(
            "Performance thresholds set - Latency: {:.2}, Bandwidth: {:.2}, Replications: {}",
            thresholds.max_latency_ms,
            thresholds.max_bandwidth_kb,
            thresholds.max_replications
        );
    }

    pub fn monitoring(&self) -> MonitoringState {
        self.monitoring
    }

    pub fn start_network_profiling(&mut self) {
        self.monitoring.network_profiling = true;
        tracing::info!("Network profiling started");
    }

    pub fn stop_network_profiling(&mut self) {
        self.monitoring.network_profiling = false;
        tracing::info!("Network profiling stopped");
    }

    pub fn start_performance_monitoring(&mut self) {
        self.monitoring.performance_monitoring = true;
        tracing::info!("Performance monitoring started");
    }

    pub fn stop_performance_monitoring(&mut self) {
        self.monitoring.performance_monitoring = false;
        tracing::info!("Performance monitoring stopped");
    }

    /// Starts latency measurement, discarding previous samples.
    pub fn start_latency_measurement(&mut self) {
        self.monitoring.latency_measurement = true;
        self.latency_history.clear();
        self.current_latency_ms = 0.0;
        tracing::info!("Latency measurement started");
    }

    pub fn stop_latency_measurement(&mut self) {
        self.monitoring.latency_measurement = false;
        tracing::info!("Latency measurement stopped");
    }

    /// Starts bandwidth monitoring, discarding previous samples.
    pub fn start_bandwidth_monitoring(&mut self) {
        self.monitoring.bandwidth_monitoring = true;
        self.bandwidth_history.clear();
        self.current_bandwidth_kb = 0.0;
        tracing::info!("Bandwidth monitoring started");
    }

    pub fn stop_bandwidth_monitoring(&mut self) {
        self.monitoring.bandwidth_monitoring = false;
        tracing::info!("Bandwidth monitoring stopped");
    }

    /// Zeroes counters and sample histories. Monitoring state and thresholds
    /// are kept.
    pub fn reset_stats(&mut self) {
        self.total_replications = 0;
        self.last_event_time = None;
        self.current_latency_ms = 0.0;
        self.current_bandwidth_kb = 0.0;
        self.latency_history.clear();
        self.bandwidth_history.clear();
    }

    /// Derives a snapshot. `active_entities` comes from the registry.
    pub fn snapshot(&self, active_entities: usize, simulation_active: bool) -> InstrumentationSnapshot {
        let estimated_bandwidth_kb = active_entities as f32 * ESTIMATED_KB_PER_ENTITY;
        let mut snap = InstrumentationSnapshot {
            active_entities,
            total_replications: self.total_replications,
            last_event_time: self.last_event_time,
            current_latency_ms: self.current_latency_ms,
            average_latency_ms: mean(&self.latency_history),
            current_bandwidth_kb: self.current_bandwidth_kb,
            average_bandwidth_kb: mean(&self.bandwidth_history),
            estimated_bandwidth_kb,
            latency_samples: self.latency_history.len(),
            bandwidth_samples: self.bandwidth_history.len(),
            thresholds: self.thresholds,
            monitoring: self.monitoring,
            simulation_active,
            within_thresholds: false,
        };
        snap.within_thresholds = snap.check_thresholds();
        snap
    }
}

fn push_bounded(history: &mut VecDeque<f32>, sample: f32, bound: usize) {
    if history.len() >= bound {
        history.pop_front();
    }
    history.push_back(sample);
}

fn mean(samples: &VecDeque<f32>) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f32>() / samples.len() as f32
}

/// Read-only view of instrumentation, derived on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentationSnapshot {
    pub active_entities: usize,
    pub total_replications: u64,
    pub last_event_time: Option<f64>,
    pub current_latency_ms: f32,
    pub average_latency_ms: f32,
    pub current_bandwidth_kb: f32,
    pub average_bandwidth_kb: f32,
    /// `0.1` KB/s per registered entity.
    pub estimated_bandwidth_kb: f32,
    pub latency_samples: usize,
    pub bandwidth_samples: usize,
    pub thresholds: PerformanceThresholds,
    pub monitoring: MonitoringState,
    pub simulation_active: bool,
    pub within_thresholds: bool,
}

impl InstrumentationSnapshot {
    /// Bandwidth compared against the threshold: the sample mean, or the
    /// per-entity estimate when no samples exist.
    pub fn effective_bandwidth_kb(&self) -> f32 {
        if self.bandwidth_samples > 0 {
            self.average_bandwidth_kb
        } else {
            self.estimated_bandwidth_kb
        }
    }

    fn check_thresholds(&self) -> bool {
        self.average_latency_ms <= self.thresholds.max_latency_ms
            && self.effective_bandwidth_kb() <= self.thresholds.max_bandwidth_kb
            && self.total_replications <= self.thresholds.max_replications
    }

    /// Short multi-line summary.
    pub fn network_insights(&self) -> String {
        let mut out = String::from("Network Insights:\n");
        let _ = writeln!(out, "Active Entities: {}", self.active_entities);
        let _ = writeln!(out, "Total Replications: {}", self.total_replications);
        let _ = writeln!(out, "Average Latency: {:.2}", self.average_latency_ms);
        let _ = writeln!(out, "Bandwidth Usage: {:.2} KB", self.effective_bandwidth_kb());
        let _ = writeln!(out, "Profiling Active: {}", yes_no(self.monitoring.network_profiling));
        let _ = writeln!(out, "Simulation Active: {}", yes_no(self.simulation_active));
        out
    }

    /// Full report including thresholds and monitoring state.
    pub fn detailed_report(&self) -> String {
        let mut out = String::from("=== DETAILED PERFORMANCE REPORT ===\n");
        let _ = writeln!(out, "Active Entities: {}", self.active_entities);
        let _ = writeln!(out, "Total Replications: {}", self.total_replications);
        let _ = writeln!(out, "Average Latency: {:.2} ms", self.average_latency_ms);
        let _ = writeln!(out, "Current Bandwidth: {:.2} KB/s", self.effective_bandwidth_kb());
        let _ = writeln!(out, "Max Latency Threshold: {:.2} ms", self.thresholds.max_latency_ms);
        let _ = writeln!(
            out,
            "Max Bandwidth Threshold: {:.2} KB/s",
            self.thresholds.max_bandwidth_kb
        );
        let _ = writeln!(
            out,
            "Max Replications Threshold: {}",
            self.thresholds.max_replications
        );
        let status = if self.within_thresholds { "GOOD" } else { "WARNING" };
        let _ = writeln!(out, "Performance Status: {status}");
        let _ = writeln!(
            out,
            "Performance Monitoring: {}",
            active(self.monitoring.performance_monitoring)
        );
        let _ = writeln!(
            out,
            "Latency Measurement: {}",
            active(self.monitoring.latency_measurement)
        );
        let _ = writeln!(
            out,
            "Bandwidth Monitoring: {}",
            active(self.monitoring.bandwidth_monitoring)
        );
        out
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

fn active(flag: bool) -> &'static str {
    if flag { "ACTIVE" } else { "INACTIVE" }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EntityExport<'a> {
    handle: EntityHandle,
    #[serde(flatten)]
    record: &'a EntityRecord,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    snapshot: &'a InstrumentationSnapshot,
    entities: Vec<EntityExport<'a>>,
}

/// Writes [`EXPORT_TEXT_FILE`] and [`EXPORT_JSON_FILE`] into `dir`, creating
/// it if needed. Entities are listed in handle order. Returns both paths.
pub fn export(
    dir: &Path,
    snapshot: &InstrumentationSnapshot,
    registry: &Registry,
) -> Result<(PathBuf, PathBuf), ExportError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entities: Vec<_> = registry
        .iter()
        .map(|(handle, record)| EntityExport { handle, record })
        .collect();
    entities.sort_by_key(|e| e.handle);

    let mut text = String::from("Network Replication Data Export\n");
    let _ = writeln!(text, "Entities: {}", entities.len());
    for e in &entities {
        let _ = writeln!(
            text,
            "Entity: {} - Replications: {}",
            e.handle, e.record.replications
        );
    }
    text.push_str(&snapshot.detailed_report());

    let text_path = dir.join(EXPORT_TEXT_FILE);
    std::fs::write(&text_path, text).map_err(|source| ExportError::Io {
        path: text_path.clone(),
        source,
    })?;

    let doc = ExportDocument { snapshot, entities };
    let json = serde_json::to_string_pretty(&doc)?;
    let json_path = dir.join(EXPORT_JSON_FILE);
    std::fs::write(&json_path, json).map_err(|source| ExportError::Io {
        path: json_path.clone(),
        source,
    })?;

    tracing::info!("Replication data exported to: {}", text_path.display());
    Ok((text_path, json_path))
}
