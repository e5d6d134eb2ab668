//! Simulated network impairment.
//!
//! These values are recorded and reported only. Nothing in the relay delays,
//! drops, or throttles traffic because of them; a transport may read them
//! back and choose to honor them.

use netrep_config::SimulationConfig;
use serde::Serialize;

/// Requested latency, loss, and bandwidth impairment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImpairmentConfig {
    active: bool,
    latency_ms: f32,
    packet_loss_pct: f32,
    bandwidth_limit_kb: f32,
}

impl ImpairmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds from config; `enabled` applies all three values and activates.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let mut imp = Self::default();
        if config.enabled {
            imp.simulate_network_conditions(
                config.latency_ms,
                config.packet_loss_pct,
                config.bandwidth_limit_kb,
            );
        }
        imp
    }

    /// Sets all three values verbatim and marks the simulation active.
    pub fn simulate_network_conditions(
        &mut self,
        latency_ms: f32,
        packet_loss_pct: f32,
        bandwidth_limit_kb: f32,
    ) {
        self.active = true;
        self.latency_ms = latency_ms;
        self.packet_loss_pct = packet_loss_pct;
        self.bandwidth_limit_kb = bandwidth_limit_kb;
        tracing::info!(
            "Network simulation: Latency={latency_ms:.2}, Loss={packet_loss_pct:.2}%, Bandwidth={bandwidth_limit_kb:.2} KB"
        );
    }

    /// Packet loss percentage, clamped to `0..=100`.
    pub fn simulate_packet_loss(&mut self, pct: f32) {
        self.packet_loss_pct = pct.clamp(0.0, 100.0);
        tracing::info!("Packet loss simulation: {:.2}%", self.packet_loss_pct);
    }

    /// Latency in milliseconds, floored at zero.
    pub fn simulate_latency(&mut self, ms: f32) {
        self.latency_ms = ms.max(0.0);
        tracing::info!("Latency simulation: {:.2} ms", self.latency_ms);
    }

    /// Bandwidth cap in KB/s, floored at zero.
    pub fn simulate_bandwidth_limit(&mut self, kb: f32) {
        self.bandwidth_limit_kb = kb.max(0.0);
        tracing::info!("Bandwidth limit simulation: {:.2} KB/s", self.bandwidth_limit_kb);
    }

    /// Zeroes every value and deactivates.
    pub fn reset_network_simulation(&mut self) {
        *self = Self::default();
        tracing::info!("Network simulation reset");
    }

    /// Zeroes every value; the active flag is left as is.
    pub fn reset_all_simulations(&mut self) {
        self.latency_ms = 0.0;
        self.packet_loss_pct = 0.0;
        self.bandwidth_limit_kb = 0.0;
        tracing::info!("All network simulations reset");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn latency_ms(&self) -> f32 {
        self.latency_ms
    }

    pub fn packet_loss_pct(&self) -> f32 {
        self.packet_loss_pct
    }

    pub fn bandwidth_limit_kb(&self) -> f32 {
        self.bandwidth_limit_kb
    }
}
