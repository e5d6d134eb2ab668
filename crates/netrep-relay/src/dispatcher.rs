//! The relay dispatcher: routes each accepted request by local role.
//!
//! On the authority a request is broadcast to every observer and then applied
//! locally. On an observer it is forwarded to the authority and nothing is
//! applied until the authority's broadcast comes back. Either way exactly one
//! message leaves the process per accepted request, and the replication
//! counter moves once.

use std::path::{Path, PathBuf};

use netrep_config::Config;

use crate::authority::{AuthorityGate, NetRole};
use crate::clock::{Clock, MonotonicClock};
use crate::error::RejectionReason;
use crate::impairment::ImpairmentConfig;
use crate::instrumentation::{self, ExportError, Instrumentation, InstrumentationSnapshot};
use crate::listeners::ReplicationListeners;
use crate::registry::{EntityHandle, Registry};
use crate::relevancy::{self, InterestSet};
use crate::request::{StateChange, StateChangeRequest, Vec3};
use crate::settings::{ReplicationSettings, SettingsError};
use crate::transport::{RelayMessage, Transport};

/// Single-threaded replication relay over a [`Transport`].
pub struct RelayDispatcher<T, C = MonotonicClock> {
    transport: T,
    clock: C,
    registry: Registry,
    settings: ReplicationSettings,
    instrumentation: Instrumentation,
    listeners: ReplicationListeners,
    interest: InterestSet,
    impairment: ImpairmentConfig,
    debug_logging: bool,
}

impl<T: Transport, C: Clock> RelayDispatcher<T, C> {
    /// Creates a dispatcher with default settings and thresholds.
    pub fn new(transport: T, clock: C) -> Self {
        Self {
            transport,
            clock,
            registry: Registry::new(),
            settings: ReplicationSettings::default(),
            instrumentation: Instrumentation::new(),
            listeners: ReplicationListeners::new(),
            interest: InterestSet::new(),
            impairment: ImpairmentConfig::new(),
            debug_logging: false,
        }
    }

    /// Creates a dispatcher seeded from the loaded configuration.
    ///
    /// Invalid replication settings fall back to defaults with a warning.
    pub fn with_config(transport: T, clock: C, config: &Config) -> Self {
        let mut dispatcher = Self::new(transport, clock);
        let settings = ReplicationSettings::from_config(&config.replication);
        match settings.validate() {
            Ok(()) => dispatcher.settings = settings,
            Err(e) => tracing::warn!("Ignoring configured replication settings: {e}"),
        }
        dispatcher.instrumentation = Instrumentation::from_config(&config.monitoring);
        dispatcher.impairment = ImpairmentConfig::from_config(&config.simulation);
        dispatcher.debug_logging = config.debug.debug_logging;
        dispatcher
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Authority gate over this dispatcher's transport.
    pub fn gate(&self) -> AuthorityGate<'_, T> {
        AuthorityGate::new(&self.transport)
    }

    pub fn role(&self) -> NetRole {
        self.gate().role()
    }

    // -- Registry ----------------------------------------------------------

    /// Registers an entity; see [`Registry::register`].
    pub fn register(&mut self, handle: EntityHandle) -> bool {
        self.registry.register(handle)
    }

    /// Unregisters an entity; see [`Registry::unregister`].
    pub fn unregister(&mut self, handle: EntityHandle) -> bool {
        self.registry.unregister(handle)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // -- Requests ----------------------------------------------------------

    /// Builds a request stamped with the dispatcher's clock.
    pub fn stamp(&self, source: EntityHandle, change: StateChange) -> StateChangeRequest {
        StateChangeRequest::new(source, change, self.clock.now())
    }

    /// Stamps and submits `change` in one call.
    pub fn replicate(
        &mut self,
        source: EntityHandle,
        change: StateChange,
    ) -> Result<(), RejectionReason> {
        let request = self.stamp(source, change);
        self.submit(&request)
    }

    /// Submits a request for replication.
    ///
    /// The payload is validated first; a rejected request produces no
    /// traffic and leaves every counter untouched. A transport failure is
    /// returned as-is and is not retried.
    pub fn submit(&mut self, request: &StateChangeRequest) -> Result<(), RejectionReason> {
        if let Err(reason) = request.validate() {
            tracing::warn!("Rejected request from {}: {reason}", request.source());
            return Err(reason);
        }

        if self.debug_logging {
            tracing::info!(
                "Replicating {} from {}",
                request.change().label(),
                request.source()
            );
        }

        let authority = self.gate().is_authority();
        let sent = if authority {
            self.transport.broadcast(request)
        } else {
            self.transport.send_to_authority(request)
        };
        if let Err(e) = sent {
            tracing::warn!(
                "Transport refused {} from {}: {e}",
                request.change().label(),
                request.source()
            );
            return Err(RejectionReason::TransportFailure(e));
        }

        let now = self.clock.now();
        self.instrumentation.record_event(now);
        self.registry.note_replication(request.source(), now);

        if authority {
            self.apply(request);
        }
        Ok(())
    }

    /// Handles a message delivered by the transport.
    ///
    /// A forward reaching the authority is submitted as if it originated
    /// locally. A broadcast reaching an observer is applied. The other two
    /// combinations are misrouted and are dropped with a warning.
    pub fn receive(&mut self, message: RelayMessage) -> Result<(), RejectionReason> {
        let authority = self.gate().is_authority();
        match message {
            RelayMessage::Forward(request) if authority => self.submit(&request),
            RelayMessage::Forward(request) => {
                tracing::warn!(
                    "Observer dropped forwarded {} from {}",
                    request.change().label(),
                    request.source()
                );
                Ok(())
            }
            RelayMessage::Broadcast(request) if !authority => {
                self.apply(&request);
                Ok(())
            }
            RelayMessage::Broadcast(request) => {
                tracing::warn!(
                    "Authority ignored broadcast {} from {}",
                    request.change().label(),
                    request.source()
                );
                Ok(())
            }
        }
    }

    fn apply(&mut self, request: &StateChangeRequest) {
        let ran = self.listeners.emit(request.source(), request.change());
        tracing::trace!(
            "Applied {} from {} ({ran} listeners)",
            request.change().label(),
            request.source()
        );
    }

    /// Listener registration.
    pub fn listeners_mut(&mut self) -> &mut ReplicationListeners {
        &mut self.listeners
    }

    // -- Settings ----------------------------------------------------------

    pub fn settings(&self) -> &ReplicationSettings {
        &self.settings
    }

    /// Replaces the settings wholesale. An invalid value is refused and the
    /// current settings stay in effect.
    pub fn set_settings(&mut self, settings: ReplicationSettings) -> Result<(), SettingsError> {
        if let Err(e) = settings.validate() {
            tracing::warn!("Rejected replication settings: {e}");
            return Err(e);
        }
        self.settings = settings;
        tracing::info!("Replication settings updated");
        Ok(())
    }

    fn update_settings(
        &mut self,
        edit: impl FnOnce(&mut ReplicationSettings),
    ) -> Result<(), SettingsError> {
        let mut next = self.settings.clone();
        edit(&mut next);
        self.set_settings(next)
    }

    pub fn set_replication_distance(&mut self, distance: f32) -> Result<(), SettingsError> {
        self.update_settings(|s| s.max_replication_distance = distance)?;
        tracing::info!("Replication distance set to: {distance:.2}");
        Ok(())
    }

    /// Same field as [`Self::set_replication_distance`].
    pub fn set_interest_radius(&mut self, radius: f32) -> Result<(), SettingsError> {
        self.update_settings(|s| s.max_replication_distance = radius)?;
        tracing::info!("Interest radius set to: {radius:.2}");
        Ok(())
    }

    pub fn enable_relevancy_culling(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.update_settings(|s| s.enable_relevancy = enabled)?;
        tracing::info!(
            "Relevancy culling {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub fn enable_client_prediction(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.update_settings(|s| s.enable_client_prediction = enabled)?;
        tracing::info!(
            "Client prediction {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub fn set_prediction_tolerance(&mut self, tolerance: f32) -> Result<(), SettingsError> {
        self.update_settings(|s| s.prediction_tolerance = tolerance)?;
        tracing::info!("Prediction tolerance set to: {tolerance:.2}");
        Ok(())
    }

    pub fn is_prediction_enabled(&self) -> bool {
        self.settings.enable_client_prediction
    }

    /// Lengthens the replication interval by half (never below 0.1 s) when
    /// the per-entity bandwidth estimate exceeds `max_kb`. Returns whether
    /// the interval changed; an interval that would no longer validate is
    /// refused and the settings are left as they were.
    pub fn optimize_for_bandwidth(&mut self, max_kb: f32) -> bool {
        let estimate = self.snapshot().estimated_bandwidth_kb;
        if estimate <= max_kb {
            return false;
        }
        let interval = (self.settings.replication_interval * 1.5).max(0.1);
        if self
            .update_settings(|s| s.replication_interval = interval)
            .is_err()
        {
            return false;
        }
        tracing::info!("Bandwidth optimization: Reduced replication interval to {interval:.2}");
        true
    }

    // -- Relevancy & interest ---------------------------------------------

    /// Distance relevancy under the current settings.
    pub fn is_relevant(&self, entity: &Vec3, viewer: &Vec3) -> bool {
        relevancy::is_relevant(&self.settings, entity, viewer)
    }

    pub fn add_interest(&mut self, handle: EntityHandle) -> bool {
        self.interest.add(handle)
    }

    pub fn remove_interest(&mut self, handle: EntityHandle) -> bool {
        self.interest.remove(handle)
    }

    pub fn interest(&self) -> &InterestSet {
        &self.interest
    }

    pub fn interest_count(&self) -> usize {
        self.interest.count()
    }

    // -- Impairment --------------------------------------------------------

    pub fn impairment(&self) -> &ImpairmentConfig {
        &self.impairment
    }

    pub fn impairment_mut(&mut self) -> &mut ImpairmentConfig {
        &mut self.impairment
    }

    // -- Instrumentation ---------------------------------------------------

    pub fn instrumentation(&self) -> &Instrumentation {
        &self.instrumentation
    }

    pub fn instrumentation_mut(&mut self) -> &mut Instrumentation {
        &mut self.instrumentation
    }

    /// Current counters and samples.
    pub fn snapshot(&self) -> InstrumentationSnapshot {
        self.instrumentation
            .snapshot(self.registry.count(), self.impairment.is_active())
    }

    pub fn within_thresholds(&self) -> bool {
        self.snapshot().within_thresholds
    }

    /// Logs totals at info level.
    pub fn show_stats(&self) {
        tracing::info!(
            "Network Stats - Entities: {}, Total Replications: {}",
            self.registry.count(),
            self.instrumentation.total_replications()
        );
    }

    /// `Total Replications: N, Last: T` with T in seconds.
    pub fn replication_stats(&self) -> String {
        format!(
            "Total Replications: {}, Last: {:.2}",
            self.instrumentation.total_replications(),
            self.instrumentation.last_event_time().unwrap_or(0.0)
        )
    }

    /// Zeroes global and per-entity stats. Registration is kept.
    pub fn reset_stats(&mut self) {
        self.instrumentation.reset_stats();
        self.registry.reset_stats();
        tracing::info!("Replication stats reset");
    }

    /// Writes the text and JSON exports into `dir`.
    pub fn export(&self, dir: &Path) -> Result<(PathBuf, PathBuf), ExportError> {
        instrumentation::export(dir, &self.snapshot(), &self.registry)
    }

    // -- Debug -------------------------------------------------------------

    pub fn set_debug_logging(&mut self, enabled: bool) {
        self.debug_logging = enabled;
        tracing::info!(
            "Replication debug logging {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn debug_logging(&self) -> bool {
        self.debug_logging
    }

    /// Logs `event` when debug logging is on.
    pub fn log_replication_event(&self, event: &str) {
        if self.debug_logging {
            tracing::info!("Replication Event: {event}");
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
