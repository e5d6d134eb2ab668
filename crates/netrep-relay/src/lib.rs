//! Authoritative state-change relay.
//!
//! Entities submit [`StateChangeRequest`]s to a [`RelayDispatcher`]. The
//! authority broadcasts and applies them; observers forward them to the
//! authority and apply what comes back. Delivery, ordering and framing belong
//! to the [`Transport`] implementation.

pub mod authority;
pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod impairment;
pub mod instrumentation;
pub mod listeners;
pub mod registry;
pub mod relevancy;
pub mod request;
pub mod settings;
pub mod transport;

pub use authority::{AuthorityGate, NetRole};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use dispatcher::RelayDispatcher;
pub use error::RejectionReason;
pub use impairment::ImpairmentConfig;
pub use instrumentation::{
    ExportError, Instrumentation, InstrumentationSnapshot, MonitoringState, PerformanceThresholds,
};
pub use listeners::{ListenerId, ReplicationListeners};
pub use registry::{EntityHandle, EntityRecord, Registry};
pub use relevancy::{InterestSet, is_relevant};
pub use request::{
    ActorSpawn, AnimationPlay, AnimationStop, AssetPath, CustomEvent, EffectSpawn, NamedVariable,
    Rotator, SoundAtLocation, SoundPlay, SpawnPlacement, StateChange, StateChangeRequest,
    Trajectory, Vec3, VariableKind, VariableValue,
};
pub use settings::{ReplicationSettings, SettingsError};
pub use transport::{RelayMessage, Transport, TransportError};
