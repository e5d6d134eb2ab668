//! State-change requests: what an entity asks the authority to replicate.
//!
//! A [`StateChangeRequest`] pairs the originating [`EntityHandle`] with one
//! [`StateChange`] and the time it was issued. Requests are immutable once
//! built and are consumed by the relay dispatcher.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RejectionReason;
use crate::registry::EntityHandle;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A 3D vector in world units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl Vec3 {
    /// The origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a new vector.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Squared distance to `other`, computed in `f64`.
    pub fn distance_squared(&self, other: &Vec3) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        let dz = self.z as f64 - other.z as f64;
        dx * dx + dy * dy + dz * dz
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X={:.3} Y={:.3} Z={:.3}", self.x, self.y, self.z)
    }
}

/// Pitch/yaw/roll rotation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotator {
    /// Pitch in degrees.
    pub pitch: f32,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Roll in degrees.
    pub roll: f32,
}

impl Rotator {
    /// No rotation.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a new rotator.
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }
}

impl fmt::Display for Rotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P={:.6} Y={:.6} R={:.6}", self.pitch, self.yaw, self.roll)
    }
}

// ---------------------------------------------------------------------------
// AssetPath
// ---------------------------------------------------------------------------

/// Reference to a host asset (montage, sound, actor class, effect, ...).
///
/// The relay never loads assets; it only carries the path. An empty path is
/// the null reference and fails validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPath(pub String);

impl AssetPath {
    /// Creates a reference from any string-like path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The null reference.
    pub fn none() -> Self {
        Self(String::new())
    }

    /// Whether this reference is null (empty or whitespace).
    pub fn is_none(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("None")
        } else {
            f.write_str(&self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Play an animation montage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationPlay {
    /// Montage asset.
    pub montage: AssetPath,
    /// Playback rate multiplier.
    pub play_rate: f32,
    /// Start offset into the montage, in seconds.
    pub starting_position: f32,
}

impl AnimationPlay {
    /// Plays `montage` at normal rate from the beginning.
    pub fn new(montage: impl Into<AssetPath>) -> Self {
        Self {
            montage: montage.into(),
            play_rate: 1.0,
            starting_position: 0.0,
        }
    }
}

/// Stop a playing montage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationStop {
    /// Montage asset.
    pub montage: AssetPath,
}

/// Play a sound attached to the source entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundPlay {
    /// Sound asset.
    pub sound: AssetPath,
    /// Volume multiplier.
    pub volume: f32,
    /// Pitch multiplier.
    pub pitch: f32,
    /// Start offset in seconds.
    pub start_time: f32,
}

impl SoundPlay {
    /// Plays `sound` at unit volume and pitch.
    pub fn new(sound: impl Into<AssetPath>) -> Self {
        Self {
            sound: sound.into(),
            volume: 1.0,
            pitch: 1.0,
            start_time: 0.0,
        }
    }
}

/// Play a sound at a world location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundAtLocation {
    /// Sound asset.
    pub sound: AssetPath,
    /// World location.
    pub location: Vec3,
    /// Volume multiplier.
    pub volume: f32,
    /// Pitch multiplier.
    pub pitch: f32,
    /// Start offset in seconds.
    pub start_time: f32,
}

/// Where a replicated actor is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpawnPlacement {
    /// Absolute world transform, optionally attached to the source entity
    /// keeping the world transform.
    World {
        /// World location.
        location: Vec3,
        /// World rotation.
        rotation: Rotator,
        /// Attach to the source entity after spawning.
        attach_to_owner: bool,
    },
    /// Offset from the source entity and always attached to it.
    OwnerRelative {
        /// Attachment socket; `None` attaches to the root.
        socket: Option<String>,
        /// Offset added to the owner's location.
        location_offset: Vec3,
        /// Offset added to the owner's rotation.
        rotation_offset: Rotator,
    },
}

/// Spawn an actor of the given class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSpawn {
    /// Actor class asset.
    pub class: AssetPath,
    /// Placement rule.
    pub placement: SpawnPlacement,
}

/// Spawn a visual effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpawn {
    /// Effect system asset.
    pub effect: AssetPath,
    /// World location.
    pub location: Vec3,
    /// World rotation.
    pub rotation: Rotator,
    /// Attach to the source entity's root.
    pub attach_to_owner: bool,
    /// Attachment socket when attached.
    pub socket: Option<String>,
}

/// Kind tag of a [`VariableValue`]. The discriminants are the wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VariableKind {
    /// Text.
    String = 0,
    /// 32-bit float.
    Float = 1,
    /// 32-bit integer.
    Int = 2,
    /// Boolean.
    Bool = 3,
    /// 3D vector.
    Vector = 4,
}

impl VariableKind {
    /// Numeric wire code of this kind.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Typed value of a replicated variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableValue {
    /// Text value.
    String(String),
    /// Float value.
    Float(f32),
    /// Integer value.
    Int(i32),
    /// Boolean value.
    Bool(bool),
    /// Vector value.
    Vector(Vec3),
}

impl VariableValue {
    /// The kind tag for this value.
    pub fn kind(&self) -> VariableKind {
        match self {
            Self::String(_) => VariableKind::String,
            Self::Float(_) => VariableKind::Float,
            Self::Int(_) => VariableKind::Int,
            Self::Bool(_) => VariableKind::Bool,
            Self::Vector(_) => VariableKind::Vector,
        }
    }

    /// Text form delivered to observers alongside the typed value.
    pub fn render(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Float(v) => format!("{v:.6}"),
            Self::Int(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Vector(v) => v.to_string(),
        }
    }
}

/// A named variable and its new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedVariable {
    /// Variable name.
    pub name: String,
    /// New value.
    pub value: VariableValue,
}

impl NamedVariable {
    /// Creates a named variable.
    pub fn new(name: impl Into<String>, value: VariableValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A user-defined event with a free-form string payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    /// Event name.
    pub name: String,
    /// Payload, passed through verbatim.
    pub data: String,
}

impl CustomEvent {
    /// Creates a custom event.
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Motion-matching trajectory sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Sampled position.
    pub position: Vec3,
    /// Sampled rotation.
    pub rotation: Rotator,
}

// ---------------------------------------------------------------------------
// StateChange
// ---------------------------------------------------------------------------

/// Every kind of change the relay can replicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateChange {
    /// Play a montage.
    AnimationPlay(AnimationPlay),
    /// Stop a montage.
    AnimationStop(AnimationStop),
    /// Play a sound on the source entity.
    Sound(SoundPlay),
    /// Play a sound at a location.
    SoundAtLocation(SoundAtLocation),
    /// Spawn an actor.
    ActorSpawn(ActorSpawn),
    /// Spawn a visual effect.
    EffectSpawn(EffectSpawn),
    /// Set a named variable.
    Variable(NamedVariable),
    /// Fire a custom event.
    CustomEvent(CustomEvent),
    /// Switch the motion-matching database.
    MotionMatchingDatabase {
        /// Database asset.
        database: AssetPath,
    },
    /// Switch the pose-search schema.
    PoseSearchSchema {
        /// Schema asset.
        schema: AssetPath,
    },
    /// Publish a trajectory sample.
    Trajectory(Trajectory),
}

impl StateChange {
    /// Short, stable name of the variant, used in logs and stats.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AnimationPlay(_) => "AnimationPlay",
            Self::AnimationStop(_) => "AnimationStop",
            Self::Sound(_) => "Sound",
            Self::SoundAtLocation(_) => "SoundAtLocation",
            Self::ActorSpawn(_) => "ActorSpawn",
            Self::EffectSpawn(_) => "EffectSpawn",
            Self::Variable(_) => "Variable",
            Self::CustomEvent(_) => "CustomEvent",
            Self::MotionMatchingDatabase { .. } => "MotionMatchingDatabase",
            Self::PoseSearchSchema { .. } => "PoseSearchSchema",
            Self::Trajectory(_) => "Trajectory",
        }
    }

    /// Checks that the primary payload is present.
    ///
    /// The primary payload is the asset for asset-driven changes, the name
    /// for variables and events, and finite coordinates for trajectories.
    pub fn validate(&self) -> Result<(), RejectionReason> {
        let missing = match self {
            Self::AnimationPlay(p) if p.montage.is_none() => Some("montage"),
            Self::AnimationStop(p) if p.montage.is_none() => Some("montage"),
            Self::Sound(p) if p.sound.is_none() => Some("sound"),
            Self::SoundAtLocation(p) if p.sound.is_none() => Some("sound"),
            Self::ActorSpawn(p) if p.class.is_none() => Some("actor class"),
            Self::EffectSpawn(p) if p.effect.is_none() => Some("effect"),
            Self::Variable(v) if v.name.trim().is_empty() => Some("variable name"),
            Self::CustomEvent(e) if e.name.trim().is_empty() => Some("event name"),
            Self::MotionMatchingDatabase { database } if database.is_none() => Some("database"),
            Self::PoseSearchSchema { schema } if schema.is_none() => Some("schema"),
            Self::Trajectory(t) if !t.position.is_finite() || !t.rotation.is_finite() => {
                Some("trajectory")
            }
            _ => None,
        };
        match missing {
            Some(field) => Err(RejectionReason::InvalidPayload {
                change: self.label(),
                field,
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// StateChangeRequest
// ---------------------------------------------------------------------------

/// One replication request: who asked, what changes, and when it was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeRequest {
    source: EntityHandle,
    change: StateChange,
    origin_time: f64,
}

impl StateChangeRequest {
    /// Builds a request issued by `source` at `origin_time` (seconds).
    pub fn new(source: EntityHandle, change: StateChange, origin_time: f64) -> Self {
        Self {
            source,
            change,
            origin_time,
        }
    }

    /// The entity the change applies to.
    pub fn source(&self) -> EntityHandle {
        self.source
    }

    /// The requested change.
    pub fn change(&self) -> &StateChange {
        &self.change
    }

    /// When the originator issued the request, in its own clock's seconds.
    pub fn origin_time(&self) -> f64 {
        self.origin_time
    }

    /// Validates the primary payload; see [`StateChange::validate`].
    pub fn validate(&self) -> Result<(), RejectionReason> {
        self.change.validate()
    }
}
