//! Typed listeners invoked when a change is applied.
//!
//! Each change category has its own registration method. Listeners run
//! synchronously, in registration order, every time the dispatcher applies a
//! change of that category (on the authority and on every observer alike).

use crate::registry::EntityHandle;
use crate::request::{
    ActorSpawn, AnimationPlay, AnimationStop, AssetPath, CustomEvent, EffectSpawn, NamedVariable,
    SoundAtLocation, SoundPlay, StateChange, Trajectory,
};

/// Handle returned by every `on_*` method; pass to [`ReplicationListeners::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<P> = Box<dyn FnMut(EntityHandle, &P)>;

struct Slot<P> {
    entries: Vec<(ListenerId, Callback<P>)>,
}

impl<P> Default for Slot<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<P> Slot<P> {
    fn push(&mut self, id: ListenerId, callback: Callback<P>) {
        self.entries.push((id, callback));
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    fn emit(&mut self, source: EntityHandle, payload: &P) -> usize {
        for (_, callback) in &mut self.entries {
            callback(source, payload);
        }
        self.entries.len()
    }
}

/// Per-category listener lists.
#[derive(Default)]
pub struct ReplicationListeners {
    next_id: u64,
    animation: Slot<AnimationPlay>,
    animation_stop: Slot<AnimationStop>,
    sound: Slot<SoundPlay>,
    sound_at_location: Slot<SoundAtLocation>,
    actor_spawned: Slot<ActorSpawn>,
    effect: Slot<EffectSpawn>,
    variable: Slot<NamedVariable>,
    custom_event: Slot<CustomEvent>,
    motion_matching: Slot<AssetPath>,
    pose_search: Slot<AssetPath>,
    trajectory: Slot<Trajectory>,
}

macro_rules! listener_method {
    ($(#[$doc:meta])* $name:ident, $slot:ident, $payload:ty) => {
        $(#[$doc])*
        pub fn $name<F>(&mut self, callback: F) -> ListenerId
        where
            F: FnMut(EntityHandle, &$payload) + 'static,
        {
            let id = self.allocate_id();
            self.$slot.push(id, Box::new(callback));
            id
        }
    };
}

impl ReplicationListeners {
    /// Creates an empty listener set.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    listener_method!(
        /// Montage started.
        on_animation, animation, AnimationPlay
    );
    listener_method!(
        /// Montage stopped.
        on_animation_stop, animation_stop, AnimationStop
    );
    listener_method!(
        /// Sound played on the source entity.
        on_sound, sound, SoundPlay
    );
    listener_method!(
        /// Sound played at a world location.
        on_sound_at_location, sound_at_location, SoundAtLocation
    );
    listener_method!(
        /// Actor spawned.
        on_actor_spawned, actor_spawned, ActorSpawn
    );
    listener_method!(
        /// Visual effect spawned.
        on_effect, effect, EffectSpawn
    );
    listener_method!(
        /// Variable replicated. Use [`VariableValue::render`](crate::VariableValue::render)
        /// for the text form.
        on_variable, variable, NamedVariable
    );
    listener_method!(
        /// Custom event replicated.
        on_custom_event, custom_event, CustomEvent
    );
    listener_method!(
        /// Motion-matching database switched.
        on_motion_matching, motion_matching, AssetPath
    );
    listener_method!(
        /// Pose-search schema switched.
        on_pose_search, pose_search, AssetPath
    );
    listener_method!(
        /// Trajectory sample published.
        on_trajectory, trajectory, Trajectory
    );

    /// Unregisters a listener. Returns `false` if it was already gone.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.animation.remove(id)
            || self.animation_stop.remove(id)
            || self.sound.remove(id)
            || self.sound_at_location.remove(id)
            || self.actor_spawned.remove(id)
            || self.effect.remove(id)
            || self.variable.remove(id)
            || self.custom_event.remove(id)
            || self.motion_matching.remove(id)
            || self.pose_search.remove(id)
            || self.trajectory.remove(id)
    }

    /// Runs every listener of `change`'s category. Returns how many ran.
    pub fn emit(&mut self, source: EntityHandle, change: &StateChange) -> usize {
        match change {
            StateChange::AnimationPlay(p) => self.animation.emit(source, p),
            StateChange::AnimationStop(p) => self.animation_stop.emit(source, p),
            StateChange::Sound(p) => self.sound.emit(source, p),
            StateChange::SoundAtLocation(p) => self.sound_at_location.emit(source, p),
            StateChange::ActorSpawn(p) => self.actor_spawned.emit(source, p),
            StateChange::EffectSpawn(p) => self.effect.emit(source, p),
            StateChange::Variable(p) => self.variable.emit(source, p),
            StateChange::CustomEvent(p) => self.custom_event.emit(source, p),
            StateChange::MotionMatchingDatabase { database } => {
                self.motion_matching.emit(source, database)
            }
            StateChange::PoseSearchSchema { schema } => self.pose_search.emit(source, schema),
            StateChange::Trajectory(p) => self.trajectory.emit(source, p),
        }
    }
}
