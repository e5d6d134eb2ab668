//! Scripted gameplay traffic used by every demo mode.

use std::cell::Cell;
use std::rc::Rc;

use netrep_relay::{
    AnimationPlay, CustomEvent, EffectSpawn, EntityHandle, NamedVariable, ReplicationListeners,
    Rotator, SoundAtLocation, StateChange, VariableValue, Vec3,
};

/// The `step`-th change in a repeating five-step script.
pub fn change(step: usize) -> StateChange {
    let x = step as f32;
    match step % 5 {
        0 => StateChange::AnimationPlay(AnimationPlay::new("/Game/Anims/Wave")),
        1 => StateChange::Variable(NamedVariable::new(
            "health",
            VariableValue::Int(100 - (step % 100) as i32),
        )),
        2 => StateChange::CustomEvent(CustomEvent::new("Jump", "height=2.0")),
        3 => StateChange::SoundAtLocation(SoundAtLocation {
            sound: "/Game/Sounds/Footstep".into(),
            location: Vec3::new(x * 10.0, 0.0, 0.0),
            volume: 0.8,
            pitch: 1.0,
            start_time: 0.0,
        }),
        _ => StateChange::EffectSpawn(EffectSpawn {
            effect: "/Game/FX/Sparks".into(),
            location: Vec3::new(0.0, x, 0.0),
            rotation: Rotator::ZERO,
            attach_to_owner: false,
            socket: None,
        }),
    }
}

/// Source entity for the `step`-th change, cycling over `entities` handles
/// starting at 1.
pub fn source(step: usize, entities: usize) -> EntityHandle {
    EntityHandle(1 + (step % entities.max(1)) as u64)
}

/// Counts every change applied through `listeners`.
pub fn count_applied(listeners: &mut ReplicationListeners) -> Rc<Cell<usize>> {
    let applied = Rc::new(Cell::new(0));
    let bump = |counter: &Rc<Cell<usize>>| {
        let counter = Rc::clone(counter);
        move || counter.set(counter.get() + 1)
    };
    let on = bump(&applied);
    listeners.on_animation(move |_, _| on());
    let on = bump(&applied);
    listeners.on_variable(move |_, _| on());
    let on = bump(&applied);
    listeners.on_custom_event(move |_, _| on());
    let on = bump(&applied);
    listeners.on_sound_at_location(move |_, _| on());
    let on = bump(&applied);
    listeners.on_effect(move |_, _| on());
    applied
}
