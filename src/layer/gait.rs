//! Advanced walking layer with selectable gaits
//!
//! Each character walks with its own [`Gait`]. The gait controls stride length,
//! vertical bob, body sway, gravity response and the highest speed the layer
//! accepts. A per-character step cycle in `[0, 2π)` drives the oscillations.

use super::walk::GRAVITY;
use super::{lerp_states, MotionLayer, Staged, Sway};
use crate::types::{CharacterId, MotionState, PhysicsInput};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::fmt;

/// Walking style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gait {
    #[default]
    Normal,
    Sneaking,
    Limping,
}

/// Numeric parameters of a gait
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitProfile {
    /// Distance per unit of speed per second
    pub step_length: f32,
    /// Peak vertical bob
    pub step_height: f32,
    /// Highest speed accepted by validation
    pub max_speed: f32,
    /// Multiplier on gravity in the physics step
    pub gravity_scale: f32,
}

impl Gait {
    pub fn profile(&self) -> GaitProfile {
        match self {
            Gait::Normal => GaitProfile {
                step_length: 0.6,
                step_height: 0.1,
                max_speed: 1.0,
                gravity_scale: 1.0,
            },
            Gait::Sneaking => GaitProfile {
                step_length: 0.3,
                step_height: 0.05,
                max_speed: 0.5,
                gravity_scale: 0.5,
            },
            Gait::Limping => GaitProfile {
                step_length: 0.4,
                step_height: 0.15,
                max_speed: 0.7,
                gravity_scale: 0.8,
            },
        }
    }

    /// Bob and sway at a point of the step cycle
    fn sway(&self, cycle: f32) -> Sway {
        let height = self.profile().step_height;
        match self {
            // asymmetric: one leg never lifts the body
            Gait::Limping => Sway {
                height: height * (cycle.sin() * (1.0 + 0.5 * (cycle / 2.0).sin())).max(0.0),
                pitch: 3.0 * (cycle / 2.0).sin(),
                roll: 4.0 * cycle.sin(),
            },
            Gait::Sneaking => Sway {
                height: height * cycle.sin().abs(),
                pitch: cycle.sin(),
                roll: (cycle * 2.0).sin(),
            },
            Gait::Normal => Sway {
                height: height * cycle.sin(),
                pitch: 2.0 * cycle.sin(),
                roll: 2.0 * (cycle * 2.0).sin(),
            },
        }
    }
}

impl fmt::Display for Gait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gait::Normal => write!(f, "normal"),
            Gait::Sneaking => write!(f, "sneaking"),
            Gait::Limping => write!(f, "limping"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Stride {
    cycle: f32,
    applied: Sway,
}

/// Gait-aware walking
#[derive(Debug, Default)]
pub struct AdvancedWalkLayer {
    gaits: DashMap<CharacterId, Gait>,
    strides: Staged<Stride>,
}

impl AdvancedWalkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the gait for a character
    pub fn set_gait(&self, character_id: CharacterId, gait: Gait) {
        self.gaits.insert(character_id, gait);
    }

    /// Current gait for a character, `Normal` if never set
    pub fn gait(&self, character_id: CharacterId) -> Gait {
        self.gaits.get(&character_id).map(|g| *g).unwrap_or_default()
    }

    /// Current step cycle phase, in `[0, 2π)`
    pub fn step_cycle(&self, character_id: CharacterId) -> f32 {
        self.strides.current(character_id).cycle
    }
}

impl MotionLayer for AdvancedWalkLayer {
    fn name(&self) -> &str {
        "advanced_walk"
    }

    fn process_motion(&self, character_id: CharacterId, state: &MotionState, delta_seconds: f32) -> MotionState {
        let gait = self.gait(character_id);
        let mut stride = self.strides.current(character_id);

        let next = if state.speed() <= 0.0 {
            // settle back onto the unswayed pose
            let settled = Sway::default().apply_over(&stride.applied, state);
            stride.applied = Sway::default();
            settled
        } else {
            if delta_seconds.is_finite() && delta_seconds > 0.0 {
                stride.cycle = (stride.cycle + delta_seconds * state.speed()).rem_euclid(TAU);
            }
            let target = gait.sway(stride.cycle);
            let walked = state.advanced(state.speed() * gait.profile().step_length * delta_seconds);
            let swayed = target.apply_over(&stride.applied, &walked);
            stride.applied = target;
            swayed
        };

        self.strides.stage(character_id, stride);
        next
    }

    fn process_physics(&self, character_id: CharacterId, input: &PhysicsInput) -> MotionState {
        let scale = self.gait(character_id).profile().gravity_scale;
        let p = input.position;
        let y = (p.y - GRAVITY * input.delta_seconds * scale).max(0.0);
        MotionState::new(character_id, p.offset(0.0, y - p.y, 0.0), input.rotation, input.speed)
    }

    fn validate_motion_state(&self, state: &MotionState) -> bool {
        state.speed() <= self.gait(state.character_id()).profile().max_speed
    }

    fn interpolate_states(&self, start: &MotionState, end: &MotionState, factor: f32) -> MotionState {
        lerp_states(start, end, factor)
    }

    fn reset(&self, character_id: CharacterId) {
        self.strides.remove(character_id);
        self.gaits.remove(&character_id);
    }

    fn on_commit(&self, character_id: CharacterId, _state: &MotionState) {
        self.strides.promote(character_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::commit_step;
    use crate::types::{Position, Rotation};

    #[test]
    fn test_default_gait_is_normal() {
        let layer = AdvancedWalkLayer::new();
        assert_eq!(layer.gait(CharacterId::new()), Gait::Normal);
    }

    #[test]
    fn test_step_length_depends_on_gait() {
        let layer = AdvancedWalkLayer::new();
        let normal = CharacterId::new();
        let sneaky = CharacterId::new();
        layer.set_gait(sneaky, Gait::Sneaking);

        let a = layer.process_motion(normal, &MotionState::rest(normal).with_speed(0.5), 1.0);
        let b = layer.process_motion(sneaky, &MotionState::rest(sneaky).with_speed(0.5), 1.0);
        assert!((a.position().x - 0.3).abs() < 1e-5);
        assert!((b.position().x - 0.15).abs() < 1e-5);
    }

    #[test]
    fn test_cycle_wraps() {
        let layer = AdvancedWalkLayer::new();
        let id = CharacterId::new();
        let mut state = MotionState::rest(id).with_speed(1.0);
        for _ in 0..100 {
            state = commit_step(&layer, id, &state, 0.5);
            let cycle = layer.step_cycle(id);
            assert!((0.0..TAU).contains(&cycle));
        }
    }

    #[test]
    fn test_limp_never_dips_below_walk_line() {
        for i in 0..64 {
            let cycle = i as f32 * TAU / 64.0;
            assert!(Gait::Limping.sway(cycle).height >= 0.0);
            assert!(Gait::Sneaking.sway(cycle).height >= 0.0);
        }
    }

    #[test]
    fn test_validation_uses_gait_ceiling() {
        let layer = AdvancedWalkLayer::new();
        let id = CharacterId::new();
        let state = MotionState::rest(id).with_speed(0.6);
        assert!(layer.validate_motion_state(&state));
        layer.set_gait(id, Gait::Sneaking);
        assert!(!layer.validate_motion_state(&state));
        layer.set_gait(id, Gait::Limping);
        assert!(layer.validate_motion_state(&state));
    }

    #[test]
    fn test_stopping_removes_sway() {
        let layer = AdvancedWalkLayer::new();
        let id = CharacterId::new();
        let walking = commit_step(&layer, id, &MotionState::rest(id).with_speed(1.0), 0.7);
        assert!(walking.rotation().pitch.abs() > 0.0);
        let stopped = commit_step(&layer, id, &walking.with_speed(0.0), 0.0);
        assert!(stopped.position().y.abs() < 1e-6);
        assert!(stopped.rotation().pitch.abs() < 1e-5);
        assert!(stopped.rotation().roll.abs() < 1e-5);
    }

    #[test]
    fn test_fresh_pose_is_swayed_from_scratch() {
        let layer = AdvancedWalkLayer::new();
        let id = CharacterId::new();
        let mut state = MotionState::rest(id).with_speed(0.5);
        for _ in 0..40 {
            // every frame starts from a clean keyframe pose
            let keyframe = state.with_pose(Position::ORIGIN, Rotation::IDENTITY);
            let next = layer.process_motion(id, &keyframe, 1.0 / 60.0);
            layer.on_commit(id, &next);
            let sway = Gait::Normal.sway(layer.step_cycle(id));
            assert!((next.position().y - sway.height).abs() < 1e-5);
            assert!((next.rotation().roll - sway.roll).abs() < 1e-4);
            state = next;
        }
        let stopped = commit_step(&layer, id, &state.with_speed(0.0), 0.0);
        assert!(stopped.position().y.abs() < 1e-5);
        assert!(stopped.rotation().pitch.abs() < 1e-4);
        assert!(stopped.rotation().roll.abs() < 1e-4);
    }

    #[test]
    fn test_rejected_fold_does_not_advance_stride() {
        let layer = AdvancedWalkLayer::new();
        let id = CharacterId::new();
        let walking = commit_step(&layer, id, &MotionState::rest(id).with_speed(1.0), 0.5);
        let cycle = layer.step_cycle(id);

        // staged but never committed
        layer.process_motion(id, &walking, 0.5);
        assert_eq!(layer.step_cycle(id), cycle);

        let stopped = commit_step(&layer, id, &walking.with_speed(0.0), 0.0);
        assert!(stopped.position().y.abs() < 1e-6);
        assert!(stopped.rotation().roll.abs() < 1e-5);
    }

    #[test]
    fn test_sneaking_gravity_is_halved() {
        let layer = AdvancedWalkLayer::new();
        let id = CharacterId::new();
        layer.set_gait(id, Gait::Sneaking);
        let state = MotionState::rest(id).with_position(Position::new(0.0, 1.0, 0.0));
        let out = layer.process_physics(id, &PhysicsInput::from_state(&state, 0.1));
        assert!((out.position().y - (1.0 - 0.4905)).abs() < 1e-5);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let layer = AdvancedWalkLayer::new();
        let id = CharacterId::new();
        layer.set_gait(id, Gait::Limping);
        commit_step(&layer, id, &MotionState::rest(id).with_speed(0.5), 0.3);
        assert!(layer.step_cycle(id) > 0.0);
        layer.reset(id);
        layer.reset(id);
        assert_eq!(layer.gait(id), Gait::Normal);
        assert_eq!(layer.step_cycle(id), 0.0);
    }
}
