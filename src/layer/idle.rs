//! Idle layer: breathing and slow head movement while standing

use super::{damped_factor, MotionLayer, Staged, Sway};
use crate::types::{CharacterId, MotionState, PhysicsInput};

/// Vertical breathing amplitude
const BREATHING_AMPLITUDE: f32 = 0.02;
/// Head pitch amplitude in degrees
const HEAD_SWAY_DEGREES: f32 = 2.0;
/// Head movement runs at a third of the breathing frequency
const HEAD_SWAY_PERIOD_RATIO: f32 = 3.0;

#[derive(Debug, Clone, Copy, Default)]
struct Breath {
    /// Seconds spent at rest
    elapsed: f32,
    applied: Sway,
}

/// Adds a subtle breathing motion to characters at zero speed
///
/// Moving characters pass through unchanged apart from removing any breathing
/// offset still applied to them.
#[derive(Debug, Default)]
pub struct IdleLayer {
    breaths: Staged<Breath>,
}

impl IdleLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MotionLayer for IdleLayer {
    fn name(&self) -> &str {
        "idle"
    }

    fn process_motion(&self, character_id: CharacterId, state: &MotionState, delta_seconds: f32) -> MotionState {
        let mut breath = self.breaths.current(character_id);
        let target = if state.speed() > 0.0 {
            Sway::default()
        } else {
            if delta_seconds.is_finite() && delta_seconds > 0.0 {
                breath.elapsed += delta_seconds;
            }
            let t = breath.elapsed;
            Sway {
                height: t.sin() * BREATHING_AMPLITUDE,
                pitch: (t / HEAD_SWAY_PERIOD_RATIO).sin() * HEAD_SWAY_DEGREES,
                roll: 0.0,
            }
        };
        let next = target.apply_over(&breath.applied, state);
        breath.applied = target;
        self.breaths.stage(character_id, breath);
        next
    }

    fn process_physics(&self, character_id: CharacterId, input: &PhysicsInput) -> MotionState {
        // resting characters carry no momentum
        let speed = if input.speed > 0.0 { input.speed } else { 0.0 };
        MotionState::new(character_id, input.position, input.rotation, speed)
    }

    fn validate_motion_state(&self, state: &MotionState) -> bool {
        state.speed().is_finite() && state.speed() >= 0.0
    }

    fn interpolate_states(&self, start: &MotionState, end: &MotionState, factor: f32) -> MotionState {
        let position_factor = damped_factor(factor, 3);
        let rotation_factor = damped_factor(factor, 2);
        let linear = super::clamp_factor(factor);
        start
            .with_pose(
                start.position().lerp(&end.position(), position_factor),
                start.rotation().lerp(&end.rotation(), rotation_factor),
            )
            .with_speed(start.speed() + (end.speed() - start.speed()) * linear)
    }

    fn reset(&self, character_id: CharacterId) {
        self.breaths.remove(character_id);
    }

    fn on_commit(&self, character_id: CharacterId, _state: &MotionState) {
        self.breaths.promote(character_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::commit_step;
    use crate::types::{Position, Rotation};

    #[test]
    fn test_moving_state_passes_through() {
        let layer = IdleLayer::new();
        let id = CharacterId::new();
        let state = MotionState::rest(id).with_speed(1.0).with_rotation(Rotation::new(0.0, 30.0, 0.0));
        assert_eq!(layer.process_motion(id, &state, 0.5), state);
    }

    #[test]
    fn test_breathing_is_bounded_and_does_not_drift() {
        let layer = IdleLayer::new();
        let id = CharacterId::new();
        let mut state = MotionState::rest(id);
        for _ in 0..600 {
            state = commit_step(&layer, id, &state, 1.0 / 60.0);
            assert!(state.position().y.abs() <= BREATHING_AMPLITUDE + 1e-5);
            assert!(state.rotation().pitch.abs() <= HEAD_SWAY_DEGREES + 1e-4);
        }
        assert_eq!(state.speed(), 0.0);
    }

    #[test]
    fn test_breathing_removed_when_moving() {
        let layer = IdleLayer::new();
        let id = CharacterId::new();
        let resting = commit_step(&layer, id, &MotionState::rest(id), 1.0);
        assert!(resting.position().y != 0.0);
        let moving = commit_step(&layer, id, &resting.with_speed(1.0), 0.0);
        assert!(moving.position().y.abs() < 1e-6);
        assert!(moving.rotation().pitch.abs() < 1e-5);
    }

    #[test]
    fn test_uncommitted_breath_does_not_advance() {
        let layer = IdleLayer::new();
        let id = CharacterId::new();
        let rest = MotionState::rest(id);
        let first = layer.process_motion(id, &rest, 1.0);
        // the first run was never committed, so this one starts from the same phase
        let again = layer.process_motion(id, &rest, 1.0);
        assert_eq!(first, again);
    }

    #[test]
    fn test_zero_delta_keeps_pose() {
        let layer = IdleLayer::new();
        let id = CharacterId::new();
        let state = MotionState::rest(id).with_position(Position::new(1.0, 0.0, 2.0));
        assert_eq!(commit_step(&layer, id, &state, 0.0), state);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let layer = IdleLayer::new();
        let id = CharacterId::new();
        commit_step(&layer, id, &MotionState::rest(id), 1.0);
        assert!(layer.breaths.get(id).is_some());
        layer.reset(id);
        assert!(layer.breaths.get(id).is_none());
        layer.reset(id);
        assert!(layer.breaths.get(id).is_none());
    }

    #[test]
    fn test_damped_interpolation() {
        let layer = IdleLayer::new();
        let id = CharacterId::new();
        let start = MotionState::rest(id);
        let end = start
            .with_position(Position::new(8.0, 0.0, 0.0))
            .with_rotation(Rotation::new(0.0, 40.0, 0.0));
        let mid = layer.interpolate_states(&start, &end, 0.5);
        assert!((mid.position().x - 7.0).abs() < 1e-5);
        assert!((mid.rotation().yaw - 30.0).abs() < 1e-4);
    }
}
