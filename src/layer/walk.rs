//! Basic walking layer

use super::{lerp_states, MotionLayer};
use crate::types::{CharacterId, MotionState, PhysicsInput};

/// Distance covered per unit of speed per second
pub const WALKING_SPEED: f32 = 1.0;
/// Highest speed accepted by validation
pub const MAX_WALK_SPEED: f32 = 10.0;
/// Downward acceleration applied by the physics step
pub const GRAVITY: f32 = 9.81;

/// Moves characters along their yaw heading at constant pace
#[derive(Debug, Clone, Default)]
pub struct BasicWalkLayer;

impl BasicWalkLayer {
    pub fn new() -> Self {
        Self
    }
}

impl MotionLayer for BasicWalkLayer {
    fn name(&self) -> &str {
        "basic_walk"
    }

    fn process_motion(&self, _character_id: CharacterId, state: &MotionState, delta_seconds: f32) -> MotionState {
        if state.speed() <= 0.0 {
            return *state;
        }
        state.advanced(state.speed() * WALKING_SPEED * delta_seconds)
    }

    fn process_physics(&self, character_id: CharacterId, input: &PhysicsInput) -> MotionState {
        let p = input.position;
        let y = (p.y - GRAVITY * input.delta_seconds).max(0.0);
        MotionState::new(character_id, p.offset(0.0, y - p.y, 0.0), input.rotation, input.speed)
    }

    fn validate_motion_state(&self, state: &MotionState) -> bool {
        (0.0..=MAX_WALK_SPEED).contains(&state.speed())
    }

    fn interpolate_states(&self, start: &MotionState, end: &MotionState, factor: f32) -> MotionState {
        lerp_states(start, end, factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, Rotation};

    #[test]
    fn test_walks_along_yaw() {
        let layer = BasicWalkLayer::new();
        let id = CharacterId::new();
        let state = MotionState::rest(id).with_speed(2.0);
        let next = layer.process_motion(id, &state, 0.5);
        assert!((next.position().x - 1.0).abs() < 1e-5);
        assert!(next.position().z.abs() < 1e-5);
        assert_eq!(next.speed(), 2.0);
    }

    #[test]
    fn test_resting_state_untouched() {
        let layer = BasicWalkLayer::new();
        let id = CharacterId::new();
        let state = MotionState::rest(id).with_rotation(Rotation::new(0.0, 45.0, 0.0));
        assert_eq!(layer.process_motion(id, &state, 1.0), state);
    }

    #[test]
    fn test_gravity_clamps_at_ground() {
        let layer = BasicWalkLayer::new();
        let id = CharacterId::new();
        let state = MotionState::rest(id).with_position(Position::new(0.0, 0.5, 0.0));
        let fallen = layer.process_physics(id, &PhysicsInput::from_state(&state, 0.01));
        assert!((fallen.position().y - (0.5 - 0.0981)).abs() < 1e-5);
        let grounded = layer.process_physics(id, &PhysicsInput::from_state(&state, 1.0));
        assert_eq!(grounded.position().y, 0.0);
    }

    #[test]
    fn test_speed_ceiling() {
        let layer = BasicWalkLayer::new();
        let state = MotionState::rest(CharacterId::new());
        assert!(layer.validate_motion_state(&state.with_speed(10.0)));
        assert!(!layer.validate_motion_state(&state.with_speed(10.5)));
    }
}
