//! Running layer with per-character stamina

use super::{lerp_states, MotionLayer, Staged, Sway};
use crate::types::{CharacterId, MotionState, PhysicsInput};

/// Distance covered per unit of speed per second
pub const RUNNING_SPEED: f32 = 3.0;
/// Speed change per second, both for acceleration and exhausted slowdown
pub const ACCELERATION: f32 = 2.0;
/// Full stamina
pub const MAX_STAMINA: f32 = 100.0;
/// Speed an exhausted runner slows down to
pub const EXHAUSTED_SPEED: f32 = 1.0;

const STAMINA_DRAIN_PER_SEC: f32 = 10.0;
const STAMINA_REGEN_PER_SEC: f32 = 5.0;
const BOB_HEIGHT: f32 = 0.1;
/// Bob phase advance in radians per second
const BOB_RATE: f32 = 5.0;

#[derive(Debug, Clone, Copy)]
struct Runner {
    stamina: f32,
    phase: f32,
    applied: Sway,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            stamina: MAX_STAMINA,
            phase: 0.0,
            applied: Sway::default(),
        }
    }
}

/// Fast movement that drains stamina while moving and recovers it at rest
#[derive(Debug, Default)]
pub struct RunLayer {
    runners: Staged<Runner>,
}

impl RunLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining stamina for a character
    pub fn stamina(&self, character_id: CharacterId) -> f32 {
        self.runners.current(character_id).stamina
    }
}

impl MotionLayer for RunLayer {
    fn name(&self) -> &str {
        "run"
    }

    fn process_motion(&self, character_id: CharacterId, state: &MotionState, delta_seconds: f32) -> MotionState {
        let dt = if delta_seconds.is_finite() { delta_seconds.max(0.0) } else { 0.0 };
        let mut runner = self.runners.current(character_id);
        let mut speed = state.speed();

        let next = if speed <= 0.0 {
            runner.stamina = (runner.stamina + dt * STAMINA_REGEN_PER_SEC).min(MAX_STAMINA);
            let settled = Sway::default().apply_over(&runner.applied, state);
            runner.applied = Sway::default();
            settled
        } else {
            runner.stamina = (runner.stamina - dt * STAMINA_DRAIN_PER_SEC).max(0.0);
            if runner.stamina <= 0.0 && speed > EXHAUSTED_SPEED {
                speed = (speed - ACCELERATION * dt).max(EXHAUSTED_SPEED);
            }
            runner.phase = (runner.phase + dt * BOB_RATE).rem_euclid(std::f32::consts::TAU);

            let target = Sway {
                height: BOB_HEIGHT * runner.phase.sin(),
                ..Sway::default()
            };
            let ran = state.with_speed(speed).advanced(speed * RUNNING_SPEED * dt);
            let bobbed = target.apply_over(&runner.applied, &ran);
            runner.applied = target;
            bobbed
        };

        self.runners.stage(character_id, runner);
        next
    }

    fn process_physics(&self, character_id: CharacterId, input: &PhysicsInput) -> MotionState {
        let speed = if input.speed > 0.0 {
            (input.speed + ACCELERATION * input.delta_seconds).min(RUNNING_SPEED)
        } else {
            input.speed
        };
        MotionState::new(character_id, input.position, input.rotation, speed)
    }

    fn validate_motion_state(&self, state: &MotionState) -> bool {
        state.speed() <= RUNNING_SPEED
    }

    fn interpolate_states(&self, start: &MotionState, end: &MotionState, factor: f32) -> MotionState {
        lerp_states(start, end, factor)
    }

    fn reset(&self, character_id: CharacterId) {
        self.runners.remove(character_id);
    }

    fn on_commit(&self, character_id: CharacterId, _state: &MotionState) {
        self.runners.promote(character_id);
    }
}
