//! Motion layer contract and built-in layers
//!
//! ## Table of Contents
//! - **MotionLayer**: Trait every behavior module implements
//! - **SharedLayer**: Reference-counted handle used by the registry
//! - **IdleLayer**: Breathing and head sway at rest
//! - **BasicWalkLayer**: Constant-speed walking with gravity
//! - **AdvancedWalkLayer**: Gait-parameterized walking
//! - **RunLayer**: Stamina-limited running

mod gait;
mod idle;
mod run;
mod walk;

pub use gait::{AdvancedWalkLayer, Gait, GaitProfile};
pub use idle::IdleLayer;
pub use run::{RunLayer, MAX_STAMINA};
pub use walk::BasicWalkLayer;

use crate::types::{CharacterId, CollisionInfo, MotionState, PhysicsInput};
use dashmap::DashMap;
use std::sync::Arc;

/// Behavior module folded over a character's candidate state
///
/// Layers run in descending priority order; each layer receives the previous
/// layer's output. Per-character auxiliary state (gait phase, stamina) is owned
/// by the layer and must be keyed by character and safe for concurrent access,
/// since pipeline runs for different characters proceed in parallel.
///
/// Only [`process_motion`](MotionLayer::process_motion) is required; the
/// remaining hooks default to permissive or passthrough behavior.
///
/// # Example
///
/// ```rust,ignore
/// use motion_engine::layer::MotionLayer;
/// use motion_engine::types::{CharacterId, MotionState};
///
/// struct Slowdown;
///
/// impl MotionLayer for Slowdown {
///     fn name(&self) -> &str {
///         "slowdown"
///     }
///
///     fn process_motion(&self, _id: CharacterId, state: &MotionState, _dt: f32) -> MotionState {
///         state.with_speed(state.speed() * 0.5)
///     }
/// }
/// ```
pub trait MotionLayer: Send + Sync {
    /// Layer name for logs, metrics and listings
    fn name(&self) -> &str;

    /// Transform the state over `delta_seconds`; must not block
    fn process_motion(&self, character_id: CharacterId, state: &MotionState, delta_seconds: f32) -> MotionState;

    /// Report an obstruction for the candidate state
    fn check_collision(&self, _character_id: CharacterId, _state: &MotionState) -> Option<CollisionInfo> {
        None
    }

    /// Apply gravity or acceleration; passes the input through by default
    fn process_physics(&self, character_id: CharacterId, input: &PhysicsInput) -> MotionState {
        MotionState::new(character_id, input.position, input.rotation, input.speed)
    }

    /// Layer-specific plausibility check
    fn validate_motion_state(&self, _state: &MotionState) -> bool {
        true
    }

    /// Blend between two states; no smoothing by default
    fn interpolate_states(&self, _start: &MotionState, end: &MotionState, _factor: f32) -> MotionState {
        *end
    }

    /// Clear per-character auxiliary state; must be idempotent
    fn reset(&self, _character_id: CharacterId) {}

    /// Called once a fold this layer took part in has been accepted
    ///
    /// Layers that stage auxiliary state in `process_motion` promote it here,
    /// so a run rejected by any layer leaves that state untouched. The state
    /// passed in is the one the store now holds.
    fn on_commit(&self, _character_id: CharacterId, _state: &MotionState) {}
}

/// Shared handle to a layer; identity is the allocation
pub type SharedLayer = Arc<dyn MotionLayer>;

/// True if both handles point at the same layer instance
pub fn same_layer(a: &SharedLayer, b: &SharedLayer) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Clamp an interpolation factor to [0, 1]; NaN becomes 0
pub fn clamp_factor(factor: f32) -> f32 {
    if factor.is_nan() {
        0.0
    } else {
        factor.clamp(0.0, 1.0)
    }
}

/// Ease-out curve `1 - (1 - f)^power`
pub fn damped_factor(factor: f32, power: i32) -> f32 {
    1.0 - (1.0 - clamp_factor(factor)).powi(power)
}

/// Independent linear blend of position, rotation and speed
pub fn lerp_states(start: &MotionState, end: &MotionState, factor: f32) -> MotionState {
    let f = clamp_factor(factor);
    start
        .with_pose(
            start.position().lerp(&end.position(), f),
            start.rotation().lerp(&end.rotation(), f),
        )
        .with_speed(start.speed() + (end.speed() - start.speed()) * f)
}

/// Oscillating displacement a layer has added on top of a state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Sway {
    pub height: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Sway {
    /// Put `self` on the state in place of `previous`
    ///
    /// `previous` is the offset the layer left on the committed pose. It is
    /// removed only from components the state still carries; a replaced
    /// component is already an unswayed base.
    pub fn apply_over(&self, previous: &Sway, state: &MotionState) -> MotionState {
        let carry = state.carry();
        let (height, pitch, roll) = (
            if carry.height { previous.height } else { 0.0 },
            if carry.tilt { previous.pitch } else { 0.0 },
            if carry.tilt { previous.roll } else { 0.0 },
        );
        let position = state.position().offset(0.0, self.height - height, 0.0);
        let mut rotation = state.rotation();
        rotation.pitch += self.pitch - pitch;
        rotation.roll += self.roll - roll;
        state.with_pose(position, rotation)
    }
}

/// Per-character auxiliary record that only advances with accepted folds
///
/// `process_motion` reads the committed value and stages its successor;
/// `on_commit` promotes the staged value. Runs for one character are
/// serialized by the pipeline, so one staged slot per character is enough.
#[derive(Debug)]
pub(crate) struct Staged<T> {
    committed: DashMap<CharacterId, T>,
    pending: DashMap<CharacterId, T>,
}

impl<T> Default for Staged<T> {
    fn default() -> Self {
        Self {
            committed: DashMap::new(),
            pending: DashMap::new(),
        }
    }
}

impl<T: Clone + Default> Staged<T> {
    /// Committed value, or the initial one
    pub fn current(&self, character_id: CharacterId) -> T {
        self.committed
            .get(&character_id)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn get(&self, character_id: CharacterId) -> Option<T> {
        self.committed.get(&character_id).map(|v| v.value().clone())
    }

    pub fn stage(&self, character_id: CharacterId, value: T) {
        self.pending.insert(character_id, value);
    }

    pub fn promote(&self, character_id: CharacterId) {
        if let Some((_, value)) = self.pending.remove(&character_id) {
            self.committed.insert(character_id, value);
        }
    }

    pub fn remove(&self, character_id: CharacterId) {
        self.pending.remove(&character_id);
        self.committed.remove(&character_id);
    }
}

/// Run a layer the way an accepted pipeline fold does
#[cfg(test)]
pub(crate) fn commit_step(
    layer: &dyn MotionLayer,
    character_id: CharacterId,
    state: &MotionState,
    delta_seconds: f32,
) -> MotionState {
    use crate::types::PoseCarry;
    let carried = state.with_carry(PoseCarry { height: true, tilt: true });
    let next = layer.process_motion(character_id, &carried, delta_seconds);
    layer.on_commit(character_id, &next);
    next.with_carry(PoseCarry::default())
}
