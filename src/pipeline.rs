//! Layer fold and commit
//!
//! Every state change, whether it comes from a façade call or a scheduler tick,
//! goes through [`Pipeline::run`]:
//!
//! 1. Lock the character's lane and load its state (rest state if absent)
//! 2. Build the candidate and stamp it with the next logical timestamp
//! 3. Hold the registry read lock and fold every layer in priority order,
//!    checking contract, validation and collision after each layer
//! 4. Commit the result, release the lane, then notify
//!
//! Runs for the same character never interleave; runs for different
//! characters only share the registry read lock.

use crate::clock::LogicalClock;
use crate::error::{MotionError, Rejection, RejectionCause, Result};
use crate::layer::{clamp_factor, SharedLayer};
use crate::metrics::MotionMetrics;
use crate::registry::{LayerLineup, LayerRegistry};
use crate::store::{CharacterStore, MotionUpdate};
use crate::types::{CharacterId, MotionState, PhysicsInput, PoseCarry};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// What caused a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Direction and speed change
    Direction,
    /// Scheduler tick of an animation playback
    Animation,
    /// Scheduler tick of a moving character without playback
    Motion,
    /// Stop request
    Stop,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Direction => "direction",
            Trigger::Animation => "animation",
            Trigger::Motion => "motion",
            Trigger::Stop => "stop",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared fold-and-commit machinery
pub struct Pipeline {
    registry: Arc<LayerRegistry>,
    store: Arc<CharacterStore>,
    timestamps: LogicalClock,
    lanes: DashMap<CharacterId, Arc<Mutex<()>>>,
    physics_enabled: bool,
    metrics: Option<Arc<MotionMetrics>>,
}

impl Pipeline {
    pub fn new(
        registry: Arc<LayerRegistry>,
        store: Arc<CharacterStore>,
        physics_enabled: bool,
        metrics: Option<Arc<MotionMetrics>>,
    ) -> Self {
        Self {
            registry,
            store,
            timestamps: LogicalClock::new(),
            lanes: DashMap::new(),
            physics_enabled,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<LayerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<CharacterStore> {
        &self.store
    }

    /// Last logical timestamp handed out
    pub fn current_timestamp(&self) -> u64 {
        self.timestamps.current()
    }

    /// Run one state change for a character
    ///
    /// `candidate` receives the current state and returns the proposed one.
    /// A rejection leaves the stored state untouched and is returned as
    /// [`MotionError::Rejected`].
    pub fn run<F>(&self, character_id: CharacterId, trigger: Trigger, delta_seconds: f32, candidate: F) -> Result<MotionState>
    where
        F: FnOnce(&MotionState) -> MotionState,
    {
        self.execute(character_id, trigger, delta_seconds, candidate, true)
            .map(RunOutcome::into_state)
    }

    /// Re-fold the stored state, committing only if the layers changed it
    ///
    /// Layer bookkeeping (stamina, breathing phase) advances either way.
    /// Characters without a stored state are left alone.
    pub fn refresh(&self, character_id: CharacterId, trigger: Trigger, delta_seconds: f32) -> Result<RunOutcome> {
        self.execute(character_id, trigger, delta_seconds, |current| *current, false)
    }

    fn execute<F>(
        &self,
        character_id: CharacterId,
        trigger: Trigger,
        delta_seconds: f32,
        candidate: F,
        commit_unchanged: bool,
    ) -> Result<RunOutcome>
    where
        F: FnOnce(&MotionState) -> MotionState,
    {
        self.with_lane(character_id, |lane| {
            let stored = self.store.get(character_id);
            if stored.is_none() && !commit_unchanged {
                // refreshes never bring a deleted character back
                self.lanes.remove_if(&character_id, |_, l| Arc::ptr_eq(l, lane));
                return Ok(RunOutcome::Unchanged(MotionState::rest(character_id)));
            }
            let current = stored.unwrap_or_else(|| MotionState::rest(character_id));
            let proposed = candidate(&current);
            let carry = PoseCarry::between(&proposed, &current);
            let proposed = proposed
                .with_timestamp(self.timestamps.next())
                .with_carry(carry);

            let lineup = self.registry.lineup();
            let folded = self.fold_lineup(&lineup, character_id, proposed, delta_seconds);
            let state = match folded {
                Ok(state) => state.with_carry(PoseCarry::default()),
                Err(rejection) => {
                    drop(lineup);
                    if !self.store.contains(character_id) {
                        self.lanes.remove_if(&character_id, |_, l| Arc::ptr_eq(l, lane));
                    }
                    return Err(self.rejected(rejection));
                }
            };

            let changed = commit_unchanged || !state.same_motion(&current);
            if changed {
                self.store.commit(state);
            }
            for entry in lineup.entries() {
                let layer = &entry.layer;
                if catch_unwind(AssertUnwindSafe(|| layer.on_commit(character_id, &state))).is_err() {
                    warn!(character_id = %character_id, layer = layer.name(), "Layer commit hook panicked");
                }
            }
            drop(lineup);

            if !changed {
                return Ok(RunOutcome::Unchanged(current));
            }
            Ok(RunOutcome::Committed(state))
        })
        .map(|outcome| {
            if let RunOutcome::Committed(state) = outcome {
                self.committed(character_id, trigger, state);
            }
            outcome
        })
    }

    fn committed(&self, character_id: CharacterId, trigger: Trigger, state: MotionState) {
        debug!(
            character_id = %character_id,
            trigger = %trigger,
            speed = state.speed(),
            timestamp = state.timestamp(),
            "Motion state committed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_commit(trigger);
        }
        self.store.notify(MotionUpdate {
            character_id,
            state,
            trigger,
        });
    }

    fn rejected(&self, rejection: Rejection) -> MotionError {
        if rejection.is_fault() {
            warn!(character_id = %rejection.character_id, layer = %rejection.layer, cause = %rejection.cause, "Layer fault");
        } else {
            debug!(character_id = %rejection.character_id, layer = %rejection.layer, cause = %rejection.cause, "Candidate rejected");
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(&rejection.layer, rejection.cause.label());
        }
        MotionError::Rejected(rejection)
    }

    /// Fold `candidate` through every registered layer without committing
    pub fn fold(&self, character_id: CharacterId, candidate: MotionState, delta_seconds: f32) -> std::result::Result<MotionState, Rejection> {
        let lineup = self.registry.lineup();
        self.fold_lineup(&lineup, character_id, candidate, delta_seconds)
    }

    fn fold_lineup(
        &self,
        lineup: &LayerLineup<'_>,
        character_id: CharacterId,
        candidate: MotionState,
        delta_seconds: f32,
    ) -> std::result::Result<MotionState, Rejection> {
        let timestamp = candidate.timestamp();
        let carry = candidate.carry();
        let mut state = candidate;

        for entry in lineup.entries() {
            let layer = &entry.layer;
            let step = catch_unwind(AssertUnwindSafe(|| {
                self.apply_layer(layer, character_id, &state, delta_seconds)
            }));
            state = match step {
                Ok(Ok(next)) => next.with_timestamp(timestamp).with_carry(carry),
                Ok(Err(cause)) => return Err(Rejection::new(character_id, layer.name(), cause)),
                Err(panic) => {
                    let cause = RejectionCause::Fault(panic_message(panic.as_ref()));
                    return Err(Rejection::new(character_id, layer.name(), cause));
                }
            };
        }
        Ok(state)
    }

    fn apply_layer(
        &self,
        layer: &SharedLayer,
        character_id: CharacterId,
        state: &MotionState,
        delta_seconds: f32,
    ) -> std::result::Result<MotionState, RejectionCause> {
        let mut next = layer.process_motion(character_id, state, delta_seconds);
        if self.physics_enabled {
            next = layer.process_physics(character_id, &PhysicsInput::from_state(&next, delta_seconds));
        }

        if next.character_id() != character_id {
            return Err(RejectionCause::Fault("layer changed the character id".into()));
        }
        if !next.satisfies_contract() {
            return Err(RejectionCause::Fault(format!(
                "layer produced an invalid state (speed {})",
                next.speed()
            )));
        }
        if !layer.validate_motion_state(&next) {
            return Err(RejectionCause::Validation);
        }
        if let Some(collision) = layer.check_collision(character_id, &next) {
            return Err(RejectionCause::Collision(collision));
        }
        Ok(next)
    }

    /// Blend two states with the highest-priority layer's interpolation
    ///
    /// Returns `end` when no layer is registered or the layer panics.
    pub fn interpolate(&self, start: &MotionState, end: &MotionState, factor: f32) -> MotionState {
        let Some(layer) = self.registry.top() else {
            return *end;
        };
        let factor = clamp_factor(factor);
        catch_unwind(AssertUnwindSafe(|| layer.interpolate_states(start, end, factor))).unwrap_or_else(|panic| {
            warn!(layer = layer.name(), reason = %panic_message(panic.as_ref()), "Interpolation panicked");
            *end
        })
    }

    /// Call `reset` on every registered layer for this character
    ///
    /// Waits for a run in progress for the character.
    pub fn reset_character(&self, character_id: CharacterId) {
        self.with_lane(character_id, |lane| {
            self.reset_layers(character_id);
            if !self.store.contains(character_id) {
                self.lanes.remove_if(&character_id, |_, l| Arc::ptr_eq(l, lane));
            }
        })
    }

    /// Remove a character's state, callback, layer state and lane
    ///
    /// Waits for a run in progress for the character; runs queued behind it
    /// start over on a fresh lane and see the character as unknown.
    pub fn remove_character(&self, character_id: CharacterId) -> Option<MotionState> {
        self.with_lane(character_id, |lane| {
            let removed = self.store.remove(character_id);
            self.reset_layers(character_id);
            self.lanes.remove_if(&character_id, |_, l| Arc::ptr_eq(l, lane));
            removed
        })
    }

    fn reset_layers(&self, character_id: CharacterId) {
        let lineup = self.registry.lineup();
        for entry in lineup.entries() {
            let layer = &entry.layer;
            if catch_unwind(AssertUnwindSafe(|| layer.reset(character_id))).is_err() {
                warn!(character_id = %character_id, layer = layer.name(), "Layer reset panicked");
            }
        }
    }

    /// Run `f` holding the character's lane
    ///
    /// A lane removed while this call waited on it is stale; the call retries
    /// on the lane now registered for the character.
    fn with_lane<R>(&self, character_id: CharacterId, f: impl FnOnce(&Arc<Mutex<()>>) -> R) -> R {
        loop {
            let lane = self.lanes.entry(character_id).or_default().clone();
            let _guard = lane.lock();
            let current = self
                .lanes
                .get(&character_id)
                .map(|l| Arc::ptr_eq(l.value(), &lane))
                .unwrap_or(false);
            if current {
                return f(&lane);
            }
        }
    }

    /// Lanes currently tracked
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}

/// Result of a pipeline run that passed every layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
    /// The state was stored and notified
    Committed(MotionState),
    /// The layers left the stored state as it was; nothing was notified
    Unchanged(MotionState),
}

impl RunOutcome {
    pub fn state(&self) -> &MotionState {
        match self {
            RunOutcome::Committed(state) | RunOutcome::Unchanged(state) => state,
        }
    }

    pub fn into_state(self) -> MotionState {
        *self.state()
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, RunOutcome::Committed(_))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "layer panicked".to_string()
    }
}
