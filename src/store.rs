//! Per-character state store and change notification
//!
//! ## Table of Contents
//! - **CharacterStore**: Concurrent map of committed states plus callbacks
//! - **MotionCallback**: Per-character notification closure
//! - **MotionUpdate**: Broadcast payload for every commit
//! - **CallbackDispatch**: Where callbacks run

use crate::pipeline::Trigger;
use crate::types::{CharacterId, MotionState};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Notification closure invoked after a commit
pub type MotionCallback = Arc<dyn Fn(CharacterId, &MotionState) + Send + Sync>;

/// How registered callbacks are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackDispatch {
    /// On the committing thread
    Inline,
    /// On tokio's blocking pool when a runtime is available, inline otherwise
    #[default]
    Offload,
}

/// A committed state change
#[derive(Debug, Clone, PartialEq)]
pub struct MotionUpdate {
    pub character_id: CharacterId,
    pub state: MotionState,
    pub trigger: Trigger,
}

/// Concurrent per-character state and callback tables
pub struct CharacterStore {
    states: DashMap<CharacterId, MotionState>,
    callbacks: DashMap<CharacterId, MotionCallback>,
    updates: broadcast::Sender<MotionUpdate>,
    dispatch: CallbackDispatch,
}

impl CharacterStore {
    /// Create a store with the given broadcast capacity
    pub fn new(dispatch: CallbackDispatch, channel_capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            states: DashMap::new(),
            callbacks: DashMap::new(),
            updates,
            dispatch,
        }
    }

    /// Committed state, if the character has one
    pub fn get(&self, character_id: CharacterId) -> Option<MotionState> {
        self.states.get(&character_id).map(|s| *s)
    }

    /// Committed state or a rest state; does not insert
    pub fn get_or_rest(&self, character_id: CharacterId) -> MotionState {
        self.get(character_id)
            .unwrap_or_else(|| MotionState::rest(character_id))
    }

    /// Insert a rest state if the character is unknown; returns the stored state
    pub fn ensure(&self, character_id: CharacterId) -> MotionState {
        *self
            .states
            .entry(character_id)
            .or_insert_with(|| MotionState::rest(character_id))
    }

    /// Replace the stored state
    pub fn commit(&self, state: MotionState) -> Option<MotionState> {
        self.states.insert(state.character_id(), state)
    }

    /// Drop a character's state and callback
    pub fn remove(&self, character_id: CharacterId) -> Option<MotionState> {
        self.callbacks.remove(&character_id);
        self.states.remove(&character_id).map(|(_, s)| s)
    }

    pub fn contains(&self, character_id: CharacterId) -> bool {
        self.states.contains_key(&character_id)
    }

    /// Characters with a stored state
    pub fn character_ids(&self) -> Vec<CharacterId> {
        self.states.iter().map(|e| *e.key()).collect()
    }

    /// Snapshot of every stored state
    pub fn snapshot(&self) -> Vec<MotionState> {
        self.states.iter().map(|e| *e.value()).collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Set the character's callback, replacing any previous one
    pub fn register_callback(&self, character_id: CharacterId, callback: MotionCallback) {
        self.callbacks.insert(character_id, callback);
    }

    /// Remove the character's callback; false if none was registered
    pub fn unregister_callback(&self, character_id: CharacterId) -> bool {
        self.callbacks.remove(&character_id).is_some()
    }

    /// Receive every committed update
    pub fn subscribe(&self) -> broadcast::Receiver<MotionUpdate> {
        self.updates.subscribe()
    }

    /// Fan a committed update out to the callback and subscribers
    ///
    /// Must be called after the commit, outside any per-character lock.
    pub fn notify(&self, update: MotionUpdate) {
        let callback = self.callbacks.get(&update.character_id).map(|c| c.clone());
        if let Some(callback) = callback {
            self.dispatch_callback(callback, update.character_id, update.state);
        }
        // no subscribers is not an error
        let _ = self.updates.send(update);
    }

    fn dispatch_callback(&self, callback: MotionCallback, character_id: CharacterId, state: MotionState) {
        if self.dispatch == CallbackDispatch::Offload {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let _ = handle.spawn_blocking(move || run_callback(&callback, character_id, &state));
                return;
            }
        }
        run_callback(&callback, character_id, &state);
    }
}

fn run_callback(callback: &MotionCallback, character_id: CharacterId, state: &MotionState) {
    if catch_unwind(AssertUnwindSafe(|| callback(character_id, state))).is_err() {
        warn!(character_id = %character_id, "Motion callback panicked");
    } else {
        debug!(character_id = %character_id, "Motion callback delivered");
    }
}

impl Default for CharacterStore {
    fn default() -> Self {
        Self::new(CallbackDispatch::default(), 1024)
    }
}
