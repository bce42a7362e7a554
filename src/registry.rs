//! Priority-ordered layer registry
//!
//! Layers are kept sorted by:
//! - Priority, highest first
//! - Registration order within the same priority
//!
//! Pipeline runs hold the read lock for their whole fold; add, remove and
//! re-prioritize take the write lock.

use crate::layer::{same_layer, SharedLayer};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::info;

/// A registered layer with its priority
#[derive(Clone)]
pub struct LayerEntry {
    /// The layer
    pub layer: SharedLayer,
    /// Evaluation priority (higher runs first)
    pub priority: i32,
    /// Registration sequence (tie-break within priority)
    pub sequence: u64,
}

impl LayerEntry {
    fn ordering(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier registration
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl std::fmt::Debug for LayerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerEntry")
            .field("layer", &self.layer.name())
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Listing row for a registered layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerInfo {
    pub name: String,
    pub priority: i32,
}

#[derive(Default)]
struct Inner {
    entries: Vec<LayerEntry>,
    next_sequence: u64,
}

/// Concurrent registry of active motion layers
#[derive(Default)]
pub struct LayerRegistry {
    inner: RwLock<Inner>,
}

/// Read access to the ordered layer line-up, held for a whole fold
pub struct LayerLineup<'a> {
    guard: RwLockReadGuard<'a, Inner>,
}

impl LayerLineup<'_> {
    /// Entries in evaluation order
    pub fn entries(&self) -> &[LayerEntry] {
        &self.guard.entries
    }
}

impl LayerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer; false if this instance is already registered
    pub fn add(&self, layer: SharedLayer, priority: i32) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.iter().any(|e| same_layer(&e.layer, &layer)) {
            return false;
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        info!(layer = layer.name(), priority, "Layer registered");
        inner.entries.push(LayerEntry {
            layer,
            priority,
            sequence,
        });
        inner.entries.sort_by(LayerEntry::ordering);
        true
    }

    /// Unregister a layer; false if not present
    pub fn remove(&self, layer: &SharedLayer) -> bool {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|e| !same_layer(&e.layer, layer));
        let removed = inner.entries.len() != before;
        if removed {
            info!(layer = layer.name(), "Layer removed");
        }
        removed
    }

    /// Change a layer's priority and re-sort; false if not present
    ///
    /// The entry keeps its registration sequence, so among equal priorities it
    /// still ranks by when it was first added.
    pub fn update_priority(&self, layer: &SharedLayer, priority: i32) -> bool {
        let mut inner = self.inner.write();
        let Some(entry) = inner.entries.iter_mut().find(|e| same_layer(&e.layer, layer)) else {
            return false;
        };
        entry.priority = priority;
        inner.entries.sort_by(LayerEntry::ordering);
        info!(layer = layer.name(), priority, "Layer priority updated");
        true
    }

    /// Layers in evaluation order
    pub fn list_ordered(&self) -> Vec<SharedLayer> {
        self.inner.read().entries.iter().map(|e| e.layer.clone()).collect()
    }

    /// Names and priorities in evaluation order
    pub fn describe(&self) -> Vec<LayerInfo> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|e| LayerInfo {
                name: e.layer.name().to_string(),
                priority: e.priority,
            })
            .collect()
    }

    /// Highest-priority layer
    pub fn top(&self) -> Option<SharedLayer> {
        self.inner.read().entries.first().map(|e| e.layer.clone())
    }

    /// Priority of a registered layer
    pub fn priority_of(&self, layer: &SharedLayer) -> Option<i32> {
        self.inner
            .read()
            .entries
            .iter()
            .find(|e| same_layer(&e.layer, layer))
            .map(|e| e.priority)
    }

    pub fn contains(&self, layer: &SharedLayer) -> bool {
        self.priority_of(layer).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the read lock for a full pipeline fold
    pub fn lineup(&self) -> LayerLineup<'_> {
        LayerLineup {
            guard: self.inner.read(),
        }
    }
}
