//! Motion service façade and runtime
//!
//! ## Table of Contents
//! - **MotionService**: Entry point for character, layer and animation operations
//! - **RuntimeState**: Lifecycle of the background scheduler

use crate::builder::MotionConfig;
use crate::clip::AnimationClip;
use crate::clock::SharedClock;
use crate::error::{MotionError, Result};
use crate::layer::SharedLayer;
use crate::metrics::MotionMetrics;
use crate::pipeline::{Pipeline, Trigger};
use crate::playback::{AnimationPlayback, PlaybackTable, RetireReason};
use crate::registry::{LayerInfo, LayerRegistry};
use crate::repository::BoxedClipRepository;
use crate::scheduler::{PlaybackScheduler, TickReport};
use crate::store::{CharacterStore, MotionUpdate};
use crate::types::{CharacterId, Direction, MotionState, Vector3};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Scheduler not running
    Stopped,
    /// Scheduler being spawned
    Starting,
    /// Scheduler ticking
    Running,
    /// Scheduler being stopped
    ShuttingDown,
}

/// Character motion service
///
/// Synchronous operations are safe to call from any thread; the scheduler runs
/// concurrently once [`start`](MotionService::start) has been called, or can be
/// driven by hand with [`tick`](MotionService::tick).
pub struct MotionService {
    config: MotionConfig,
    state: RwLock<RuntimeState>,

    // Core components
    registry: Arc<LayerRegistry>,
    store: Arc<CharacterStore>,
    playbacks: Arc<PlaybackTable>,
    pipeline: Arc<Pipeline>,
    scheduler: Arc<PlaybackScheduler>,
    clips: BoxedClipRepository,
    clock: SharedClock,
    metrics: Option<Arc<MotionMetrics>>,

    // Scheduler task
    shutdown_tx: broadcast::Sender<()>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
}

impl MotionService {
    /// Create a new service (use MotionBuilder instead)
    pub(crate) fn new(
        config: MotionConfig,
        clips: BoxedClipRepository,
        clock: SharedClock,
        metrics: Option<Arc<MotionMetrics>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = Arc::new(LayerRegistry::new());
        let store = Arc::new(CharacterStore::new(
            config.callback_dispatch,
            config.update_channel_capacity,
        ));
        let playbacks = Arc::new(PlaybackTable::new());
        let pipeline = Arc::new(Pipeline::new(
            registry.clone(),
            store.clone(),
            config.physics_enabled,
            metrics.clone(),
        ));
        let scheduler = Arc::new(PlaybackScheduler::new(
            pipeline.clone(),
            playbacks.clone(),
            clock.clone(),
            config.tick_rate_hz,
            config.parallel_ticks,
            metrics.clone(),
        ));

        Self {
            config,
            state: RwLock::new(RuntimeState::Stopped),
            registry,
            store,
            playbacks,
            pipeline,
            scheduler,
            clips,
            clock,
            metrics,
            shutdown_tx,
            scheduler_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Get metrics instance
    pub fn metrics(&self) -> Option<&Arc<MotionMetrics>> {
        self.metrics.as_ref()
    }

    /// Get the clip repository
    pub fn clips(&self) -> &BoxedClipRepository {
        &self.clips
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    // Characters

    /// Create a character at rest
    pub fn create_character(&self) -> (CharacterId, MotionState) {
        let id = CharacterId::new();
        let state = self.store.ensure(id);
        info!(character_id = %id, "Character created");
        (id, state)
    }

    /// Delete a character with its state, callback, playback and layer state
    pub fn delete_character(&self, character_id: CharacterId) -> bool {
        self.retire_playback(character_id, RetireReason::Stopped);
        let existed = self.pipeline.remove_character(character_id).is_some();
        if existed {
            info!(character_id = %character_id, "Character deleted");
        }
        existed
    }

    /// Current state; a rest state for unknown characters
    pub fn get_state(&self, character_id: CharacterId) -> MotionState {
        self.store.get_or_rest(character_id)
    }

    /// Every stored character
    pub fn characters(&self) -> Vec<CharacterId> {
        self.store.character_ids()
    }

    /// Face `direction` and move at `speed`
    ///
    /// The direction is normalized; a zero-length vector faces +Z. Non-finite
    /// components and negative or non-finite speeds are rejected.
    pub fn set_direction(&self, character_id: CharacterId, direction: Vector3, speed: f32) -> Result<MotionState> {
        if !direction.is_finite() {
            return Err(MotionError::invalid_input(format!("direction {} is not finite", direction)));
        }
        if !speed.is_finite() || speed < 0.0 {
            return Err(MotionError::invalid_input(format!("speed {} must be finite and >= 0", speed)));
        }
        let rotation = Direction::new(direction).to_rotation();
        self.pipeline.run(character_id, Trigger::Direction, 0.0, |current| {
            current.with_rotation(rotation).with_speed(speed)
        })
    }

    /// Stop moving and cancel any animation
    pub fn stop(&self, character_id: CharacterId) -> Result<MotionState> {
        self.retire_playback(character_id, RetireReason::Stopped);
        self.pipeline
            .run(character_id, Trigger::Stop, 0.0, |current| current.with_speed(0.0))
    }

    /// Call `reset` on every registered layer for this character
    pub fn reset_character(&self, character_id: CharacterId) {
        self.pipeline.reset_character(character_id);
        debug!(character_id = %character_id, "Layer state reset");
    }

    /// Blend two states using the highest-priority layer; `end` if no layers
    pub fn smooth_transition(&self, start: &MotionState, end: &MotionState, factor: f32) -> MotionState {
        self.pipeline.interpolate(start, end, factor)
    }

    // Animations

    /// Start playing a clip, replacing any running playback
    ///
    /// Returns the state the playback starts from; the scheduler applies the
    /// frames.
    pub async fn play_animation(&self, character_id: CharacterId, clip_id: &str, speed_multiplier: f32) -> Result<MotionState> {
        if !speed_multiplier.is_finite() || speed_multiplier <= 0.0 {
            return Err(MotionError::invalid_input(format!(
                "speed multiplier {} must be finite and > 0",
                speed_multiplier
            )));
        }
        let clip = self
            .clips
            .get_clip(clip_id)
            .await?
            .ok_or_else(|| MotionError::UnknownClip(clip_id.to_string()))?;

        let base = self.store.get_or_rest(character_id);
        let playback = AnimationPlayback::new(clip, base, speed_multiplier, self.clock.now());
        if self.playbacks.start(character_id, playback).is_some() {
            if let Some(metrics) = &self.metrics {
                metrics.record_retired(RetireReason::Replaced);
            }
        }
        info!(character_id = %character_id, clip = clip_id, speed_multiplier, "Animation started");
        Ok(base)
    }

    /// Store a clip in the repository
    pub async fn save_clip(&self, clip: AnimationClip) -> Result<()> {
        let id = clip.id().to_string();
        self.clips.save_clip(clip).await?;
        debug!(clip = %id, repository = self.clips.name(), "Clip saved");
        Ok(())
    }

    /// Active playback for a character
    pub fn active_playback(&self, character_id: CharacterId) -> Option<Arc<AnimationPlayback>> {
        self.playbacks.get(character_id)
    }

    fn retire_playback(&self, character_id: CharacterId, reason: RetireReason) {
        if let Some(playback) = self.playbacks.stop(character_id) {
            if let Some(metrics) = &self.metrics {
                metrics.record_retired(reason);
            }
            debug!(character_id = %character_id, clip = playback.clip.id(), reason = %reason, "Playback retired");
        }
    }

    // Notifications

    /// Set the character's callback, replacing any previous one
    pub fn register_callback<F>(&self, character_id: CharacterId, callback: F)
    where
        F: Fn(CharacterId, &MotionState) + Send + Sync + 'static,
    {
        self.store.register_callback(character_id, Arc::new(callback));
    }

    /// Remove the character's callback
    pub fn unregister_callback(&self, character_id: CharacterId) -> bool {
        self.store.unregister_callback(character_id)
    }

    /// Receive every committed update
    pub fn subscribe(&self) -> broadcast::Receiver<MotionUpdate> {
        self.store.subscribe()
    }

    // Layers

    /// Register a layer; false if already registered
    pub fn add_layer(&self, layer: SharedLayer, priority: i32) -> bool {
        self.registry.add(layer, priority)
    }

    /// Unregister a layer; false if not registered
    pub fn remove_layer(&self, layer: &SharedLayer) -> bool {
        self.registry.remove(layer)
    }

    /// Change a layer's priority; false if not registered
    pub fn update_priority(&self, layer: &SharedLayer, priority: i32) -> bool {
        self.registry.update_priority(layer, priority)
    }

    /// Layers in evaluation order
    pub fn list_layers(&self) -> Vec<SharedLayer> {
        self.registry.list_ordered()
    }

    /// Layer names and priorities in evaluation order
    pub fn describe_layers(&self) -> Vec<LayerInfo> {
        self.registry.describe()
    }

    // Runtime

    /// Run one scheduler tick on the calling thread
    pub fn tick(&self) -> TickReport {
        self.scheduler.tick()
    }

    /// Get current runtime state
    pub fn state(&self) -> RuntimeState {
        *self.state.read()
    }

    /// Spawn the scheduler on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(MotionError::runtime("start requires a tokio runtime"));
        }
        {
            let mut state = self.state.write();
            if *state != RuntimeState::Stopped {
                return Err(MotionError::runtime(format!("service is {:?}", *state)));
            }
            *state = RuntimeState::Starting;
        }

        info!(tick_rate_hz = self.config.tick_rate_hz, "Starting motion service");

        let task = self.scheduler.clone().spawn(self.shutdown_tx.subscribe());
        *self.scheduler_task.lock() = Some(task);
        *self.state.write() = RuntimeState::Running;

        info!("Motion service running");
        Ok(())
    }

    /// Stop the scheduler and wait for it to exit
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state == RuntimeState::Stopped {
                return Ok(());
            }
            *state = RuntimeState::ShuttingDown;
        }

        info!("Shutting down motion service");

        let _ = self.shutdown_tx.send(());
        let task = self.scheduler_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }

        *self.state.write() = RuntimeState::Stopped;
        info!("Motion service stopped");
        Ok(())
    }
}
