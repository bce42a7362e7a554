//! # Motion Engine
//!
//! Layered character motion: high-level intents (move in a direction, play an
//! animation, stop) are folded through a priority-ordered stack of motion
//! layers and committed to a concurrent per-character state store, while a
//! fixed-rate scheduler advances animation playbacks.
//!
//! ## Features
//!
//! - **Motion Layers**: Pluggable behaviors (idle, walking, gaits, running) with default hooks
//! - **Layer Registry**: Concurrent priority ordering with a stable tie-break
//! - **Pipeline**: Fail-closed fold with validation, collision and fault containment
//! - **Scheduler**: Fixed-rate playback driver, parallel across characters
//! - **Notifications**: Per-character callbacks and a broadcast update stream
//! - **Metrics**: Prometheus-compatible metrics export
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use motion_engine::{BasicWalkLayer, IdleLayer, MotionBuilder, Vector3};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> motion_engine::Result<()> {
//!     let service = MotionBuilder::new()
//!         .with_layer(Arc::new(IdleLayer::new()), 0)
//!         .with_layer(Arc::new(BasicWalkLayer::new()), 1)
//!         .build()?;
//!
//!     service.start()?;
//!     let (hero, _) = service.create_character();
//!     service.set_direction(hero, Vector3::new(1.0, 0.0, 0.0), 1.0)?;
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod clip;
pub mod clock;
pub mod error;
pub mod layer;
pub mod metrics;
pub mod pipeline;
pub mod playback;
pub mod registry;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;

// Re-exports for ergonomic API
pub use builder::{MotionBuilder, MotionConfig};
pub use clip::{AnimationClip, ClipKind, Keyframe};
pub use clock::{Clock, LogicalClock, ManualClock, MonotonicClock, SharedClock};
pub use error::{MotionError, Rejection, RejectionCause, Result};
pub use layer::{AdvancedWalkLayer, BasicWalkLayer, Gait, IdleLayer, MotionLayer, RunLayer, SharedLayer};
pub use metrics::MotionMetrics;
pub use pipeline::{Pipeline, RunOutcome, Trigger};
pub use playback::{AnimationPlayback, PlaybackTable, RetireReason};
pub use registry::{LayerEntry, LayerInfo, LayerRegistry};
pub use repository::{BoxedClipRepository, ClipRepository, FileClipRepository, MemoryClipRepository};
pub use scheduler::{PlaybackScheduler, TickReport};
pub use service::{MotionService, RuntimeState};
pub use store::{CallbackDispatch, CharacterStore, MotionCallback, MotionUpdate};
pub use types::{CharacterId, CollisionInfo, Direction, MotionState, PhysicsInput, PoseCarry, Position, Rotation, Vector3};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::MotionBuilder;
    pub use crate::error::Result;
    pub use crate::layer::{AdvancedWalkLayer, BasicWalkLayer, Gait, IdleLayer, MotionLayer, RunLayer, SharedLayer};
    pub use crate::service::MotionService;
    pub use crate::types::{CharacterId, Direction, MotionState, Position, Rotation, Vector3};
}
