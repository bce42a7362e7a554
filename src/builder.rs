//! MotionBuilder for configuring and constructing motion services
//!
//! ## Table of Contents
//! - **MotionBuilder**: Builder pattern for service configuration
//! - **MotionConfig**: Complete configuration struct, loadable from TOML

use crate::clock::{Clock, MonotonicClock, SharedClock};
use crate::error::{MotionError, Result};
use crate::layer::{MotionLayer, SharedLayer};
use crate::metrics::MotionMetrics;
use crate::repository::{BoxedClipRepository, FileClipRepository, MemoryClipRepository};
use crate::service::MotionService;
use crate::store::CallbackDispatch;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Complete motion service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Scheduler ticks per second
    pub tick_rate_hz: u32,
    /// Where per-character callbacks run
    pub callback_dispatch: CallbackDispatch,
    /// Run each layer's physics step inside the fold
    pub physics_enabled: bool,
    /// Spread scheduler work over rayon
    pub parallel_ticks: bool,
    /// Buffer of the update broadcast channel
    pub update_channel_capacity: usize,
    /// Enable prometheus metrics
    pub metrics_enabled: bool,
    /// JSON file for the clip repository; in-memory when unset
    pub clip_store_path: Option<PathBuf>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            callback_dispatch: CallbackDispatch::Offload,
            physics_enabled: false,
            parallel_ticks: true,
            update_channel_capacity: 1024,
            metrics_enabled: true,
            clip_store_path: None,
        }
    }
}

impl MotionConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: MotionConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MotionError::config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate_hz == 0 {
            return Err(MotionError::config("tick_rate_hz must be greater than 0"));
        }
        if self.update_channel_capacity == 0 {
            return Err(MotionError::config("update_channel_capacity must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for constructing motion services
pub struct MotionBuilder {
    config: MotionConfig,
    repository: Option<BoxedClipRepository>,
    clock: Option<SharedClock>,
    layers: Vec<(SharedLayer, i32)>,
}

impl MotionBuilder {
    /// Create a new MotionBuilder with default configuration
    pub fn new() -> Self {
        Self {
            config: MotionConfig::default(),
            repository: None,
            clock: None,
            layers: Vec::new(),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: MotionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the scheduler tick rate
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz;
        self
    }

    /// Set where callbacks run
    pub fn with_callback_dispatch(mut self, dispatch: CallbackDispatch) -> Self {
        self.config.callback_dispatch = dispatch;
        self
    }

    /// Enable or disable layer physics
    pub fn with_physics(mut self, enabled: bool) -> Self {
        self.config.physics_enabled = enabled;
        self
    }

    /// Enable or disable parallel ticks
    pub fn with_parallel_ticks(mut self, enabled: bool) -> Self {
        self.config.parallel_ticks = enabled;
        self
    }

    /// Enable or disable metrics
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.config.metrics_enabled = enabled;
        self
    }

    /// Set the clip repository file path
    pub fn with_clip_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.clip_store_path = Some(path.into());
        self
    }

    /// Set a custom clip repository
    pub fn with_clip_repository(mut self, repository: BoxedClipRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Set the playback clock
    pub fn with_clock<C: Clock + 'static>(mut self, clock: Arc<C>) -> Self {
        self.clock = Some(clock as SharedClock);
        self
    }

    /// Register a layer when the service is built
    pub fn with_layer<L: MotionLayer + 'static>(mut self, layer: Arc<L>, priority: i32) -> Self {
        self.layers.push((layer as SharedLayer, priority));
        self
    }

    /// Build the service
    pub fn build(self) -> Result<MotionService> {
        self.config.validate()?;

        info!(
            tick_rate_hz = self.config.tick_rate_hz,
            physics = self.config.physics_enabled,
            layers = self.layers.len(),
            "Building motion service"
        );

        let repository: BoxedClipRepository = match self.repository {
            Some(r) => r,
            None => {
                if let Some(path) = &self.config.clip_store_path {
                    Arc::new(FileClipRepository::open(path)?) as BoxedClipRepository
                } else {
                    Arc::new(MemoryClipRepository::new()) as BoxedClipRepository
                }
            }
        };

        let clock: SharedClock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let metrics = if self.config.metrics_enabled {
            Some(Arc::new(MotionMetrics::new()?))
        } else {
            None
        };

        let service = MotionService::new(self.config, repository, clock, metrics);
        for (layer, priority) in self.layers {
            service.add_layer(layer, priority);
        }
        Ok(service)
    }
}

impl Default for MotionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::layer::{BasicWalkLayer, IdleLayer};

    #[test]
    fn test_builder_default() {
        let service = MotionBuilder::new().build();
        assert!(service.is_ok());
    }

    #[test]
    fn test_builder_registers_layers() {
        let service = MotionBuilder::new()
            .with_layer(Arc::new(IdleLayer::new()), 0)
            .with_layer(Arc::new(BasicWalkLayer::new()), 1)
            .with_clock(Arc::new(ManualClock::new()))
            .with_metrics(false)
            .build()
            .unwrap();
        let names: Vec<String> = service.describe_layers().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["basic_walk", "idle"]);
        assert!(service.metrics().is_none());
    }

    #[test]
    fn test_zero_tick_rate_rejected() {
        assert!(matches!(
            MotionBuilder::new().with_tick_rate(0).build(),
            Err(MotionError::Config(_))
        ));
    }

    #[test]
    fn test_config_from_toml() {
        let config = MotionConfig::from_toml_str(
            r#"
            tick_rate_hz = 30
            callback_dispatch = "inline"
            physics_enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.tick_rate_hz, 30);
        assert_eq!(config.callback_dispatch, CallbackDispatch::Inline);
        assert!(config.physics_enabled);
        assert!(config.parallel_ticks);
        assert_eq!(config.update_channel_capacity, 1024);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(MotionConfig::from_toml_str("update_channel_capacity = 0").is_err());
        assert!(matches!(
            MotionConfig::from_toml_str("tick_rate_hz = \"fast\""),
            Err(MotionError::ConfigFormat(_))
        ));
    }

    #[test]
    fn test_config_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motion.toml");
        std::fs::write(&path, "tick_rate_hz = 120\nmetrics_enabled = false\n").unwrap();
        let config = MotionConfig::load(&path).unwrap();
        assert_eq!(config.tick_rate_hz, 120);
        assert!(!config.metrics_enabled);
        assert!(MotionConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
