//! Animation clip repositories
//!
//! ## Table of Contents
//! - **ClipRepository**: Trait for clip lookup and storage
//! - **MemoryClipRepository**: In-memory repository (default)
//! - **FileClipRepository**: JSON file backed repository

use crate::clip::AnimationClip;
use crate::error::{MotionError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Read-mostly clip lookup used by `play_animation`
#[async_trait]
pub trait ClipRepository: Send + Sync {
    /// Get a clip by id
    async fn get_clip(&self, clip_id: &str) -> Result<Option<Arc<AnimationClip>>>;

    /// Insert or replace a clip
    async fn save_clip(&self, clip: AnimationClip) -> Result<()>;

    /// Remove a clip; true if it existed
    async fn delete_clip(&self, clip_id: &str) -> Result<bool>;

    /// Ids of all stored clips, sorted
    async fn list_clips(&self) -> Result<Vec<String>>;

    /// Repository name for logging
    fn name(&self) -> &str;
}

/// Type alias for a shared repository
pub type BoxedClipRepository = Arc<dyn ClipRepository>;

/// In-memory clip repository
#[derive(Debug, Default)]
pub struct MemoryClipRepository {
    clips: RwLock<HashMap<String, Arc<AnimationClip>>>,
}

impl MemoryClipRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-filled with clips
    pub fn with_clips(clips: impl IntoIterator<Item = AnimationClip>) -> Self {
        let clips = clips
            .into_iter()
            .map(|c| (c.id().to_string(), Arc::new(c)))
            .collect();
        Self {
            clips: RwLock::new(clips),
        }
    }
}

#[async_trait]
impl ClipRepository for MemoryClipRepository {
    async fn get_clip(&self, clip_id: &str) -> Result<Option<Arc<AnimationClip>>> {
        Ok(self.clips.read().await.get(clip_id).cloned())
    }

    async fn save_clip(&self, clip: AnimationClip) -> Result<()> {
        clip.validate()?;
        self.clips
            .write()
            .await
            .insert(clip.id().to_string(), Arc::new(clip));
        Ok(())
    }

    async fn delete_clip(&self, clip_id: &str) -> Result<bool> {
        Ok(self.clips.write().await.remove(clip_id).is_some())
    }

    async fn list_clips(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.clips.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Clip repository persisted as a JSON map of id to clip
pub struct FileClipRepository {
    path: PathBuf,
    clips: RwLock<HashMap<String, Arc<AnimationClip>>>,
}

impl FileClipRepository {
    /// Open or create a file repository; every stored clip is validated
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let clips = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| MotionError::repository(format!("Failed to read clips: {}", e)))?;
            let stored: HashMap<String, AnimationClip> = serde_json::from_str(&contents)?;
            stored
                .into_iter()
                .map(|(id, clip)| -> Result<(String, Arc<AnimationClip>)> {
                    clip.validate()?;
                    Ok((id, Arc::new(clip)))
                })
                .collect::<Result<HashMap<_, _>>>()?
        } else {
            HashMap::new()
        };

        info!(path = %path.display(), clips = clips.len(), "Clip repository opened");

        Ok(Self {
            path,
            clips: RwLock::new(clips),
        })
    }

    /// Persist clips to disk
    pub async fn flush(&self) -> Result<()> {
        let clips = self.clips.read().await;
        let plain: HashMap<&String, &AnimationClip> = clips.iter().map(|(k, v)| (k, v.as_ref())).collect();
        let contents = serde_json::to_string_pretty(&plain)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MotionError::repository(format!("Failed to create dir: {}", e)))?;
        }

        std::fs::write(&self.path, contents)
            .map_err(|e| MotionError::repository(format!("Failed to write clips: {}", e)))?;

        debug!(path = %self.path.display(), "Clip repository flushed");
        Ok(())
    }
}

#[async_trait]
impl ClipRepository for FileClipRepository {
    async fn get_clip(&self, clip_id: &str) -> Result<Option<Arc<AnimationClip>>> {
        Ok(self.clips.read().await.get(clip_id).cloned())
    }

    async fn save_clip(&self, clip: AnimationClip) -> Result<()> {
        clip.validate()?;
        self.clips
            .write()
            .await
            .insert(clip.id().to_string(), Arc::new(clip));
        Ok(())
    }

    async fn delete_clip(&self, clip_id: &str) -> Result<bool> {
        Ok(self.clips.write().await.remove(clip_id).is_some())
    }

    async fn list_clips(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.clips.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn name(&self) -> &str {
        "file"
    }
}
