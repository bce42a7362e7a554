//! Animation clips and keyframe sampling
//!
//! A clip is an ordered list of time-stamped poses. Sampling finds the
//! bracketing keyframe pair by binary search and interpolates linearly.

use crate::error::{MotionError, Result};
use crate::types::{Position, Rotation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of an animation clip
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    Idle,
    Walk,
    Run,
    Jump,
    Attack,
    #[default]
    Custom,
}

impl fmt::Display for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClipKind::Idle => "idle",
            ClipKind::Walk => "walk",
            ClipKind::Run => "run",
            ClipKind::Jump => "jump",
            ClipKind::Attack => "attack",
            ClipKind::Custom => "custom",
        };
        f.write_str(label)
    }
}

/// A pose at a point in clip time (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub position: Position,
    pub rotation: Rotation,
}

impl Keyframe {
    pub fn new(time: f32, position: Position, rotation: Rotation) -> Self {
        Self { time, position, rotation }
    }
}

/// Immutable animation clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    id: String,
    name: String,
    #[serde(default)]
    kind: ClipKind,
    duration: f32,
    keyframes: Vec<Keyframe>,
    #[serde(default)]
    looping: bool,
}

impl AnimationClip {
    /// Create a validated clip; keyframes are stably sorted by time
    pub fn new(
        id: impl Into<String>,
        duration: f32,
        keyframes: Vec<Keyframe>,
        looping: bool,
    ) -> Result<Self> {
        let id = id.into();
        let mut clip = Self {
            name: id.clone(),
            id,
            kind: ClipKind::Custom,
            duration,
            keyframes,
            looping,
        };
        clip.validate()?;
        clip.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(clip)
    }

    /// Set a display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the clip category
    pub fn with_kind(mut self, kind: ClipKind) -> Self {
        self.kind = kind;
        self
    }

    /// Check duration and keyframe times; used for clips loaded from storage too
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(MotionError::invalid_input("clip id must not be empty"));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(MotionError::invalid_input(format!(
                "clip '{}' has invalid duration {}",
                self.id, self.duration
            )));
        }
        if let Some(bad) = self.keyframes.iter().find(|k| {
            !k.time.is_finite() || !k.position.is_finite() || !k.rotation.is_finite()
        }) {
            return Err(MotionError::invalid_input(format!(
                "clip '{}' has non-finite keyframe at t={}",
                self.id, bad.time
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ClipKind {
        &self.kind
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// True once a non-looping clip has played to its end
    pub fn is_finished(&self, elapsed: f32) -> bool {
        !self.looping && elapsed >= self.duration
    }

    /// Map elapsed playback seconds onto clip time
    pub fn clip_time(&self, elapsed: f32) -> f32 {
        let elapsed = if elapsed.is_finite() { elapsed.max(0.0) } else { 0.0 };
        if self.looping {
            elapsed.rem_euclid(self.duration)
        } else {
            elapsed.min(self.duration)
        }
    }

    /// Interpolated pose at `elapsed` playback seconds, `None` for a clip without keyframes
    pub fn sample(&self, elapsed: f32) -> Option<(Position, Rotation)> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;
        let t = self.clip_time(elapsed);

        if t <= first.time {
            return Some((first.position, first.rotation));
        }
        if t >= last.time {
            return Some((last.position, last.rotation));
        }

        // index of the first keyframe strictly after t; t is inside (first, last)
        let upper = self.keyframes.partition_point(|k| k.time <= t);
        let (a, b) = (&self.keyframes[upper - 1], &self.keyframes[upper]);
        let span = b.time - a.time;
        let factor = if span > 0.0 { (t - a.time) / span } else { 1.0 };
        Some((
            a.position.lerp(&b.position, factor),
            a.rotation.lerp(&b.rotation, factor),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_clip(looping: bool) -> AnimationClip {
        AnimationClip::new(
            "walk",
            2.0,
            vec![
                Keyframe::new(2.0, Position::new(2.0, 0.0, 0.0), Rotation::new(0.0, 90.0, 0.0)),
                Keyframe::new(0.0, Position::ORIGIN, Rotation::IDENTITY),
                Keyframe::new(1.0, Position::new(1.0, 0.0, 0.0), Rotation::new(0.0, 45.0, 0.0)),
            ],
            looping,
        )
        .unwrap()
    }

    #[test]
    fn test_keyframes_sorted() {
        let clip = walk_clip(false);
        let times: Vec<f32> = clip.keyframes().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(clip.name(), "walk");
    }

    #[test]
    fn test_sample_interpolates_linearly() {
        let clip = walk_clip(false);
        let (pos, rot) = clip.sample(0.5).unwrap();
        assert!((pos.x - 0.5).abs() < 1e-5);
        assert!((rot.yaw - 22.5).abs() < 1e-4);

        let (pos, rot) = clip.sample(1.5).unwrap();
        assert!((pos.x - 1.5).abs() < 1e-5);
        assert!((rot.yaw - 67.5).abs() < 1e-4);
    }

    #[test]
    fn test_sample_clamps_past_end() {
        let clip = walk_clip(false);
        let (pos, _) = clip.sample(5.0).unwrap();
        assert_eq!(pos.x, 2.0);
        assert!(clip.is_finished(2.0));
        assert!(!clip.is_finished(1.99));
    }

    #[test]
    fn test_looping_wraps() {
        let clip = walk_clip(true);
        let (pos, _) = clip.sample(2.5).unwrap();
        assert!((pos.x - 0.5).abs() < 1e-5);
        assert!(!clip.is_finished(10.0));
    }

    #[test]
    fn test_invalid_clips_rejected() {
        assert!(AnimationClip::new("a", 0.0, vec![], false).is_err());
        assert!(AnimationClip::new("a", f32::NAN, vec![], false).is_err());
        assert!(AnimationClip::new("", 1.0, vec![], false).is_err());
        let bad = Keyframe::new(f32::INFINITY, Position::ORIGIN, Rotation::IDENTITY);
        assert!(AnimationClip::new("a", 1.0, vec![bad], false).is_err());
    }

    #[test]
    fn test_empty_clip_has_no_pose() {
        let clip = AnimationClip::new("empty", 1.0, vec![], false)
            .unwrap()
            .with_kind(ClipKind::Idle);
        assert!(clip.sample(0.5).is_none());
        assert_eq!(clip.kind().to_string(), "idle");
    }
}
