//! Active animation playbacks
//!
//! At most one playback exists per character. Starting a new one replaces the
//! old one; the scheduler retires finished or faulty playbacks.

use crate::clip::AnimationClip;
use crate::types::{CharacterId, MotionState, Position, Rotation};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetireReason {
    /// Non-looping clip reached its end
    Finished,
    /// Character was stopped or deleted
    Stopped,
    /// Another animation was started
    Replaced,
    /// A layer faulted while advancing it
    Fault,
}

impl RetireReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetireReason::Finished => "finished",
            RetireReason::Stopped => "stopped",
            RetireReason::Replaced => "replaced",
            RetireReason::Fault => "fault",
        }
    }
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clip bound to a character
#[derive(Debug)]
pub struct AnimationPlayback {
    pub clip: Arc<AnimationClip>,
    /// State when the playback started
    pub base_state: MotionState,
    pub speed_multiplier: f32,
    /// Clock reading at start
    pub started_at: Duration,
}

impl AnimationPlayback {
    pub fn new(clip: Arc<AnimationClip>, base_state: MotionState, speed_multiplier: f32, started_at: Duration) -> Self {
        Self {
            clip,
            base_state,
            speed_multiplier,
            started_at,
        }
    }

    /// Playback seconds elapsed at `now`, scaled by the speed multiplier
    pub fn elapsed(&self, now: Duration) -> f32 {
        now.saturating_sub(self.started_at).as_secs_f32() * self.speed_multiplier
    }

    /// Pose at `now`; clips without keyframes hold the base pose
    pub fn pose_at(&self, now: Duration) -> (Position, Rotation) {
        self.clip
            .sample(self.elapsed(now))
            .unwrap_or((self.base_state.position(), self.base_state.rotation()))
    }

    pub fn is_finished(&self, now: Duration) -> bool {
        self.clip.is_finished(self.elapsed(now))
    }
}

/// Concurrent map of active playbacks
#[derive(Debug, Default)]
pub struct PlaybackTable {
    playbacks: DashMap<CharacterId, Arc<AnimationPlayback>>,
}

impl PlaybackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a playback, returning the one it replaced
    pub fn start(&self, character_id: CharacterId, playback: AnimationPlayback) -> Option<Arc<AnimationPlayback>> {
        self.playbacks.insert(character_id, Arc::new(playback))
    }

    pub fn get(&self, character_id: CharacterId) -> Option<Arc<AnimationPlayback>> {
        self.playbacks.get(&character_id).map(|p| p.clone())
    }

    /// Remove whatever playback the character has
    pub fn stop(&self, character_id: CharacterId) -> Option<Arc<AnimationPlayback>> {
        self.playbacks.remove(&character_id).map(|(_, p)| p)
    }

    /// Remove the playback only if it is still `expected`
    ///
    /// A tick that observed an older playback must not retire one started
    /// after it.
    pub fn retire_if(&self, character_id: CharacterId, expected: &Arc<AnimationPlayback>) -> bool {
        self.playbacks
            .remove_if(&character_id, |_, current| Arc::ptr_eq(current, expected))
            .is_some()
    }

    /// Every active playback
    pub fn snapshot(&self) -> Vec<(CharacterId, Arc<AnimationPlayback>)> {
        self.playbacks
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    pub fn contains(&self, character_id: CharacterId) -> bool {
        self.playbacks.contains_key(&character_id)
    }

    pub fn len(&self) -> usize {
        self.playbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playbacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Keyframe;

    fn clip(looping: bool) -> Arc<AnimationClip> {
        Arc::new(
            AnimationClip::new(
                "slide",
                2.0,
                vec![
                    Keyframe::new(0.0, Position::ORIGIN, Rotation::IDENTITY),
                    Keyframe::new(2.0, Position::new(4.0, 0.0, 0.0), Rotation::IDENTITY),
                ],
                looping,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_elapsed_scales_with_multiplier() {
        let id = CharacterId::new();
        let playback = AnimationPlayback::new(clip(false), MotionState::rest(id), 2.0, Duration::from_secs(1));
        assert_eq!(playback.elapsed(Duration::from_millis(500)), 0.0);
        assert!((playback.elapsed(Duration::from_millis(1500)) - 1.0).abs() < 1e-5);
        let (pos, _) = playback.pose_at(Duration::from_millis(1500));
        assert!((pos.x - 2.0).abs() < 1e-5);
        assert!(playback.is_finished(Duration::from_secs(2)));
    }

    #[test]
    fn test_start_replaces_existing() {
        let table = PlaybackTable::new();
        let id = CharacterId::new();
        let rest = MotionState::rest(id);
        assert!(table.start(id, AnimationPlayback::new(clip(false), rest, 1.0, Duration::ZERO)).is_none());
        assert!(table.start(id, AnimationPlayback::new(clip(true), rest, 1.0, Duration::ZERO)).is_some());
        assert_eq!(table.len(), 1);
        assert!(table.get(id).unwrap().clip.is_looping());
    }

    #[test]
    fn test_retire_if_ignores_newer_playback() {
        let table = PlaybackTable::new();
        let id = CharacterId::new();
        let rest = MotionState::rest(id);
        table.start(id, AnimationPlayback::new(clip(false), rest, 1.0, Duration::ZERO));
        let observed = table.get(id).unwrap();
        table.start(id, AnimationPlayback::new(clip(false), rest, 1.0, Duration::ZERO));
        assert!(!table.retire_if(id, &observed));
        assert!(table.contains(id));

        let current = table.get(id).unwrap();
        assert!(table.retire_if(id, &current));
        assert!(table.is_empty());
    }

    #[test]
    fn test_empty_clip_holds_base_pose() {
        let id = CharacterId::new();
        let base = MotionState::rest(id).with_position(Position::new(1.0, 2.0, 3.0));
        let empty = Arc::new(AnimationClip::new("empty", 1.0, vec![], false).unwrap());
        let playback = AnimationPlayback::new(empty, base, 1.0, Duration::ZERO);
        assert_eq!(playback.pose_at(Duration::from_millis(300)).0, base.position());
    }
}
