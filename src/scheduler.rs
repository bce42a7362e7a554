//! Fixed-rate playback scheduler
//!
//! Each tick advances:
//! - every character with an active playback (keyframe pose, current speed)
//! - every other stored character (current state re-folded, committed only
//!   when the layers change it, so resting characters still breathe and
//!   recover stamina)
//!
//! Characters are processed independently, in parallel on rayon when enabled.
//! A failure for one character never aborts the tick for the others.

use crate::clock::SharedClock;
use crate::metrics::MotionMetrics;
use crate::pipeline::{Pipeline, Trigger};
use crate::playback::{AnimationPlayback, PlaybackTable, RetireReason};
use crate::types::CharacterId;
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Summary of one scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Characters visited
    pub characters: usize,
    /// States committed
    pub committed: usize,
    /// Re-folded states the layers left unchanged
    pub unchanged: usize,
    /// Frames skipped because a layer rejected them
    pub rejected: usize,
    /// Playbacks retired during this tick
    pub retired: usize,
    /// Layer faults or panics
    pub faults: usize,
}

enum Work {
    Animation(CharacterId, Arc<AnimationPlayback>),
    Motion(CharacterId),
}

impl Work {
    fn character_id(&self) -> CharacterId {
        match self {
            Work::Animation(id, _) => *id,
            Work::Motion(id) => *id,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Outcome {
    committed: bool,
    unchanged: bool,
    rejected: bool,
    retired: bool,
    fault: bool,
}

/// Drives active playbacks and refreshes every other stored character at a fixed cadence
pub struct PlaybackScheduler {
    pipeline: Arc<Pipeline>,
    playbacks: Arc<PlaybackTable>,
    clock: SharedClock,
    tick_rate_hz: u32,
    parallel: bool,
    metrics: Option<Arc<MotionMetrics>>,
}

impl PlaybackScheduler {
    pub fn new(
        pipeline: Arc<Pipeline>,
        playbacks: Arc<PlaybackTable>,
        clock: SharedClock,
        tick_rate_hz: u32,
        parallel: bool,
        metrics: Option<Arc<MotionMetrics>>,
    ) -> Self {
        Self {
            pipeline,
            playbacks,
            clock,
            tick_rate_hz: tick_rate_hz.max(1),
            parallel,
            metrics,
        }
    }

    /// Time between ticks
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz))
    }

    /// Simulated seconds per tick
    pub fn delta_seconds(&self) -> f32 {
        1.0 / self.tick_rate_hz as f32
    }

    /// Run one tick synchronously
    pub fn tick(&self) -> TickReport {
        let started = Instant::now();
        let now = self.clock.now();
        let dt = self.delta_seconds();

        let mut work: Vec<Work> = self
            .playbacks
            .snapshot()
            .into_iter()
            .map(|(id, playback)| Work::Animation(id, playback))
            .collect();
        work.extend(
            self.pipeline
                .store()
                .character_ids()
                .into_iter()
                .filter(|id| !self.playbacks.contains(*id))
                .map(Work::Motion),
        );

        let outcomes: Vec<Outcome> = if self.parallel {
            work.par_iter().map(|w| self.advance_contained(w, now, dt)).collect()
        } else {
            work.iter().map(|w| self.advance_contained(w, now, dt)).collect()
        };

        let report = outcomes.iter().fold(
            TickReport {
                characters: work.len(),
                ..TickReport::default()
            },
            |mut report, o| {
                report.committed += usize::from(o.committed);
                report.unchanged += usize::from(o.unchanged);
                report.rejected += usize::from(o.rejected);
                report.retired += usize::from(o.retired);
                report.faults += usize::from(o.fault);
                report
            },
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_tick(started.elapsed().as_secs_f64(), self.playbacks.len());
        }
        trace!(
            characters = report.characters,
            committed = report.committed,
            retired = report.retired,
            "Scheduler tick"
        );
        report
    }

    fn advance_contained(&self, work: &Work, now: Duration, dt: f32) -> Outcome {
        match catch_unwind(AssertUnwindSafe(|| self.advance(work, now, dt))) {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(character_id = %work.character_id(), "Scheduler tick panicked");
                let retired = match work {
                    Work::Animation(id, playback) => self.retire(*id, playback, RetireReason::Fault),
                    Work::Motion(_) => false,
                };
                Outcome {
                    retired,
                    fault: true,
                    ..Outcome::default()
                }
            }
        }
    }

    fn advance(&self, work: &Work, now: Duration, dt: f32) -> Outcome {
        match work {
            Work::Motion(id) => match self.pipeline.refresh(*id, Trigger::Motion, dt) {
                Ok(outcome) => Outcome {
                    committed: outcome.is_committed(),
                    unchanged: !outcome.is_committed(),
                    ..Outcome::default()
                },
                Err(e) => Outcome {
                    rejected: true,
                    fault: e.rejection().map(|r| r.is_fault()).unwrap_or(true),
                    ..Outcome::default()
                },
            },
            Work::Animation(id, playback) => {
                let (position, rotation) = playback.pose_at(now);
                let finished = playback.is_finished(now);

                let result = self
                    .pipeline
                    .run(*id, Trigger::Animation, dt, |current| current.with_pose(position, rotation));

                match result {
                    Ok(_) => Outcome {
                        committed: true,
                        retired: finished && self.retire(*id, playback, RetireReason::Finished),
                        ..Outcome::default()
                    },
                    Err(e) if e.rejection().map(|r| r.is_fault()).unwrap_or(true) => Outcome {
                        fault: true,
                        retired: self.retire(*id, playback, RetireReason::Fault),
                        ..Outcome::default()
                    },
                    Err(_) => Outcome {
                        rejected: true,
                        retired: finished && self.retire(*id, playback, RetireReason::Finished),
                        ..Outcome::default()
                    },
                }
            }
        }
    }

    fn retire(&self, character_id: CharacterId, playback: &Arc<AnimationPlayback>, reason: RetireReason) -> bool {
        if !self.playbacks.retire_if(character_id, playback) {
            return false;
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_retired(reason);
        }
        if reason == RetireReason::Fault {
            warn!(character_id = %character_id, clip = playback.clip.id(), "Playback retired after fault");
        } else {
            debug!(character_id = %character_id, clip = playback.clip.id(), reason = %reason, "Playback retired");
        }
        true
    }

    /// Spawn the tick loop on the current tokio runtime
    ///
    /// Ticks run on the blocking pool so layer work never stalls async tasks.
    /// The loop exits when `shutdown` fires or its sender is dropped.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period());
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            info!(tick_rate_hz = self.tick_rate_hz, parallel = self.parallel, "Scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let scheduler = self.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || scheduler.tick()).await {
                            warn!(error = %e, "Scheduler tick aborted");
                        }
                    }
                    _ = shutdown.recv() => {
                        break;
                    }
                }
            }

            info!("Scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{AnimationClip, Keyframe};
    use crate::clock::{Clock, ManualClock};
    use crate::layer::{BasicWalkLayer, MotionLayer, RunLayer};
    use crate::registry::LayerRegistry;
    use crate::store::{CallbackDispatch, CharacterStore};
    use crate::types::{MotionState, Position, Rotation};

    struct Fragile(CharacterId);

    impl MotionLayer for Fragile {
        fn name(&self) -> &str {
            "fragile"
        }

        fn process_motion(&self, id: CharacterId, state: &MotionState, _dt: f32) -> MotionState {
            if id == self.0 {
                panic!("cannot animate this one");
            }
            *state
        }
    }

    struct Fixture {
        scheduler: PlaybackScheduler,
        pipeline: Arc<Pipeline>,
        playbacks: Arc<PlaybackTable>,
        clock: Arc<ManualClock>,
    }

    fn fixture(parallel: bool) -> Fixture {
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(LayerRegistry::new()),
            Arc::new(CharacterStore::new(CallbackDispatch::Inline, 64)),
            false,
            None,
        ));
        let playbacks = Arc::new(PlaybackTable::new());
        let clock = Arc::new(ManualClock::new());
        let scheduler = PlaybackScheduler::new(pipeline.clone(), playbacks.clone(), clock.clone(), 60, parallel, None);
        Fixture {
            scheduler,
            pipeline,
            playbacks,
            clock,
        }
    }

    fn slide(duration: f32, looping: bool) -> Arc<AnimationClip> {
        Arc::new(
            AnimationClip::new(
                "slide",
                duration,
                vec![
                    Keyframe::new(0.0, Position::ORIGIN, Rotation::IDENTITY),
                    Keyframe::new(duration, Position::new(duration, 0.0, 0.0), Rotation::IDENTITY),
                ],
                looping,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_moving_character_advances() {
        let f = fixture(false);
        f.pipeline.registry().add(Arc::new(BasicWalkLayer::new()), 1);
        let id = CharacterId::new();
        f.pipeline.store().commit(MotionState::rest(id).with_speed(1.0));

        let report = f.scheduler.tick();
        assert_eq!(report.committed, 1);
        let x = f.pipeline.store().get(id).unwrap().position().x;
        assert!((x - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_resting_character_without_change_is_not_committed() {
        let f = fixture(true);
        let id = CharacterId::new();
        f.pipeline.store().commit(MotionState::rest(id));
        let mut updates = f.pipeline.store().subscribe();

        let report = f.scheduler.tick();
        assert_eq!(report.characters, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.committed, 0);
        assert!(updates.try_recv().is_err());
    }

    #[test]
    fn test_resting_character_recovers_stamina() {
        let f = fixture(false);
        let run = Arc::new(RunLayer::new());
        f.pipeline.registry().add(run.clone(), 1);
        let id = CharacterId::new();
        f.pipeline.store().commit(MotionState::rest(id).with_speed(1.0));

        for _ in 0..120 {
            f.scheduler.tick();
        }
        let tired = run.stamina(id);
        assert!((tired - 80.0).abs() < 1e-2, "stamina {}", tired);

        f.pipeline.run(id, Trigger::Stop, 0.0, |s| s.with_speed(0.0)).unwrap();
        for _ in 0..120 {
            f.scheduler.tick();
        }
        assert!((run.stamina(id) - (tired + 10.0)).abs() < 1e-2);
    }

    #[test]
    fn test_playback_follows_clip_and_retires() {
        let f = fixture(true);
        let id = CharacterId::new();
        f.playbacks.start(id, AnimationPlayback::new(slide(1.0, false), MotionState::rest(id), 1.0, f.clock.now()));

        f.clock.advance(Duration::from_millis(500));
        f.scheduler.tick();
        let x = f.pipeline.store().get(id).unwrap().position().x;
        assert!((x - 0.5).abs() < 1e-5);
        assert!(f.playbacks.contains(id));

        f.clock.advance(Duration::from_millis(600));
        let report = f.scheduler.tick();
        assert_eq!(report.retired, 1);
        assert!(!f.playbacks.contains(id));
        assert_eq!(f.pipeline.store().get(id).unwrap().position().x, 1.0);
    }

    #[test]
    fn test_looping_playback_stays() {
        let f = fixture(false);
        let id = CharacterId::new();
        f.playbacks.start(id, AnimationPlayback::new(slide(1.0, true), MotionState::rest(id), 1.0, Duration::ZERO));
        f.clock.advance(Duration::from_millis(2500));
        f.scheduler.tick();
        assert!(f.playbacks.contains(id));
        let x = f.pipeline.store().get(id).unwrap().position().x;
        assert!((x - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_fault_retires_only_that_playback() {
        let f = fixture(true);
        let broken = CharacterId::new();
        let healthy = CharacterId::new();
        f.pipeline.registry().add(Arc::new(Fragile(broken)), 1);
        for id in [broken, healthy] {
            f.playbacks.start(id, AnimationPlayback::new(slide(2.0, true), MotionState::rest(id), 1.0, Duration::ZERO));
        }

        f.clock.advance(Duration::from_millis(100));
        let report = f.scheduler.tick();
        assert_eq!(report.faults, 1);
        assert_eq!(report.committed, 1);
        assert!(!f.playbacks.contains(broken));
        assert!(f.playbacks.contains(healthy));
        assert!(f.pipeline.store().get(broken).is_none());
    }

    #[test]
    fn test_period_from_tick_rate() {
        let f = fixture(false);
        assert_eq!(f.scheduler.period(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_shutdown() {
        let f = fixture(false);
        let (tx, rx) = broadcast::channel(1);
        let handle = Arc::new(f.scheduler).spawn(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
