//! Prometheus metrics for the motion engine

use crate::error::{MotionError, Result};
use crate::pipeline::Trigger;
use crate::playback::RetireReason;
use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};

/// Core metrics for the motion engine
pub struct MotionMetrics {
    registry: Registry,

    // Pipeline metrics
    pub commits: CounterVec,
    pub rejections: CounterVec,

    // Scheduler metrics
    pub ticks: Counter,
    pub tick_duration: Histogram,
    pub active_playbacks: Gauge,
    pub playbacks_retired: CounterVec,
}

impl MotionMetrics {
    /// Create a new metrics instance with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let commits = CounterVec::new(
            Opts::new("motion_commits_total", "Committed motion states"),
            &["trigger"],
        )?;
        let rejections = CounterVec::new(
            Opts::new("motion_rejections_total", "Candidate states rejected by a layer"),
            &["layer", "cause"],
        )?;

        let ticks = Counter::new("motion_ticks_total", "Scheduler ticks executed")?;
        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("motion_tick_duration_seconds", "Scheduler tick duration")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.0167, 0.05]),
        )?;
        let active_playbacks = Gauge::new("motion_active_playbacks", "Active animation playbacks")?;
        let playbacks_retired = CounterVec::new(
            Opts::new("motion_playbacks_retired_total", "Animation playbacks retired"),
            &["reason"],
        )?;

        registry.register(Box::new(commits.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(ticks.clone()))?;
        registry.register(Box::new(tick_duration.clone()))?;
        registry.register(Box::new(active_playbacks.clone()))?;
        registry.register(Box::new(playbacks_retired.clone()))?;

        Ok(Self {
            registry,
            commits,
            rejections,
            ticks,
            tick_duration,
            active_playbacks,
            playbacks_retired,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a committed state
    pub fn record_commit(&self, trigger: Trigger) {
        self.commits.with_label_values(&[trigger.as_str()]).inc();
    }

    /// Record a rejected candidate
    pub fn record_rejection(&self, layer: &str, cause: &str) {
        self.rejections.with_label_values(&[layer, cause]).inc();
    }

    /// Record a finished scheduler tick
    pub fn record_tick(&self, duration_secs: f64, active_playbacks: usize) {
        self.ticks.inc();
        self.tick_duration.observe(duration_secs);
        self.active_playbacks.set(active_playbacks as f64);
    }

    /// Record a retired playback
    pub fn record_retired(&self, reason: RetireReason) {
        self.playbacks_retired.with_label_values(&[reason.as_str()]).inc();
    }

    /// Gather all metrics as text
    pub fn gather_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MotionError::metrics(format!("Encode error: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| MotionError::metrics(format!("UTF8 error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = MotionMetrics::new().unwrap();
        metrics.record_commit(Trigger::Direction);
        metrics.record_commit(Trigger::Direction);
        metrics.record_rejection("wall", "collision");
        metrics.record_tick(0.002, 3);
        metrics.record_retired(RetireReason::Finished);

        assert_eq!(metrics.commits.with_label_values(&["direction"]).get(), 2.0);
        assert_eq!(metrics.active_playbacks.get(), 3.0);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("motion_commits_total"));
        assert!(text.contains("motion_rejections_total"));
        assert!(text.contains("motion_playbacks_retired_total"));
    }

    #[test]
    fn test_independent_registries() {
        // each service owns its registry, so two instances never collide
        assert!(MotionMetrics::new().is_ok());
        assert!(MotionMetrics::new().is_ok());
    }
}
