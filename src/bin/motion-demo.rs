//! # Motion Demo
//!
//! Walks a character through the built-in layers while the scheduler runs.
//!
//! ## Usage
//!
//! ```bash
//! # Run the layer switching demo
//! motion-demo
//!
//! # Shorter phases with debug logging
//! motion-demo --phase-secs 0.5 --verbose
//!
//! # Use a config file
//! motion-demo --config motion.toml
//! ```
//!
//! ## Configuration (motion.toml)
//!
//! ```toml
//! tick_rate_hz = 60
//! callback_dispatch = "offload"
//! physics_enabled = false
//! parallel_ticks = true
//! ```

use anyhow::Context;
use clap::Parser;
use motion_engine::prelude::*;
use motion_engine::MotionConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "motion-demo")]
#[command(about = "Layer switching demo for the motion engine")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds each demo phase runs
    #[arg(short, long, default_value = "2.0")]
    phase_secs: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.config {
        Some(path) => MotionConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MotionConfig::default(),
    };

    let service = MotionBuilder::new().with_config(config).build()?;
    service.start()?;

    let phase = Duration::from_secs_f64(args.phase_secs.max(0.0));
    let basic: SharedLayer = Arc::new(BasicWalkLayer::new());
    let advanced = Arc::new(AdvancedWalkLayer::new());
    let advanced_handle: SharedLayer = advanced.clone();

    let (hero, _) = service.create_character();
    service.register_callback(hero, |id, state| {
        debug!(character_id = %id, position = %state.position(), speed = state.speed(), "Motion update");
    });

    let east = Vector3::new(1.0, 0.0, 0.0);

    info!("=== Basic walking layer ===");
    service.add_layer(basic.clone(), 1);
    service.set_direction(hero, east, 0.5)?;
    report(&service, hero, phase).await;

    info!("=== Switching to advanced walking layer ===");
    service.remove_layer(&basic);
    service.add_layer(advanced_handle.clone(), 1);

    for (gait, speed) in [(Gait::Normal, 0.5), (Gait::Sneaking, 0.3), (Gait::Limping, 0.4)] {
        info!(gait = %gait, "=== Gait ===");
        advanced.set_gait(hero, gait);
        service.set_direction(hero, east, speed)?;
        report(&service, hero, phase).await;
    }

    info!("=== Stopping ===");
    service.stop(hero)?;
    report(&service, hero, phase / 4).await;

    info!("=== Back to basic walking layer ===");
    service.remove_layer(&advanced_handle);
    service.add_layer(basic.clone(), 1);
    service.set_direction(hero, east, 0.5)?;
    report(&service, hero, phase).await;

    service.stop(hero)?;
    service.shutdown().await?;

    if let Some(metrics) = service.metrics() {
        debug!(metrics = %metrics.gather_text()?, "Final metrics");
    }
    info!("=== Demo complete ===");
    Ok(())
}

async fn report(service: &MotionService, hero: CharacterId, phase: Duration) {
    tokio::time::sleep(phase).await;
    let state = service.get_state(hero);
    info!(
        position = %state.position(),
        rotation = %state.rotation(),
        speed = state.speed(),
        "Phase finished"
    );
}
