//! FaceRig - Headless face tracking to avatar rig retargeting
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use facerig::{
    avatar::{MorphRig, RetargetMap},
    config::Config,
    pipeline::{CalibrationClock, FrameLoop, IntervalClock, TrackingGate},
    tracking::{mediapipe::MpTracker, subprocess::TrackerProcess},
};

/// FaceRig - drive an avatar rig from face tracking
#[derive(Parser, Debug)]
#[command(name = "facerig", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Tracker UDP port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Frame rate the loop is driven at (overrides config)
    #[arg(long)]
    fps: Option<u32>,

    /// Calibration countdown ticks (overrides config)
    #[arg(long)]
    calibration_ticks: Option<u32>,

    /// Launch the tracker helper subprocess (overrides config)
    #[arg(long)]
    launch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", facerig::NAME, facerig::VERSION);

    let config = load_config(&args)?;

    info!(
        "Calibration: {} ticks of {}ms",
        config.calibration.ticks, config.calibration.tick_ms
    );
    info!(
        "Pose: fixed scale {}, fixed depth {}",
        config.pose.fixed_scale, config.pose.fixed_depth
    );
    info!(
        "Rig: {} morph targets, {} channel gains",
        config.rig.morph_targets.len(),
        config.retarget.gains.len()
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Tracker helper process
    if config.tracker.auto_launch {
        let process = TrackerProcess::new(&config.tracker);
        tokio::spawn(process.supervise(shutdown_tx.subscribe()));
    } else {
        info!("Tracker auto-launch disabled");
    }

    let mut tracker = MpTracker::new(&config.tracker);
    tracker.start()?;

    // Calibration countdown and its display
    let calibration = CalibrationClock::from_config(&config.calibration);
    let gate = TrackingGate::new(calibration.subscribe());
    let mut countdown = calibration.subscribe();
    let tick_period = config.calibration.tick_period();
    tokio::spawn(async move {
        loop {
            let state = *countdown.borrow_and_update();
            if state.is_tracking() {
                break;
            }
            info!("Calibrating... {}s", state.seconds_remaining(tick_period));
            if countdown.changed().await.is_err() {
                break;
            }
        }
    });
    tokio::spawn(calibration.run());

    // Rig
    let rig = MorphRig::new(&config.rig.morph_targets);
    let mut snapshots = rig.subscribe();
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                snapshot = snapshots.recv() => match snapshot {
                    Ok(snapshot) => debug!(
                        "Rig visible: {}, rotation: {:?}",
                        snapshot.visible, snapshot.pose.rotation
                    ),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Rig snapshot subscriber lagged by {} frames", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
    });

    let mut frame_loop = FrameLoop::new(
        tracker,
        gate,
        RetargetMap::new(config.retarget.gains.clone()),
        &config.pose,
    );
    frame_loop.attach_rig(rig);
    let mut frames = IntervalClock::new(config.frame.frame_period());

    tokio::select! {
        _ = frame_loop.run(&mut frames) => {}
        _ = shutdown_signal() => info!("Shutdown signal received"),
    }

    let _ = shutdown_tx.send(());
    let stats = frame_loop.stats();
    info!(
        "Frames: {} (applied {}, hidden {}, suppressed {}, faults {})",
        stats.frames, stats.applied, stats.hidden, stats.suppressed, stats.faults
    );

    // Give tasks a moment to clean up
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    info!("FaceRig stopped");
    Ok(())
}

/// Load config, apply CLI overrides and validate.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    if let Some(port) = args.port {
        config.tracker.port = port;
    }
    if let Some(fps) = args.fps {
        config.frame.fps = fps;
    }
    if let Some(ticks) = args.calibration_ticks {
        config.calibration.ticks = ticks;
    }
    if args.launch {
        config.tracker.auto_launch = true;
    }

    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
