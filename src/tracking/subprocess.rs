//! Face tracker helper process
//!
//! Runs the MediaPipe Face Landmarker helper script as a child process and
//! keeps it alive. The helper streams its results to
//! [`MpTracker`](crate::tracking::mediapipe::MpTracker) over UDP.
//!
//! A helper that keeps dying shortly after launch is given up on after
//! `max_restarts` attempts instead of being relaunched forever.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::TrackerConfig;
use crate::error::TrackingError;

/// A run at least this long resets the restart budget.
const STABLE_RUN: Duration = Duration::from_secs(10);

const HEALTH_CHECK: Duration = Duration::from_secs(1);

/// Observed state of the helper process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Never launched, or stopped on request
    Idle,
    Running,
    /// Exited on its own; carries how long it ran
    Exited(Option<ExitStatus>, Duration),
}

/// Owns the helper child process and its restart budget
pub struct TrackerProcess {
    config: TrackerConfig,
    child: Option<(Child, Instant)>,
    restarts: u32,
}

impl TrackerProcess {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            config: config.clone(),
            child: None,
            restarts: 0,
        }
    }

    /// Arguments passed to `python3`, script path first.
    pub fn args(&self) -> Vec<String> {
        let c = &self.config;
        let mut args = vec![c.tracker_script.clone()];
        for (flag, value) in [
            ("--ip", c.listen_address.clone()),
            ("--port", c.port.to_string()),
            ("--camera", c.camera_device.to_string()),
            ("--width", c.capture_width.to_string()),
            ("--height", c.capture_height.to_string()),
            ("--fps", c.capture_fps.to_string()),
        ] {
            args.push(flag.to_string());
            args.push(value);
        }
        args
    }

    /// Spawn the helper unless one is already alive.
    pub fn launch(&mut self) -> Result<(), TrackingError> {
        if self.poll() == ProcessState::Running {
            return Ok(());
        }

        let child = Command::new("python3")
            .args(self.args())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TrackingError::Subprocess(format!("{}: {}", self.config.tracker_script, e))
            })?;

        tracing::info!(
            "Launched tracker helper {} (pid {:?}) on camera {}",
            self.config.tracker_script,
            child.id(),
            self.config.camera_device,
        );
        self.child = Some((child, Instant::now()));
        Ok(())
    }

    /// Check on the child without blocking.
    pub fn poll(&mut self) -> ProcessState {
        let Some((child, started)) = &mut self.child else {
            return ProcessState::Idle;
        };

        let ran_for = started.elapsed();
        let status = match child.try_wait() {
            Ok(None) => return ProcessState::Running,
            Ok(Some(status)) => Some(status),
            Err(e) => {
                tracing::error!("Lost track of tracker helper: {}", e);
                None
            }
        };

        self.child = None;
        self.record_exit(ran_for);
        ProcessState::Exited(status, ran_for)
    }

    fn record_exit(&mut self, ran_for: Duration) {
        if ran_for >= STABLE_RUN {
            self.restarts = 0;
        }
    }

    /// Whether another relaunch is allowed after an exit.
    pub fn may_restart(&self) -> bool {
        self.config.auto_restart && self.restarts < self.config.max_restarts
    }

    /// Kill the child if one is alive.
    pub async fn stop(&mut self) {
        if let Some((mut child, _)) = self.child.take() {
            tracing::info!("Stopping tracker helper (pid {:?})", child.id());
            let _ = child.kill().await;
        }
    }

    /// Launch the helper and relaunch it on exit until shutdown or the
    /// restart budget runs out.
    pub async fn supervise(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        if let Err(e) = self.launch() {
            tracing::error!("Tracker helper failed to launch: {}", e);
        }

        let delay = Duration::from_secs(self.config.restart_delay_secs);
        let mut health = tokio::time::interval(HEALTH_CHECK);

        loop {
            tokio::select! {
                _ = health.tick() => {
                    let ProcessState::Exited(status, ran_for) = self.poll() else {
                        continue;
                    };
                    tracing::warn!("Tracker helper exited ({:?}) after {:?}", status, ran_for);

                    if !self.may_restart() {
                        tracing::error!(
                            "Tracker helper not restarted ({} restarts used); face tracking is offline",
                            self.restarts
                        );
                        break;
                    }

                    self.restarts += 1;
                    tokio::time::sleep(delay).await;
                    if let Err(e) = self.launch() {
                        tracing::error!("Tracker helper failed to relaunch: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    self.stop().await;
                    break;
                }
            }
        }
    }
}
