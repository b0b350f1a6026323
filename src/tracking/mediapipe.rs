//! MediaPipe face tracking receiver
//!
//! Receives JSON-over-UDP packets from the Face Landmarker helper script.
//! Each packet carries the facial transformation matrix and the ARKit-named
//! blendshape categories for one camera frame.

use glam::Mat4;
use serde::Deserialize;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::TrackerConfig;
use crate::error::TrackingError;
use crate::tracking::{DetectionResult, Expression, Tracker};

/// A single JSON packet from the MediaPipe tracker
#[derive(Debug, Clone, Deserialize)]
pub struct MpPacket {
    /// Whether a face was detected this frame
    #[serde(default = "default_true")]
    pub face_detected: bool,
    /// Facial transformation matrix, column-major
    #[serde(default)]
    pub transform: Option<[f32; 16]>,
    /// Blendshape categories in model order
    #[serde(default)]
    pub blendshapes: Option<Vec<Expression>>,
}

fn default_true() -> bool {
    true
}

impl MpPacket {
    /// Convert to the pipeline's per-frame detection.
    pub fn to_detection(&self) -> DetectionResult {
        if !self.face_detected {
            return DetectionResult::empty();
        }

        DetectionResult {
            transform: self.transform.map(|m| Mat4::from_cols_array(&m)),
            expressions: self.blendshapes.clone(),
        }
    }
}

/// MediaPipe JSON-over-UDP receiver
pub struct MpTracker {
    config: TrackerConfig,
    socket: Option<UdpSocket>,
    last_packet: Option<(MpPacket, Instant)>,
}

impl MpTracker {
    /// Create a new MediaPipe receiver (does not bind yet)
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            config: config.clone(),
            socket: None,
            last_packet: None,
        }
    }

    /// Bind the UDP socket and start receiving
    pub fn start(&mut self) -> Result<(), TrackingError> {
        let addr = format!("{}:{}", self.config.listen_address, self.config.port);

        let socket = UdpSocket::bind(&addr).map_err(|e| {
            TrackingError::Tracker(format!("Failed to bind to {}: {}", addr, e))
        })?;

        socket.set_nonblocking(true).map_err(|e| {
            TrackingError::Tracker(format!("Failed to set non-blocking: {}", e))
        })?;

        tracing::info!("MediaPipe receiver listening on {}", addr);
        self.socket = Some(socket);

        Ok(())
    }

    /// Address the socket is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Drain all pending datagrams, keeping the newest one.
    ///
    /// Returns an error if the newest datagram could not be parsed.
    fn drain(&mut self) -> Result<(), TrackingError> {
        let socket = match &self.socket {
            Some(s) => s,
            None => return Err(TrackingError::Tracker("Receiver not started".to_string())),
        };

        let mut buf = [0u8; 65536];
        let mut newest: Option<Result<MpPacket, TrackingError>> = None;

        loop {
            match socket.recv(&mut buf) {
                Ok(0) => continue,
                Ok(size) => {
                    newest = Some(serde_json::from_slice(&buf[..size]).map_err(|e| {
                        TrackingError::Tracker(format!("JSON parse error: {}", e))
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    return Err(TrackingError::Tracker(format!("Receive error: {}", e)));
                }
            }
        }

        match newest {
            Some(Ok(packet)) => {
                self.last_packet = Some((packet, Instant::now()));
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Ok(()),
        }
    }

    fn current_detection(&self) -> DetectionResult {
        let stale_after = Duration::from_millis(self.config.stale_after_ms);
        match &self.last_packet {
            Some((packet, received)) if received.elapsed() <= stale_after => {
                packet.to_detection()
            }
            _ => DetectionResult::empty(),
        }
    }
}

impl Tracker for MpTracker {
    async fn detect(&mut self, _timestamp: Duration) -> Result<DetectionResult, TrackingError> {
        self.drain()?;
        Ok(self.current_detection())
    }
}
