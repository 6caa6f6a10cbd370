//! Replay pacing control

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Slowest capture-timestamp speed a replay accepts
pub const MIN_SPEED: f64 = 1e-3;

/// Longest delay a scaled capture offset can ask for
pub const MAX_SCALED_OFFSET: Duration = Duration::from_secs(86_400 * 365 * 30);

/// How fast frames are pushed through a replay run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// As fast as the pipeline can go
    #[default]
    Unpaced,

    /// At most this many frames per second
    PacketsPerSecond(u32),

    /// Reproduce the capture's inter-frame gaps, divided by `speed`
    CaptureTimestamps { speed: f64 },
}

impl Pacing {
    /// Normalize degenerate settings
    ///
    /// A zero rate or a non-positive speed means no pacing at all.
    pub fn normalize(self) -> Self {
        match self {
            Pacing::PacketsPerSecond(0) => Pacing::Unpaced,
            Pacing::CaptureTimestamps { speed } if !(speed.is_finite() && speed > 0.0) => {
                Pacing::Unpaced
            }
            other => other,
        }
    }

    /// Fixed per-frame interval, if this pacing uses one
    pub fn frame_interval(self) -> Option<Duration> {
        match self.normalize() {
            Pacing::PacketsPerSecond(pps) => Some(Duration::from_secs_f64(1.0 / pps as f64)),
            _ => None,
        }
    }

    /// Scale a capture-relative offset to a replay-relative offset
    ///
    /// Saturates at [`MAX_SCALED_OFFSET`] so a tiny speed never overflows
    /// the replay clock.
    pub fn scale_offset(self, capture_offset: Duration) -> Option<Duration> {
        match self.normalize() {
            Pacing::CaptureTimestamps { speed } => {
                let scaled = Duration::try_from_secs_f64(capture_offset.as_secs_f64() / speed)
                    .unwrap_or(MAX_SCALED_OFFSET);
                Some(scaled.min(MAX_SCALED_OFFSET))
            }
            _ => None,
        }
    }
}
