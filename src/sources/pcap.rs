//! Frame source backed by a capture file

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, info, trace};

use crate::pcap::{LinkType, PcapReader};
use crate::source::FrameSource;
use crate::types::Pacing;
use crate::{CapturedFrame, Result};

/// Frame source that reads a pcap capture and paces its frames
pub struct PcapSource<R> {
    /// Capture reader
    reader: PcapReader<R>,

    /// Replay pacing
    pacing: Pacing,

    /// Fixed-rate ticker, created on first use inside the runtime
    interval: Option<Interval>,

    /// Replay start and first capture timestamp, for timestamp pacing
    clock: Option<(Instant, Duration)>,
}

impl PcapSource<BufReader<File>> {
    /// Open a capture file
    pub fn open<P: AsRef<Path>>(path: P, pacing: Pacing) -> Result<Self> {
        let reader = PcapReader::open(path)?;
        info!(
            "Opened capture {} (link type {}, pacing {:?})",
            reader.file_path().display(),
            reader.link_type().as_u32(),
            pacing
        );
        Ok(Self::new(reader, pacing))
    }
}

impl<R: Read> PcapSource<R> {
    pub fn new(reader: PcapReader<R>, pacing: Pacing) -> Self {
        Self { reader, pacing: pacing.normalize(), interval: None, clock: None }
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Frames handed out so far
    pub fn frames_read(&self) -> u64 {
        self.reader.frames_read()
    }

    async fn pace(&mut self, frame: &CapturedFrame) {
        match self.pacing {
            Pacing::Unpaced => {}
            Pacing::PacketsPerSecond(_) => {
                if let Some(period) = self.pacing.frame_interval() {
                    let ticker = self.interval.get_or_insert_with(|| {
                        let mut ticker = interval(period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        ticker
                    });
                    ticker.tick().await;
                }
            }
            Pacing::CaptureTimestamps { .. } => {
                let (started, first_ts) =
                    *self.clock.get_or_insert_with(|| (Instant::now(), frame.timestamp));
                // Out-of-order timestamps are sent immediately
                let capture_offset = frame.timestamp.saturating_sub(first_ts);
                if let Some(offset) = self.pacing.scale_offset(capture_offset) {
                    sleep_until(started + offset).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<R: Read + Send> FrameSource for PcapSource<R> {
    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        let frame = match self.reader.read_next_frame()? {
            Some(frame) => frame,
            None => {
                debug!("Capture exhausted after {} frames", self.reader.frames_read());
                return Ok(None);
            }
        };

        self.pace(&frame).await;
        trace!("Frame {} released ({} bytes)", frame.index, frame.captured_len());

        Ok(Some(frame))
    }

    fn link_type(&self) -> LinkType {
        self.reader.link_type()
    }

    fn describe(&self) -> String {
        self.reader.file_path().display().to_string()
    }
}
