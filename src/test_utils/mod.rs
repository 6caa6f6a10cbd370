//! Test utilities: synthetic captures, in-memory sources and sinks
//!
//! Shared by unit tests and the criterion benchmarks so both exercise the same
//! frame shapes, including the 58-frame reference capture whose frame lengths
//! span the 44..1416 byte range a replay must preserve exactly.

#![cfg(any(test, feature = "benchmark"))]

mod capture;

pub use capture::{PcapBuilder, REFERENCE_FRAME_LENGTHS, reference_capture, synthetic_frame};

use crate::pcap::LinkType;
use crate::source::FrameSource;
use crate::transport::DatagramSink;
use crate::{CapturedFrame, ReplayError, Result};
use std::collections::VecDeque;
use std::time::Duration;

/// Sink that keeps every datagram it is handed
#[derive(Debug, Default)]
pub struct MemorySink {
    pub datagrams: Vec<Vec<u8>>,
    fail_after: Option<usize>,
    attempts: usize,
}

impl MemorySink {
    /// Accept `successes` datagrams, then fail every send
    pub fn failing_after(successes: usize) -> Self {
        Self { fail_after: Some(successes), ..Self::default() }
    }
}

#[async_trait::async_trait]
impl DatagramSink for MemorySink {
    async fn send_datagram(&mut self, payload: &[u8]) -> Result<()> {
        self.attempts += 1;
        if self.fail_after.is_some_and(|n| self.attempts > n) {
            return Err(ReplayError::send_failed(self.destination(), "injected send failure"));
        }
        self.datagrams.push(payload.to_vec());
        Ok(())
    }

    fn destination(&self) -> String {
        "memory".to_string()
    }
}

/// Source that replays frames held in memory
pub struct VecSource {
    frames: VecDeque<CapturedFrame>,
    link_type: LinkType,
    delivered: u64,
    fail_at_end: bool,
}

impl VecSource {
    pub fn new(frames: Vec<CapturedFrame>, link_type: LinkType) -> Self {
        Self { frames: frames.into(), link_type, delivered: 0, fail_at_end: false }
    }

    /// Ethernet frames of the given lengths, built with [`synthetic_frame`]
    pub fn from_lengths(lengths: &[usize]) -> Self {
        let frames = lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                CapturedFrame::new(
                    i as u64,
                    len as u32,
                    synthetic_frame(i as u64, len),
                    Duration::from_millis(i as u64),
                )
            })
            .collect();
        Self::new(frames, LinkType::Ethernet)
    }

    /// Report a corrupt record instead of a clean end of capture
    pub fn fail_at_end(mut self) -> Self {
        self.fail_at_end = true;
        self
    }
}

#[async_trait::async_trait]
impl FrameSource for VecSource {
    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        match self.frames.pop_front() {
            Some(frame) => {
                self.delivered += 1;
                Ok(Some(frame))
            }
            None if self.fail_at_end => {
                self.fail_at_end = false;
                Err(ReplayError::trace_corrupt(self.delivered, "injected corrupt record"))
            }
            None => Ok(None),
        }
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
