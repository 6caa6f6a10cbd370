//! Captured frame type flowing out of the trace reader

use std::sync::Arc;
use std::time::Duration;

/// One frame read from a packet capture.
///
/// This is the fundamental data unit of a replay run. Every sFlow structure
/// emitted downstream is derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// 0-based position in capture order
    pub index: u64,

    /// Length of the frame on the wire, before any capture truncation
    pub original_len: u32,

    /// Captured bytes (zero-copy via Arc); may be shorter than `original_len`
    pub data: Arc<[u8]>,

    /// Capture timestamp relative to the Unix epoch
    pub timestamp: Duration,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(index: u64, original_len: u32, data: Vec<u8>, timestamp: Duration) -> Self {
        Self { index, original_len, data: data.into(), timestamp }
    }

    /// Number of bytes actually present in the capture
    pub fn captured_len(&self) -> usize {
        self.data.len()
    }

    /// Whether the capture tool already cut this frame short
    pub fn is_truncated(&self) -> bool {
        (self.data.len() as u64) < u64::from(self.original_len)
    }
}
