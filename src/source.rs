//! Source trait for captured frames

use crate::pcap::LinkType;
use crate::{CapturedFrame, Result};

/// Trait for frame sources
///
/// Sources hand out frames strictly in capture order and handle their own
/// pacing internally, so the pipeline only ever asks for the next frame.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Get the next captured frame
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - next frame in capture order
    /// - `Ok(None)` - source exhausted (normal termination)
    /// - `Err(e)` - the source is corrupt or unreadable; no more frames follow
    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;

    /// Link type shared by every frame of this source
    fn link_type(&self) -> LinkType;

    /// Short description for logs
    fn describe(&self) -> String;
}
