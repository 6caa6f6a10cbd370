//! Replay packet captures as sFlow v5 telemetry.
//!
//! pcap2sflow reads a classic libpcap capture and re-emits every frame as an
//! sFlow v5 raw-packet flow sample, batched into UDP datagrams and sent to a
//! collector. A collector sees the capture as if a 1:1 sampling agent had
//! observed the traffic live.
//!
//! # Pipeline
//!
//! ```text
//! PcapReader -> RecordBuilder -> SampleAssembler -> DatagramBatcher -> UdpSender
//! ```
//!
//! Everything runs on one task in capture order. The counters that number
//! samples and datagrams live in a [`ReplaySession`], never in globals, so
//! separate runs in one process stay independent.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pcap2sflow::{Pcap2Sflow, ReplayConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> pcap2sflow::Result<()> {
//!     let config = ReplayConfig { max_datagram_size: 1400, ..ReplayConfig::default() };
//!     let report = Pcap2Sflow::replay_file("trace.pcap", "127.0.0.1:6343", &config).await?;
//!     println!("{} frames in {} datagrams", report.frames, report.datagrams);
//!     Ok(())
//! }
//! ```

pub mod config;
mod error;
pub mod pcap;
pub mod replay;
pub mod session;
pub mod sflow;
pub mod source;
pub mod sources;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod transport;
pub mod types;

pub use config::{ReplayConfig, SendErrorPolicy};
pub use error::*;
pub use pcap::{LinkType, PcapReader};
pub use replay::{ReplayReport, Replayer};
pub use session::ReplaySession;
pub use sflow::{AgentAddress, OversizePolicy, SflowDatagram};
pub use source::FrameSource;
pub use sources::PcapSource;
pub use transport::{DatagramSink, UdpSender};
pub use types::*;

use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How counters carry across the captures of one replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// One session for every capture: sample and datagram sequences continue
    #[default]
    Shared,

    /// A fresh session per capture. Capture `i` reports as sub-agent
    /// `sub_agent_id + i`, so no (agent, sub-agent, sequence) triple repeats.
    PerTrace,
}

/// Entry point for replaying captures to a collector.
pub struct Pcap2Sflow;

impl Pcap2Sflow {
    /// Replay one capture file to `target` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The target cannot be resolved
    /// - The capture cannot be opened or is corrupt
    /// - A datagram cannot be sent under [`SendErrorPolicy::Abort`]
    pub async fn replay_file<P: AsRef<Path>>(
        path: P,
        target: &str,
        config: &ReplayConfig,
    ) -> Result<ReplayReport> {
        Self::replay_files(&[path], target, config, SessionMode::Shared, CancellationToken::new())
            .await
    }

    /// Replay several captures, one after another, to `target`.
    ///
    /// Every capture is opened before the first datagram leaves, so a missing
    /// file aborts the run without sending anything. See [`SessionMode`] for
    /// how sequence numbers carry from one capture to the next.
    pub async fn replay_files<P: AsRef<Path>>(
        paths: &[P],
        target: &str,
        config: &ReplayConfig,
        mode: SessionMode,
        cancel: CancellationToken,
    ) -> Result<ReplayReport> {
        config.validate()?;

        let sender = UdpSender::connect(target).await?;
        if config.max_datagram_size > sender.max_payload() {
            return Err(ReplayError::config(
                "max_datagram_size",
                format!(
                    "{} exceeds the {} byte UDP payload limit toward {}",
                    config.max_datagram_size,
                    sender.max_payload(),
                    sender.destination_addr()
                ),
            ));
        }

        let agent_address =
            config.agent_address.map(AgentAddress::from).unwrap_or_else(|| sender.agent_address());

        let mut sources = paths
            .iter()
            .map(|path| PcapSource::open(path, config.pacing))
            .collect::<Result<Vec<_>>>()?;

        let mut replayer =
            Replayer::new(sender, config.send_error_policy).with_cancellation(cancel);
        let mut session = ReplaySession::new(config, agent_address);
        let mut total = ReplayReport::default();

        for (i, source) in sources.iter_mut().enumerate() {
            if i > 0 && mode == SessionMode::PerTrace {
                let trace_config = ReplayConfig {
                    sub_agent_id: config.sub_agent_id.wrapping_add(i as u32),
                    ..config.clone()
                };
                session = ReplaySession::new(&trace_config, agent_address);
            }

            let report = replayer.run(source, &mut session).await?;
            let cancelled = report.cancelled;
            total.merge(report);
            if cancelled {
                break;
            }
        }

        if !total.oversize_samples.is_empty() {
            warn!(
                "{} samples were sent above the {} byte ceiling",
                total.oversize_samples.len(),
                config.max_datagram_size
            );
        }
        info!(
            "Replay finished: {} frames, {} samples, {} datagrams, {} bytes",
            total.frames, total.samples, total.datagrams, total.bytes_sent
        );

        Ok(total)
    }
}
