//! The replay pipeline
//!
//! [`Replayer`] drives one [`FrameSource`] through a [`ReplaySession`] into a
//! [`DatagramSink`], strictly in capture order on a single task. Reads are
//! raced against a [`CancellationToken`]; a cancelled run still flushes the
//! datagram it was building.

use crate::config::SendErrorPolicy;
use crate::session::ReplaySession;
use crate::sflow::{OversizeSample, SflowDatagram};
use crate::source::FrameSource;
use crate::transport::DatagramSink;
use crate::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Summary of a replay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub frames: u64,
    pub samples: u64,
    pub datagrams: u64,
    pub bytes_sent: u64,
    pub first_datagram_sequence: Option<u32>,
    pub last_datagram_sequence: Option<u32>,
    pub oversize_samples: Vec<OversizeSample>,
    /// Datagrams dropped under [`SendErrorPolicy::Skip`]
    pub skipped_sends: u64,
    pub cancelled: bool,
}

impl ReplayReport {
    /// Fold the report of a later run into this one
    pub fn merge(&mut self, other: ReplayReport) {
        self.frames += other.frames;
        self.samples += other.samples;
        self.datagrams += other.datagrams;
        self.bytes_sent += other.bytes_sent;
        if self.first_datagram_sequence.is_none() {
            self.first_datagram_sequence = other.first_datagram_sequence;
        }
        if other.last_datagram_sequence.is_some() {
            self.last_datagram_sequence = other.last_datagram_sequence;
        }
        self.oversize_samples.extend(other.oversize_samples);
        self.skipped_sends += other.skipped_sends;
        self.cancelled |= other.cancelled;
    }
}

/// Runs frames from a source through a session into a sink
pub struct Replayer<K> {
    sink: K,
    send_error_policy: SendErrorPolicy,
    cancel: CancellationToken,
    buffer: Vec<u8>,
}

impl<K: DatagramSink> Replayer<K> {
    pub fn new(sink: K, send_error_policy: SendErrorPolicy) -> Self {
        Self { sink, send_error_policy, cancel: CancellationToken::new(), buffer: Vec::new() }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Replay every frame of `source` through `session`
    ///
    /// Returns when the source is exhausted, the token is cancelled, or a
    /// fatal error occurs. Datagrams already sent are never retracted; on a
    /// corrupt capture the frames read before the bad record are still
    /// flushed before the error is returned.
    pub async fn run<S>(&mut self, source: &mut S, session: &mut ReplaySession) -> Result<ReplayReport>
    where
        S: FrameSource + ?Sized,
    {
        info!("Replaying {} to {}", source.describe(), self.sink.destination());
        session.begin_trace(&source.describe(), source.link_type())?;
        let samples_before = session.samples();

        let mut report = ReplayReport::default();

        loop {
            if self.cancel.is_cancelled() {
                info!("Replay cancelled after {} frames", report.frames);
                report.cancelled = true;
                break;
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Replay cancelled during read after {} frames", report.frames);
                    report.cancelled = true;
                    break;
                }
                result = source.next_frame() => result,
            };

            let frame = match result {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    error!("Aborting replay of {}: {}", source.describe(), e);
                    if let Err(flush_error) = self.flush(session, &mut report).await {
                        error!(
                            "Pending frames of {} not flushed: {}",
                            source.describe(),
                            flush_error
                        );
                    }
                    return Err(e);
                }
            };

            report.frames += 1;
            if let Some(datagram) = session.push_frame(&frame)? {
                self.send(&datagram, &mut report).await?;
            }
        }

        self.flush(session, &mut report).await?;
        report.samples = session.samples() - samples_before;

        info!(
            "Replayed {} frames of {} in {} datagrams ({} bytes)",
            report.frames,
            source.describe(),
            report.datagrams,
            report.bytes_sent
        );
        Ok(report)
    }

    async fn flush(&mut self, session: &mut ReplaySession, report: &mut ReplayReport) -> Result<()> {
        for datagram in session.finish()? {
            self.send(&datagram, report).await?;
        }
        report.oversize_samples.extend(session.take_oversize());
        Ok(())
    }

    async fn send(&mut self, datagram: &SflowDatagram, report: &mut ReplayReport) -> Result<()> {
        self.buffer.clear();
        datagram.encode_into(&mut self.buffer);

        match self.sink.send_datagram(&self.buffer).await {
            Ok(()) => {
                debug!(
                    "Datagram {} sent: {} samples, {} bytes",
                    datagram.sequence_number,
                    datagram.samples.len(),
                    self.buffer.len()
                );
                report.datagrams += 1;
                report.bytes_sent += self.buffer.len() as u64;
            }
            Err(e) if self.send_error_policy == SendErrorPolicy::Skip && !e.is_fatal() => {
                warn!("Skipping datagram {}: {}", datagram.sequence_number, e);
                report.skipped_sends += 1;
            }
            Err(e) => {
                error!("Datagram {} not sent: {}", datagram.sequence_number, e);
                return Err(e);
            }
        }

        report.first_datagram_sequence.get_or_insert(datagram.sequence_number);
        report.last_datagram_sequence = Some(datagram.sequence_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplayConfig;
    use crate::pcap::LinkType;
    use crate::sflow::AgentAddress;
    use crate::{CapturedFrame, ReplayError};
    use crate::test_utils::{MemorySink, REFERENCE_FRAME_LENGTHS, VecSource};
    use sflow_parser::models::{FlowData, SampleData};
    use std::net::Ipv4Addr;

    fn session(config: &ReplayConfig) -> ReplaySession {
        ReplaySession::new(config, AgentAddress::V4(Ipv4Addr::new(198, 51, 100, 7)))
    }

    /// (sample sequence, header length) of every record the sink received
    fn received(sink: &MemorySink) -> Vec<(u32, usize)> {
        let mut out = Vec::new();
        for bytes in &sink.datagrams {
            let datagram = sflow_parser::parse_datagram(bytes).expect("collector parses datagram");
            for record in datagram.samples {
                let SampleData::FlowSample(sample) = record.sample_data else { continue };
                for flow in sample.flow_records {
                    if let FlowData::SampledHeader(header) = flow.flow_data {
                        out.push((sample.sequence_number, header.header.len()));
                    }
                }
            }
        }
        out
    }

    #[tokio::test]
    async fn test_reference_replay_reaches_sink() {
        let mut source = VecSource::from_lengths(&REFERENCE_FRAME_LENGTHS);
        let mut session = session(&ReplayConfig::default());
        let mut replayer = Replayer::new(MemorySink::default(), SendErrorPolicy::Abort);

        let report = replayer.run(&mut source, &mut session).await.unwrap();
        assert_eq!(report.frames, 58);
        assert_eq!(report.samples, 58);
        assert!(!report.cancelled);

        let sink = replayer.into_sink();
        assert_eq!(report.datagrams as usize, sink.datagrams.len());
        assert_eq!(report.first_datagram_sequence, Some(1));
        assert_eq!(report.last_datagram_sequence, Some(sink.datagrams.len() as u32));

        let lengths: Vec<usize> = received(&sink).into_iter().map(|(_, len)| len).collect();
        assert_eq!(lengths, REFERENCE_FRAME_LENGTHS.to_vec());
    }

    #[tokio::test]
    async fn test_empty_source_sends_nothing() {
        let mut source = VecSource::from_lengths(&[]);
        let mut session = session(&ReplayConfig::default());
        let mut replayer = Replayer::new(MemorySink::default(), SendErrorPolicy::Abort);

        let report = replayer.run(&mut source, &mut session).await.unwrap();
        assert_eq!(report, ReplayReport::default());
        assert!(replayer.sink().datagrams.is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_aborts_by_default() {
        let mut source = VecSource::from_lengths(&[60, 60]);
        let mut session = session(&ReplayConfig::default());
        let mut replayer = Replayer::new(MemorySink::failing_after(0), SendErrorPolicy::Abort);

        let err = replayer.run(&mut source, &mut session).await.unwrap_err();
        assert!(matches!(err, ReplayError::Send { .. }));
    }

    #[tokio::test]
    async fn test_skip_policy_counts_failed_sends() {
        let config = ReplayConfig { max_samples_per_datagram: Some(1), ..ReplayConfig::default() };
        let mut source = VecSource::from_lengths(&[60, 60, 60]);
        let mut session = session(&config);
        let mut replayer = Replayer::new(MemorySink::failing_after(1), SendErrorPolicy::Skip);

        let report = replayer.run(&mut source, &mut session).await.unwrap();
        assert_eq!(report.datagrams, 1);
        assert_eq!(report.skipped_sends, 2);
        // Skipped datagrams still consume their sequence numbers
        assert_eq!(report.last_datagram_sequence, Some(3));
    }

    #[tokio::test]
    async fn test_corrupt_source_flushes_then_fails() {
        let mut source = VecSource::from_lengths(&[60, 70]).fail_at_end();
        let mut session = session(&ReplayConfig::default());
        let mut replayer = Replayer::new(MemorySink::default(), SendErrorPolicy::Abort);

        let err = replayer.run(&mut source, &mut session).await.unwrap_err();
        assert!(matches!(err, ReplayError::TraceCorrupt { frame_index: 2, .. }));

        let sink = replayer.into_sink();
        assert_eq!(sink.datagrams.len(), 1);
        assert_eq!(received(&sink), vec![(1, 60), (2, 70)]);
    }

    #[tokio::test]
    async fn test_corrupt_source_error_survives_failed_flush() {
        let mut source = VecSource::from_lengths(&[60, 70]).fail_at_end();
        let mut session = session(&ReplayConfig::default());
        let mut replayer = Replayer::new(MemorySink::failing_after(0), SendErrorPolicy::Abort);

        let err = replayer.run(&mut source, &mut session).await.unwrap_err();
        assert!(matches!(err, ReplayError::TraceCorrupt { frame_index: 2, .. }));
        assert!(replayer.sink().datagrams.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_link_type_sends_nothing() {
        let frames = vec![CapturedFrame::new(0, 60, vec![0u8; 60], std::time::Duration::ZERO)];
        let mut source = VecSource::new(frames, LinkType::Other(189));
        let mut session = session(&ReplayConfig::default());
        let mut replayer = Replayer::new(MemorySink::default(), SendErrorPolicy::Abort);

        let err = replayer.run(&mut source, &mut session).await.unwrap_err();
        assert!(matches!(err, ReplayError::TraceOpen { .. }));
        assert!(replayer.sink().datagrams.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_flushes_pending() {
        let mut source = VecSource::from_lengths(&[60, 70, 80]);
        let mut session = session(&ReplayConfig::default());
        let cancel = CancellationToken::new();
        let mut replayer = Replayer::new(MemorySink::default(), SendErrorPolicy::Abort)
            .with_cancellation(cancel.clone());

        // Pull one frame by hand so the session has something pending
        let frame = source.next_frame().await.unwrap().unwrap();
        session.push_frame(&frame).unwrap();
        cancel.cancel();

        let report = replayer.run(&mut source, &mut session).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.frames, 0);
        assert_eq!(report.datagrams, 1);
    }

    #[tokio::test]
    async fn test_shared_session_continues_sequences() {
        let mut session = session(&ReplayConfig::default());
        let mut replayer = Replayer::new(MemorySink::default(), SendErrorPolicy::Abort);

        let mut total = ReplayReport::default();
        for _ in 0..2 {
            let mut source = VecSource::from_lengths(&[60, 60]);
            total.merge(replayer.run(&mut source, &mut session).await.unwrap());
        }

        assert_eq!(total.frames, 4);
        assert_eq!(total.first_datagram_sequence, Some(1));
        assert_eq!(total.last_datagram_sequence, Some(2));

        let samples: Vec<u32> = received(replayer.sink()).into_iter().map(|(seq, _)| seq).collect();
        assert_eq!(samples, vec![1, 2, 3, 4]);
    }
}
