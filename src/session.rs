//! Replay session state
//!
//! A [`ReplaySession`] owns every counter of one replay run: the sample
//! sequence and pool inside the [`SampleAssembler`] and the datagram sequence
//! inside the [`DatagramBatcher`]. Nothing here is global, so two sessions in
//! the same process produce two independent, internally valid series.

use crate::config::ReplayConfig;
use crate::pcap::LinkType;
use crate::sflow::{
    AgentAddress, DatagramBatcher, FlowSample, HeaderProtocol, OversizeSample, RecordBuilder,
    SampleAssembler, SflowDatagram,
};
use crate::{CapturedFrame, ReplayError, Result};
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Counters and batching state for one replay run
#[derive(Debug)]
pub struct ReplaySession {
    builder: RecordBuilder,
    assembler: SampleAssembler,
    batcher: DatagramBatcher,
    started: Instant,
    frames: u64,
    samples: u64,
    oversize: Vec<OversizeSample>,
}

impl ReplaySession {
    pub fn new(config: &ReplayConfig, agent_address: AgentAddress) -> Self {
        let batcher = DatagramBatcher::new(
            agent_address,
            config.sub_agent_id,
            config.max_datagram_size,
            config.initial_datagram_sequence,
        )
        .with_max_samples(config.max_samples_per_datagram)
        .with_oversize_policy(config.oversize_policy);

        debug!(
            "New replay session: agent {}, ceiling {} bytes, first datagram {}",
            agent_address.ip(),
            config.max_datagram_size,
            config.initial_datagram_sequence
        );

        Self {
            builder: RecordBuilder::new(LinkType::Ethernet, config.capture_length_limit),
            assembler: SampleAssembler::new(config.sample_settings()),
            batcher,
            started: Instant::now(),
            frames: 0,
            samples: 0,
            oversize: Vec::new(),
        }
    }

    /// Prepare for the frames of a (possibly new) capture
    ///
    /// Fails for a link type no sFlow header protocol describes, the same way
    /// opening such a capture file does.
    pub fn begin_trace(&mut self, trace: &str, link_type: LinkType) -> Result<()> {
        if !HeaderProtocol::supports(link_type) {
            return Err(ReplayError::trace_open(
                PathBuf::from(trace),
                format!("unsupported link type {}", link_type.as_u32()),
            ));
        }
        self.builder.set_link_type(link_type);
        Ok(())
    }

    /// Milliseconds since the session started, wrapping like sysUpTime
    pub fn uptime_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    /// Turn one frame into a record, sample and possibly a closed datagram
    pub fn push_frame(&mut self, frame: &CapturedFrame) -> Result<Option<SflowDatagram>> {
        let record = self.builder.build(frame)?;
        self.frames += 1;

        let Some(sample) = self.assembler.push(record) else {
            trace!("Frame {} held for a multi-record sample", frame.index);
            return Ok(None);
        };

        self.push_sample(sample)
    }

    /// Flush partial samples and the open datagram
    ///
    /// Flushing a partial sample can close the open datagram first, so up to
    /// two datagrams come back.
    pub fn finish(&mut self) -> Result<Vec<SflowDatagram>> {
        let mut datagrams = Vec::with_capacity(2);

        if let Some(sample) = self.assembler.flush() {
            datagrams.extend(self.push_sample(sample)?);
        }
        datagrams.extend(self.batcher.finish(self.uptime_ms()));

        Ok(datagrams)
    }

    fn push_sample(&mut self, sample: FlowSample) -> Result<Option<SflowDatagram>> {
        self.samples += 1;
        let outcome = self.batcher.push(sample, self.uptime_ms())?;
        self.oversize.extend(outcome.oversize);
        Ok(outcome.closed)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Sequence number the next datagram will carry
    pub fn next_datagram_sequence(&self) -> u32 {
        self.batcher.next_sequence()
    }

    pub fn next_sample_sequence(&self) -> u32 {
        self.assembler.next_sequence()
    }

    /// Oversize reports gathered since the last call
    pub fn take_oversize(&mut self) -> Vec<OversizeSample> {
        std::mem::take(&mut self.oversize)
    }
}
