//! Size-bounded datagram batching
//!
//! Samples are appended to an open datagram until the next one would push the
//! serialized size past the configured ceiling. The open datagram is then
//! closed, numbered and handed back, and the new sample starts the next one.
//!
//! A sample that is too large on its own never fits anywhere. Under
//! [`OversizePolicy::EmitAlone`] it still travels, alone in its own datagram,
//! and the ceiling is knowingly exceeded; the event is reported as an
//! [`OversizeSample`]. Under [`OversizePolicy::Fail`] the batcher refuses it.

use super::datagram::{AgentAddress, SflowDatagram};
use super::sample::FlowSample;
use crate::{ReplayError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What to do with a sample that cannot fit under the ceiling even alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizePolicy {
    /// Send it alone in a datagram that exceeds the ceiling
    #[default]
    EmitAlone,
    /// Abort with [`ReplayError::OversizeSample`]
    Fail,
}

/// Non-fatal report of a sample sent above the ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OversizeSample {
    pub sample_sequence: u32,
    /// Size of the datagram carrying the sample alone
    pub datagram_len: usize,
    pub max_datagram_size: usize,
}

/// Result of pushing one sample
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Datagram closed to make room for the pushed sample
    pub closed: Option<SflowDatagram>,
    pub oversize: Option<OversizeSample>,
}

/// Packs flow samples into numbered datagrams
#[derive(Debug)]
pub struct DatagramBatcher {
    agent_address: AgentAddress,
    sub_agent_id: u32,
    max_datagram_size: usize,
    max_samples: Option<usize>,
    policy: OversizePolicy,
    next_sequence: u32,
    pending: Vec<FlowSample>,
    pending_len: usize,
}

impl DatagramBatcher {
    pub fn new(
        agent_address: AgentAddress,
        sub_agent_id: u32,
        max_datagram_size: usize,
        initial_sequence: u32,
    ) -> Self {
        Self {
            agent_address,
            sub_agent_id,
            max_datagram_size,
            max_samples: None,
            policy: OversizePolicy::default(),
            next_sequence: initial_sequence,
            pending: Vec::new(),
            pending_len: 0,
        }
    }

    /// Cap the number of samples per datagram in addition to the byte ceiling
    pub fn with_max_samples(mut self, max_samples: Option<usize>) -> Self {
        self.max_samples = max_samples.map(|n| n.max(1));
        self
    }

    pub fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sequence number the next closed datagram will carry
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn max_datagram_size(&self) -> usize {
        self.max_datagram_size
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Serialized size of the open datagram
    pub fn pending_len(&self) -> usize {
        self.agent_address.header_len() + self.pending_len
    }

    /// Append a sample, closing the open datagram first if it would overflow
    ///
    /// `uptime_ms` stamps the datagram closed by this call, if any.
    pub fn push(&mut self, sample: FlowSample, uptime_ms: u32) -> Result<BatchOutcome> {
        let sample_len = sample.encoded_len();
        let header_len = self.agent_address.header_len();

        let mut outcome = BatchOutcome::default();

        if header_len + sample_len > self.max_datagram_size {
            if self.policy == OversizePolicy::Fail {
                return Err(ReplayError::OversizeSample {
                    sample_sequence: sample.sequence_number,
                    encoded_len: sample_len,
                    max_datagram_size: self.max_datagram_size,
                });
            }

            let report = OversizeSample {
                sample_sequence: sample.sequence_number,
                datagram_len: header_len + sample_len,
                max_datagram_size: self.max_datagram_size,
            };
            warn!(
                "Sample {} needs a {} byte datagram, above the {} byte ceiling; sending it alone",
                report.sample_sequence, report.datagram_len, report.max_datagram_size
            );
            outcome.oversize = Some(report);
        }

        let overflows = header_len + self.pending_len + sample_len > self.max_datagram_size;
        let full = self.max_samples.is_some_and(|max| self.pending.len() >= max);
        if !self.pending.is_empty() && (overflows || full) {
            outcome.closed = self.close(uptime_ms);
        }

        self.pending_len += sample_len;
        self.pending.push(sample);

        Ok(outcome)
    }

    /// Close the open datagram, if it holds any sample
    pub fn finish(&mut self, uptime_ms: u32) -> Option<SflowDatagram> {
        self.close(uptime_ms)
    }

    fn close(&mut self, uptime_ms: u32) -> Option<SflowDatagram> {
        if self.pending.is_empty() {
            return None;
        }

        let datagram = SflowDatagram {
            agent_address: self.agent_address,
            sub_agent_id: self.sub_agent_id,
            sequence_number: self.next_sequence,
            uptime_ms,
            samples: std::mem::take(&mut self.pending),
        };
        self.pending_len = 0;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        debug!(
            "Closed datagram {} with {} samples",
            datagram.sequence_number,
            datagram.samples.len()
        );
        Some(datagram)
    }
}
