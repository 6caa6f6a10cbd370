//! Flow samples and the counters that number them

use super::record::RawPacketFlowRecord;
use super::{FLOW_SAMPLE_FIXED_SIZE, SAMPLE_FORMAT_FLOW, TLV_HEADER_SIZE, put_u32};
use tracing::trace;

/// An sFlow flow sample carrying one or more raw-packet records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSample {
    pub sequence_number: u32,
    /// `(source type << 24) | index`; type 0 is ifIndex
    pub source_id: u32,
    pub sampling_rate: u32,
    pub sample_pool: u32,
    pub drops: u32,
    pub input_interface: u32,
    pub output_interface: u32,
    pub records: Vec<RawPacketFlowRecord>,
}

impl FlowSample {
    /// Serialized size including the format and length words
    pub fn encoded_len(&self) -> usize {
        TLV_HEADER_SIZE + self.body_len()
    }

    fn body_len(&self) -> usize {
        FLOW_SAMPLE_FIXED_SIZE + self.records.iter().map(|r| r.encoded_len()).sum::<usize>()
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        put_u32(buf, SAMPLE_FORMAT_FLOW);
        put_u32(buf, self.body_len() as u32);
        put_u32(buf, self.sequence_number);
        put_u32(buf, self.source_id);
        put_u32(buf, self.sampling_rate);
        put_u32(buf, self.sample_pool);
        put_u32(buf, self.drops);
        put_u32(buf, self.input_interface);
        put_u32(buf, self.output_interface);
        put_u32(buf, self.records.len() as u32);
        for record in &self.records {
            record.encode_into(buf);
        }
    }
}

/// Settings shared by every sample of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSettings {
    pub sampling_rate: u32,
    pub source_id_index: u32,
    pub input_interface: u32,
    pub output_interface: u32,
    pub records_per_sample: usize,
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self {
            sampling_rate: 1,
            source_id_index: 0,
            input_interface: 0,
            output_interface: 0,
            records_per_sample: 1,
        }
    }
}

/// Wraps records into flow samples
///
/// Owns the sample sequence counter (first sample is 1) and the sample pool
/// (one per record considered). Both wrap at `u32::MAX` like any sFlow agent
/// counter.
#[derive(Debug)]
pub struct SampleAssembler {
    settings: SampleSettings,
    next_sequence: u32,
    pool: u32,
    pending: Vec<RawPacketFlowRecord>,
}

impl SampleAssembler {
    pub fn new(settings: SampleSettings) -> Self {
        let records_per_sample = settings.records_per_sample.max(1);
        Self {
            settings: SampleSettings { records_per_sample, ..settings },
            next_sequence: 1,
            pool: 0,
            pending: Vec::with_capacity(records_per_sample),
        }
    }

    /// Sequence number the next emitted sample will carry
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn sample_pool(&self) -> u32 {
        self.pool
    }

    /// Add a record, returning a sample once enough records are pending
    pub fn push(&mut self, record: RawPacketFlowRecord) -> Option<FlowSample> {
        self.pool = self.pool.wrapping_add(1);
        self.pending.push(record);

        if self.pending.len() >= self.settings.records_per_sample {
            Some(self.take_sample())
        } else {
            None
        }
    }

    /// Emit whatever records are still pending as a final, shorter sample
    pub fn flush(&mut self) -> Option<FlowSample> {
        if self.pending.is_empty() { None } else { Some(self.take_sample()) }
    }

    fn take_sample(&mut self) -> FlowSample {
        let records = std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.settings.records_per_sample),
        );
        let sample = FlowSample {
            sequence_number: self.next_sequence,
            source_id: self.settings.source_id_index & 0x00ff_ffff,
            sampling_rate: self.settings.sampling_rate,
            sample_pool: self.pool,
            drops: 0,
            input_interface: self.settings.input_interface,
            output_interface: self.settings.output_interface,
            records,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);

        trace!(
            "Assembled sample {} with {} records (pool {})",
            sample.sequence_number,
            sample.records.len(),
            sample.sample_pool
        );
        sample
    }
}
