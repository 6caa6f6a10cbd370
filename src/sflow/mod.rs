//! sFlow version 5 encoding
//!
//! Builds the structures a replay run emits and serializes them to the
//! big-endian XDR layout of the sFlow v5 datagram:
//!
//! ```text
//! datagram   := version agent_type agent_address sub_agent_id sequence uptime n_samples sample*
//! sample     := format(=1) length sequence source_id rate pool drops input output n_records record*
//! record     := format(=1) length protocol frame_length stripped header_length header[pad4]
//! ```
//!
//! - [`record`] wraps one captured frame into a raw-packet flow record
//! - [`sample`] groups records into flow samples and owns the sample counters
//! - [`datagram`] holds the datagram header fields and the serializer
//! - [`batcher`] packs samples into datagrams under a size ceiling

pub mod batcher;
pub mod datagram;
pub mod record;
pub mod sample;

pub use batcher::{BatchOutcome, DatagramBatcher, OversizePolicy, OversizeSample};
pub use datagram::{AgentAddress, SflowDatagram};
pub use record::{HeaderProtocol, RawPacketFlowRecord, RecordBuilder};
pub use sample::{FlowSample, SampleAssembler, SampleSettings};

pub const SFLOW_VERSION: u32 = 5;

/// Agent address type values
pub const ADDRESS_TYPE_IPV4: u32 = 1;
pub const ADDRESS_TYPE_IPV6: u32 = 2;

/// Standard (enterprise 0) sample format: flow sample
pub const SAMPLE_FORMAT_FLOW: u32 = 1;
/// Standard (enterprise 0) flow record format: raw packet header
pub const RECORD_FORMAT_RAW_PACKET: u32 = 1;

/// Format word and length word preceding every sample and record
pub const TLV_HEADER_SIZE: usize = 8;
/// Fixed flow sample body: sequence, source id, rate, pool, drops, input, output, record count
pub const FLOW_SAMPLE_FIXED_SIZE: usize = 32;
/// Fixed raw-packet record body: protocol, frame length, stripped, header length
pub const RAW_PACKET_FIXED_SIZE: usize = 16;

/// XDR opaque data is padded to a 4-byte boundary
pub(crate) fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}
