//! Shared fixtures for integration tests

#![allow(dead_code)]

#[path = "../../src/test_utils/capture.rs"]
mod capture;

pub use capture::{PcapBuilder, REFERENCE_FRAME_LENGTHS, synthetic_frame};

use sflow_parser::models::{FlowData, FlowSample, SFlowDatagram, SampleData, SampledHeader};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// How long the listener waits for the next datagram before giving up
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(3);

pub fn frame(index: usize, len: usize) -> Vec<u8> {
    synthetic_frame(index as u64, len)
}

pub fn reference_frames() -> Vec<Vec<u8>> {
    REFERENCE_FRAME_LENGTHS.iter().enumerate().map(|(i, &len)| frame(i, len)).collect()
}

/// Little-endian microsecond Ethernet capture of the given frames
pub fn capture_bytes(frames: &[Vec<u8>]) -> Vec<u8> {
    frames.iter().cloned().fold(PcapBuilder::ethernet(), PcapBuilder::frame).build()
}

pub fn write_capture(frames: &[Vec<u8>]) -> NamedTempFile {
    write_bytes(&capture_bytes(frames))
}

pub fn write_bytes(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp capture");
    file.write_all(bytes).expect("write temp capture");
    file.flush().expect("flush temp capture");
    file
}

/// Parse one received payload the way a collector would
pub fn parse(payload: &[u8]) -> SFlowDatagram {
    sflow_parser::parse_datagram(payload).expect("collector parses datagram")
}

pub fn flow_samples(datagram: &SFlowDatagram) -> impl Iterator<Item = &FlowSample> {
    datagram.samples.iter().filter_map(|record| match &record.sample_data {
        SampleData::FlowSample(sample) => Some(sample),
        _ => None,
    })
}

pub fn sampled_headers(datagram: &SFlowDatagram) -> impl Iterator<Item = &SampledHeader> {
    flow_samples(datagram).flat_map(|sample| sample.flow_records.iter()).filter_map(|record| {
        match &record.flow_data {
            FlowData::SampledHeader(header) => Some(header),
            _ => None,
        }
    })
}

/// Collector stand-in: parses datagrams until `expected_records` sampled
/// headers arrived or nothing arrives for `timeout`
pub struct Listener {
    pub target: String,
    handle: JoinHandle<Vec<SFlowDatagram>>,
}

impl Listener {
    pub async fn start(expected_records: Option<usize>, timeout: Duration) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind listener");
        let target = socket.local_addr().expect("listener address").to_string();

        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 65_536];
            let mut datagrams = Vec::new();
            let mut records = 0;

            while expected_records.is_none_or(|n| records < n) {
                match tokio::time::timeout(timeout, socket.recv_from(&mut buf)).await {
                    Ok(Ok((n, _))) => {
                        let datagram = parse(&buf[..n]);
                        records += sampled_headers(&datagram).count();
                        datagrams.push(datagram);
                    }
                    Ok(Err(e)) => panic!("listener receive failed: {}", e),
                    Err(_) => break,
                }
            }
            datagrams
        });

        Self { target, handle }
    }

    pub async fn finish(self) -> Vec<SFlowDatagram> {
        self.handle.await.expect("listener task")
    }
}

pub fn header_lengths(datagrams: &[SFlowDatagram]) -> Vec<usize> {
    datagrams.iter().flat_map(sampled_headers).map(|h| h.header.len()).collect()
}

pub fn sample_sequences(datagrams: &[SFlowDatagram]) -> Vec<u32> {
    datagrams.iter().flat_map(flow_samples).map(|s| s.sequence_number).collect()
}

pub fn datagram_sequences(datagrams: &[SFlowDatagram]) -> Vec<u32> {
    datagrams.iter().map(|d| d.sequence_number).collect()
}
