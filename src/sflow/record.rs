//! Raw-packet flow records

use super::{
    RAW_PACKET_FIXED_SIZE, RECORD_FORMAT_RAW_PACKET, TLV_HEADER_SIZE, padded_len, put_u32,
};
use crate::pcap::LinkType;
use crate::{CapturedFrame, ReplayError, Result};
use std::sync::Arc;
use tracing::trace;

/// sFlow `header_protocol` values for the link types a capture can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProtocol {
    Ethernet = 1,
    Ppp = 7,
    Ipv4 = 11,
    Ipv6 = 12,
    Ieee80211 = 15,
}

impl HeaderProtocol {
    /// Pick the header protocol for a frame of the given link type
    ///
    /// Raw IP captures carry no link header, so the IP version nibble of the
    /// frame decides between IPv4 and IPv6.
    pub fn for_frame(link_type: LinkType, payload: &[u8]) -> Option<Self> {
        match link_type {
            LinkType::Ethernet => Some(HeaderProtocol::Ethernet),
            LinkType::Ppp => Some(HeaderProtocol::Ppp),
            LinkType::Ieee80211 => Some(HeaderProtocol::Ieee80211),
            LinkType::Ipv4 => Some(HeaderProtocol::Ipv4),
            LinkType::Ipv6 => Some(HeaderProtocol::Ipv6),
            LinkType::RawIp => match payload.first().map(|b| b >> 4) {
                Some(6) => Some(HeaderProtocol::Ipv6),
                _ => Some(HeaderProtocol::Ipv4),
            },
            LinkType::Other(_) => None,
        }
    }

    /// Whether frames of this link type can be described to a collector
    pub fn supports(link_type: LinkType) -> bool {
        !matches!(link_type, LinkType::Other(_))
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// One captured frame as an sFlow raw-packet flow record
///
/// Invariant: `header_len() <= frame_length` and, when a capture length limit
/// is configured, `header_len() <= limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacketFlowRecord {
    pub protocol: HeaderProtocol,

    /// Length of the frame on the wire
    pub frame_length: u32,

    /// Octets removed before the header was taken (always 0 for replayed frames)
    pub stripped: u32,

    payload: Arc<[u8]>,
    header_len: usize,
}

impl RawPacketFlowRecord {
    /// Captured header bytes carried by this record
    pub fn header(&self) -> &[u8] {
        &self.payload[..self.header_len]
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Serialized size including the format and length words
    pub fn encoded_len(&self) -> usize {
        TLV_HEADER_SIZE + self.body_len()
    }

    fn body_len(&self) -> usize {
        RAW_PACKET_FIXED_SIZE + padded_len(self.header_len)
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        put_u32(buf, RECORD_FORMAT_RAW_PACKET);
        put_u32(buf, self.body_len() as u32);
        put_u32(buf, self.protocol.as_u32());
        put_u32(buf, self.frame_length);
        put_u32(buf, self.stripped);
        put_u32(buf, self.header_len as u32);
        buf.extend_from_slice(self.header());
        let padding = padded_len(self.header_len) - self.header_len;
        buf.extend_from_slice(&[0u8; 3][..padding]);
    }
}

/// Turns captured frames into raw-packet flow records
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    link_type: LinkType,
    capture_length_limit: Option<u32>,
}

impl RecordBuilder {
    pub fn new(link_type: LinkType, capture_length_limit: Option<u32>) -> Self {
        Self { link_type, capture_length_limit }
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn set_link_type(&mut self, link_type: LinkType) {
        self.link_type = link_type;
    }

    /// Wrap one frame
    ///
    /// The header is cut to `min(captured, original, limit)` bytes; without a
    /// configured limit the captured bytes pass through untouched. The record
    /// shares the frame's buffer rather than copying it. Frames of a link type
    /// with no sFlow header protocol are rejected.
    pub fn build(&self, frame: &CapturedFrame) -> Result<RawPacketFlowRecord> {
        let protocol = HeaderProtocol::for_frame(self.link_type, &frame.data).ok_or_else(|| {
            ReplayError::trace_corrupt(
                frame.index,
                format!("no sFlow header protocol for link type {}", self.link_type.as_u32()),
            )
        })?;

        let mut header_len = frame.captured_len().min(frame.original_len as usize);
        if let Some(limit) = self.capture_length_limit {
            header_len = header_len.min(limit as usize);
        }

        trace!(
            "Record for frame {}: header {} of {} bytes",
            frame.index, header_len, frame.original_len
        );

        Ok(RawPacketFlowRecord {
            protocol,
            frame_length: frame.original_len,
            stripped: 0,
            payload: Arc::clone(&frame.data),
            header_len,
        })
    }
}
