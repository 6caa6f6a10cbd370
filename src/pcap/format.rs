//! libpcap file format structures and parsing
//!
//! Defines the binary structures of the classic libpcap capture format and
//! provides parsing functions for both byte orders.
//!
//! ## File Structure
//!
//! 1. **Global Header** (24 bytes) - magic, version, snap length, link type
//! 2. **Records** - each a 16-byte record header followed by `incl_len` captured bytes
//!
//! The magic number selects byte order and timestamp resolution:
//!
//! | magic (as read) | byte order | timestamp fraction |
//! |-----------------|------------|--------------------|
//! | `a1b2c3d4`      | native     | microseconds       |
//! | `a1b23c4d`      | native     | nanoseconds        |
//! | `d4c3b2a1`      | swapped    | microseconds       |
//! | `4d3cb2a1`      | swapped    | nanoseconds        |

use crate::{ReplayError, Result};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace};

pub const GLOBAL_HEADER_SIZE: usize = 24;
pub const RECORD_HEADER_SIZE: usize = 16;

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;
const MAGIC_PCAPNG: u32 = 0x0a0d_0d0a;

/// Largest record libpcap itself accepts
pub const MAX_RECORD_LEN: u32 = 262_144;

/// Byte order of every multi-byte field in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u32_at(self, data: &[u8], offset: usize) -> u32 {
        let bytes = [data[offset], data[offset + 1], data[offset + 2], data[offset + 3]];
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    fn u16_at(self, data: &[u8], offset: usize) -> u16 {
        let bytes = [data[offset], data[offset + 1]];
        match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }
}

/// Resolution of the fractional timestamp field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampResolution {
    Micro,
    Nano,
}

/// Data link type of the capture (LINKTYPE_* values)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    Ppp,
    RawIp,
    Ieee80211,
    Ipv4,
    Ipv6,
    Other(u32),
}

impl LinkType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => LinkType::Ethernet,
            9 => LinkType::Ppp,
            101 => LinkType::RawIp,
            105 => LinkType::Ieee80211,
            228 => LinkType::Ipv4,
            229 => LinkType::Ipv6,
            other => LinkType::Other(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            LinkType::Ethernet => 1,
            LinkType::Ppp => 9,
            LinkType::RawIp => 101,
            LinkType::Ieee80211 => 105,
            LinkType::Ipv4 => 228,
            LinkType::Ipv6 => 229,
            LinkType::Other(value) => value,
        }
    }
}

/// Capture file global header
#[derive(Debug, Clone)]
pub struct PcapGlobalHeader {
    pub byte_order: ByteOrder,
    pub resolution: TimestampResolution,
    pub version_major: u16,
    pub version_minor: u16,
    pub this_zone: i32,
    pub sig_figs: u32,
    pub snap_len: u32,
    pub link_type: LinkType,
}

impl PcapGlobalHeader {
    pub const HEADER_SIZE: usize = GLOBAL_HEADER_SIZE;

    pub fn parse_from_reader<R: Read>(reader: &mut R, path: &Path) -> Result<Self> {
        let mut data = [0u8; GLOBAL_HEADER_SIZE];
        reader.read_exact(&mut data).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ReplayError::trace_open(
                    path.to_path_buf(),
                    format!("file is shorter than the {} byte capture header", GLOBAL_HEADER_SIZE),
                )
            } else {
                ReplayError::trace_open_io(path.to_path_buf(), e)
            }
        })?;

        Self::parse(&data, path)
    }

    /// Parse the 24-byte global header
    ///
    /// struct pcap_file_header {
    ///   u32 magic;          // offset 0
    ///   u16 version_major;  // offset 4
    ///   u16 version_minor;  // offset 6
    ///   i32 thiszone;       // offset 8
    ///   u32 sigfigs;        // offset 12
    ///   u32 snaplen;        // offset 16
    ///   u32 linktype;       // offset 20
    /// }
    pub fn parse(data: &[u8; GLOBAL_HEADER_SIZE], path: &Path) -> Result<Self> {
        let magic_le = ByteOrder::Little.u32_at(data, 0);
        let (byte_order, resolution) = match magic_le {
            MAGIC_MICROS => (ByteOrder::Little, TimestampResolution::Micro),
            MAGIC_NANOS => (ByteOrder::Little, TimestampResolution::Nano),
            m if m.swap_bytes() == MAGIC_MICROS => (ByteOrder::Big, TimestampResolution::Micro),
            m if m.swap_bytes() == MAGIC_NANOS => (ByteOrder::Big, TimestampResolution::Nano),
            MAGIC_PCAPNG => {
                return Err(ReplayError::trace_open(
                    path.to_path_buf(),
                    "pcapng captures are not supported, convert to libpcap format",
                ));
            }
            other => {
                return Err(ReplayError::trace_open(
                    path.to_path_buf(),
                    format!("unrecognized capture magic {:#010x}", other),
                ));
            }
        };

        let version_major = byte_order.u16_at(data, 4);
        let version_minor = byte_order.u16_at(data, 6);
        let this_zone = byte_order.u32_at(data, 8) as i32;
        let sig_figs = byte_order.u32_at(data, 12);
        let snap_len = byte_order.u32_at(data, 16);
        // Upper 16 bits carry FCS flags on some writers
        let link_type = LinkType::from_u32(byte_order.u32_at(data, 20) & 0x0000_ffff);

        debug!(
            "Parsed capture header: version={}.{}, snaplen={}, linktype={}, order={:?}, resolution={:?}",
            version_major,
            version_minor,
            snap_len,
            link_type.as_u32(),
            byte_order,
            resolution
        );

        let header = Self {
            byte_order,
            resolution,
            version_major,
            version_minor,
            this_zone,
            sig_figs,
            snap_len,
            link_type,
        };
        header.validate(path)?;
        Ok(header)
    }

    pub fn validate(&self, path: &Path) -> Result<()> {
        if self.version_major != 2 {
            return Err(ReplayError::trace_open(
                path.to_path_buf(),
                format!(
                    "unsupported capture version {}.{} (expected 2.x)",
                    self.version_major, self.version_minor
                ),
            ));
        }

        if let LinkType::Other(value) = self.link_type {
            return Err(ReplayError::trace_open(
                path.to_path_buf(),
                format!("unsupported link type {}", value),
            ));
        }

        Ok(())
    }

    /// Parse the record header that follows this global header's conventions
    pub fn parse_record_header(&self, data: &[u8; RECORD_HEADER_SIZE]) -> PcapRecordHeader {
        let header = PcapRecordHeader {
            ts_sec: self.byte_order.u32_at(data, 0),
            ts_frac: self.byte_order.u32_at(data, 4),
            incl_len: self.byte_order.u32_at(data, 8),
            orig_len: self.byte_order.u32_at(data, 12),
        };
        trace!(
            "Record header: ts={}.{}, incl_len={}, orig_len={}",
            header.ts_sec, header.ts_frac, header.incl_len, header.orig_len
        );
        header
    }
}

/// Per-frame record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcapRecordHeader {
    pub ts_sec: u32,
    pub ts_frac: u32,
    pub incl_len: u32,
    pub orig_len: u32,
}

impl PcapRecordHeader {
    /// Check declared lengths are self-consistent
    pub fn validate(&self, frame_index: u64) -> Result<()> {
        if self.incl_len > MAX_RECORD_LEN {
            return Err(ReplayError::trace_corrupt(
                frame_index,
                format!(
                    "captured length {} exceeds the {} byte record limit",
                    self.incl_len, MAX_RECORD_LEN
                ),
            ));
        }

        if self.incl_len > self.orig_len {
            return Err(ReplayError::trace_corrupt(
                frame_index,
                format!(
                    "captured length {} is larger than original length {}",
                    self.incl_len, self.orig_len
                ),
            ));
        }

        Ok(())
    }

    pub fn timestamp(&self, resolution: TimestampResolution) -> Duration {
        let nanos = match resolution {
            TimestampResolution::Micro => u64::from(self.ts_frac) * 1_000,
            TimestampResolution::Nano => u64::from(self.ts_frac),
        };
        Duration::from_secs(u64::from(self.ts_sec)) + Duration::from_nanos(nanos)
    }
}
