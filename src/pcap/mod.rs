//! Classic libpcap capture reading
//!
//! This module parses the libpcap file format (global header followed by
//! per-frame records) and exposes the frames as a lazy, ordered sequence.

pub mod format;
pub mod reader;

pub use format::{ByteOrder, LinkType, PcapGlobalHeader, PcapRecordHeader, TimestampResolution};
pub use reader::PcapReader;
