//! Frame source implementations

pub mod pcap;

pub use pcap::PcapSource;
