//! sFlow datagram header and serialization

use super::sample::FlowSample;
use super::{ADDRESS_TYPE_IPV4, ADDRESS_TYPE_IPV6, SFLOW_VERSION, put_u32};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Address the datagrams claim to come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAddress {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl AgentAddress {
    pub fn address_type(&self) -> u32 {
        match self {
            AgentAddress::V4(_) => ADDRESS_TYPE_IPV4,
            AgentAddress::V6(_) => ADDRESS_TYPE_IPV6,
        }
    }

    /// Size of the datagram header for this address family
    ///
    /// version, address type, address, sub-agent id, sequence, uptime, sample count
    pub fn header_len(&self) -> usize {
        match self {
            AgentAddress::V4(_) => 28,
            AgentAddress::V6(_) => 40,
        }
    }

    pub fn ip(&self) -> IpAddr {
        match *self {
            AgentAddress::V4(addr) => IpAddr::V4(addr),
            AgentAddress::V6(addr) => IpAddr::V6(addr),
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        put_u32(buf, self.address_type());
        match self {
            AgentAddress::V4(addr) => buf.extend_from_slice(&addr.octets()),
            AgentAddress::V6(addr) => buf.extend_from_slice(&addr.octets()),
        }
    }
}

impl Default for AgentAddress {
    fn default() -> Self {
        AgentAddress::V4(Ipv4Addr::UNSPECIFIED)
    }
}

impl From<IpAddr> for AgentAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => AgentAddress::V4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => AgentAddress::V4(v4),
                None => AgentAddress::V6(v6),
            },
        }
    }
}

/// One finalized sFlow v5 datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SflowDatagram {
    pub agent_address: AgentAddress,
    pub sub_agent_id: u32,
    pub sequence_number: u32,
    /// Milliseconds since the replay session started
    pub uptime_ms: u32,
    pub samples: Vec<FlowSample>,
}

impl SflowDatagram {
    pub fn encoded_len(&self) -> usize {
        self.agent_address.header_len()
            + self.samples.iter().map(|s| s.encoded_len()).sum::<usize>()
    }

    /// Number of raw-packet records across all samples
    pub fn record_count(&self) -> usize {
        self.samples.iter().map(|s| s.records.len()).sum()
    }

    /// Serialize to the wire representation
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        put_u32(buf, SFLOW_VERSION);
        self.agent_address.encode_into(buf);
        put_u32(buf, self.sub_agent_id);
        put_u32(buf, self.sequence_number);
        put_u32(buf, self.uptime_ms);
        put_u32(buf, self.samples.len() as u32);
        for sample in &self.samples {
            sample.encode_into(buf);
        }
    }
}
