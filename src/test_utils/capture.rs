//! Synthetic pcap captures
//!
//! Std-only so integration tests can include this file directly and build
//! their captures from the same frames the unit tests and benchmarks use.

use std::time::Duration;

const LINKTYPE_ETHERNET: u32 = 1;

/// Frame lengths of the reference capture, in capture order
pub const REFERENCE_FRAME_LENGTHS: [usize; 58] = [
    44, 44, 76, 76, 104, 156, 76, 76, 68, 180, 68, 556, 68, 76, 76, 92, 104, 76, 76, 68, 216, 68,
    1416, 68, 1416, 68, 1416, 68, 1416, 68, 1416, 68, 1416, 68, 1416, 68, 1416, 68, 1416, 68, 1416,
    68, 68, 1416, 68, 1416, 68, 1416, 68, 1416, 68, 1080, 68, 68, 68, 68, 68, 68,
];

/// Deterministic frame bytes: an Ethernet/IPv4 looking header, then a
/// pattern seeded by the frame index so neighbouring frames differ
pub fn synthetic_frame(index: u64, len: usize) -> Vec<u8> {
    let mut data: Vec<u8> =
        (0..len).map(|i| (index as usize).wrapping_mul(31).wrapping_add(i) as u8).collect();

    const ETHERNET_HEADER: [u8; 14] =
        [0x00, 0x1b, 0x21, 0x3c, 0x4d, 0x5e, 0x00, 0x1b, 0x21, 0x00, 0x00, 0x01, 0x08, 0x00];
    let n = len.min(ETHERNET_HEADER.len());
    data[..n].copy_from_slice(&ETHERNET_HEADER[..n]);
    data
}

/// The 58-frame reference capture as classic pcap bytes
pub fn reference_capture() -> Vec<u8> {
    REFERENCE_FRAME_LENGTHS
        .iter()
        .enumerate()
        .fold(PcapBuilder::ethernet(), |builder, (i, &len)| {
            builder.frame(synthetic_frame(i as u64, len))
        })
        .build()
}

struct BuilderFrame {
    timestamp: Option<Duration>,
    original_len: u32,
    data: Vec<u8>,
}

/// Builds classic libpcap captures in memory
pub struct PcapBuilder {
    big_endian: bool,
    nanosecond: bool,
    snap_len: u32,
    link_type: u32,
    frames: Vec<BuilderFrame>,
}

impl PcapBuilder {
    /// Little-endian, microsecond, Ethernet capture
    pub fn ethernet() -> Self {
        Self {
            big_endian: false,
            nanosecond: false,
            snap_len: 262_144,
            link_type: LINKTYPE_ETHERNET,
            frames: Vec::new(),
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn nanosecond(mut self) -> Self {
        self.nanosecond = true;
        self
    }

    pub fn snap_len(mut self, snap_len: u32) -> Self {
        self.snap_len = snap_len;
        self
    }

    pub fn link_type(mut self, link_type: u32) -> Self {
        self.link_type = link_type;
        self
    }

    /// Append a frame captured in full, stamped one millisecond after the previous
    pub fn frame(mut self, data: Vec<u8>) -> Self {
        let original_len = data.len() as u32;
        self.frames.push(BuilderFrame { timestamp: None, original_len, data });
        self
    }

    /// Append a frame the capture tool cut short of `original_len`
    pub fn truncated_frame(mut self, data: Vec<u8>, original_len: u32) -> Self {
        self.frames.push(BuilderFrame { timestamp: None, original_len, data });
        self
    }

    pub fn frame_at(mut self, timestamp: Duration, data: Vec<u8>) -> Self {
        let original_len = data.len() as u32;
        self.frames.push(BuilderFrame { timestamp: Some(timestamp), original_len, data });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let magic: u32 = if self.nanosecond { 0xa1b2_3c4d } else { 0xa1b2_c3d4 };
        let capacity: usize = 24 + self.frames.iter().map(|f| 16 + f.data.len()).sum::<usize>();
        let mut out = Vec::with_capacity(capacity);

        self.put_u32(&mut out, magic);
        self.put_u16(&mut out, 2);
        self.put_u16(&mut out, 4);
        self.put_u32(&mut out, 0); // thiszone
        self.put_u32(&mut out, 0); // sigfigs
        self.put_u32(&mut out, self.snap_len);
        self.put_u32(&mut out, self.link_type);

        let base = Duration::from_secs(1_600_000_000);
        for (i, frame) in self.frames.iter().enumerate() {
            let ts = frame.timestamp.unwrap_or(base + Duration::from_millis(i as u64));
            let frac = if self.nanosecond { ts.subsec_nanos() } else { ts.subsec_micros() };

            self.put_u32(&mut out, ts.as_secs() as u32);
            self.put_u32(&mut out, frac);
            self.put_u32(&mut out, frame.data.len() as u32);
            self.put_u32(&mut out, frame.original_len);
            out.extend_from_slice(&frame.data);
        }

        out
    }

    fn put_u32(&self, out: &mut Vec<u8>, value: u32) {
        if self.big_endian {
            out.extend_from_slice(&value.to_be_bytes());
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn put_u16(&self, out: &mut Vec<u8>, value: u16) {
        if self.big_endian {
            out.extend_from_slice(&value.to_be_bytes());
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}
