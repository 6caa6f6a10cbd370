//! Lazy capture reader
//!
//! Yields [`CapturedFrame`]s in capture order without loading the whole file.
//! The sequence is finite and not restartable: once the end is reached or a
//! record turns out to be malformed, the reader stays exhausted and a fresh
//! pass requires reopening the file.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use pcap2sflow::pcap::PcapReader;
//!
//! fn count_frames() -> pcap2sflow::Result<()> {
//!     let mut reader = PcapReader::open("trace.pcap")?;
//!
//!     while let Some(frame) = reader.read_next_frame()? {
//!         println!("frame {}: {} of {} bytes", frame.index, frame.captured_len(), frame.original_len);
//!     }
//!
//!     Ok(())
//! }
//! ```

use super::format::{LinkType, PcapGlobalHeader, RECORD_HEADER_SIZE};
use crate::{CapturedFrame, ReplayError, Result};
use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Sequential reader over a libpcap capture
pub struct PcapReader<R> {
    reader: R,
    path: PathBuf,
    header: PcapGlobalHeader,
    next_index: u64,
    exhausted: bool,
}

impl PcapReader<BufReader<File>> {
    /// Open a capture file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| ReplayError::trace_open_io(path.to_path_buf(), e))?;

        Self::new(BufReader::new(file), path.to_path_buf())
    }
}

impl PcapReader<Cursor<Vec<u8>>> {
    /// Create a reader over an in-memory capture (for testing)
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::new(Cursor::new(data), PathBuf::from("<memory>"))
    }
}

impl<R: Read> PcapReader<R> {
    /// Wrap any byte source, parsing the global header immediately
    pub fn new(mut reader: R, path: PathBuf) -> Result<Self> {
        let header = PcapGlobalHeader::parse_from_reader(&mut reader, &path)?;
        debug!("Opened capture {} (link type {})", path.display(), header.link_type.as_u32());

        Ok(Self { reader, path, header, next_index: 0, exhausted: false })
    }

    pub fn header(&self) -> &PcapGlobalHeader {
        &self.header
    }

    pub fn link_type(&self) -> LinkType {
        self.header.link_type
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Number of frames handed out so far
    pub fn frames_read(&self) -> u64 {
        self.next_index
    }

    /// Read the next frame
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - next frame in capture order
    /// - `Ok(None)` - clean end of capture
    /// - `Err(TraceCorrupt)` - a record's declared length disagrees with the file
    pub fn read_next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        if self.exhausted {
            return Ok(None);
        }

        match self.read_record() {
            Ok(frame) => {
                if frame.is_none() {
                    debug!("Reached end of capture after {} frames", self.next_index);
                    self.exhausted = true;
                }
                Ok(frame)
            }
            Err(e) => {
                self.exhausted = true;
                Err(e)
            }
        }
    }

    fn read_record(&mut self) -> Result<Option<CapturedFrame>> {
        let index = self.next_index;

        let mut record_bytes = [0u8; RECORD_HEADER_SIZE];
        let filled = read_full(&mut self.reader, &mut record_bytes)
            .map_err(|e| ReplayError::trace_corrupt(index, format!("read failed: {}", e)))?;
        match filled {
            0 => return Ok(None),
            RECORD_HEADER_SIZE => {}
            partial => {
                return Err(ReplayError::trace_corrupt(
                    index,
                    format!(
                        "record header truncated ({} of {} bytes)",
                        partial, RECORD_HEADER_SIZE
                    ),
                ));
            }
        }

        let record = self.header.parse_record_header(&record_bytes);
        record.validate(index)?;

        let mut data = vec![0u8; record.incl_len as usize];
        self.reader.read_exact(&mut data).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                ReplayError::trace_corrupt(
                    index,
                    format!("record declares {} bytes but the file ends first", record.incl_len),
                )
            } else {
                ReplayError::trace_corrupt(index, format!("read failed: {}", e))
            }
        })?;

        trace!("Frame {}: {} of {} bytes", index, record.incl_len, record.orig_len);

        self.next_index += 1;
        Ok(Some(CapturedFrame::new(
            index,
            record.orig_len,
            data,
            record.timestamp(self.header.resolution),
        )))
    }
}

impl<R: Read> Iterator for PcapReader<R> {
    type Item = Result<CapturedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next_frame().transpose()
    }
}

/// Fill `buf` as far as the source allows, returning the byte count
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
