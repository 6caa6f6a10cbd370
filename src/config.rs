//! Replay configuration
//!
//! Every knob of a replay run lives in [`ReplayConfig`]. It deserializes from
//! YAML with every field optional:
//!
//! ```yaml
//! max_datagram_size: 1400
//! capture_length_limit: 128
//! sub_agent_id: 2
//! pacing: !packets_per_second 1000
//! send_error_policy: skip
//! ```

use crate::sflow::{OversizePolicy, SampleSettings};
use crate::types::{MIN_SPEED, Pacing};
use crate::{ReplayError, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

/// Default soft ceiling on a serialized datagram
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 16384;

/// Smallest ceiling that still fits an IPv6 header and one empty raw-packet sample
pub const MIN_DATAGRAM_SIZE: usize = 40 + 40 + 24;

/// Largest UDP payload over IPv6 without jumbograms
pub const MAX_DATAGRAM_SIZE: usize = 65_527;

/// What to do when a datagram cannot be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendErrorPolicy {
    /// End the run with the send error
    #[default]
    Abort,
    /// Log the failure, count it, and keep replaying
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayConfig {
    /// Soft ceiling for batching samples into one datagram
    pub max_datagram_size: usize,

    /// Keep at most this many bytes of each frame; `None` keeps whole frames
    pub capture_length_limit: Option<u32>,

    /// Declared 1-in-N sampling rate
    pub sampling_rate: u32,

    /// ifIndex placed in the sample source id
    pub source_id_index: u32,

    pub input_interface: u32,

    pub output_interface: u32,

    /// Agent address in the datagram header; defaults to the sending socket's address
    pub agent_address: Option<IpAddr>,

    pub sub_agent_id: u32,

    /// Sequence number of the first datagram
    pub initial_datagram_sequence: u32,

    /// Frames packed into each flow sample
    pub records_per_sample: usize,

    /// Optional cap on samples per datagram on top of the byte ceiling
    pub max_samples_per_datagram: Option<usize>,

    pub oversize_policy: OversizePolicy,

    pub send_error_policy: SendErrorPolicy,

    pub pacing: Pacing,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            capture_length_limit: None,
            sampling_rate: 1,
            source_id_index: 0,
            input_interface: 0,
            output_interface: 0,
            agent_address: None,
            sub_agent_id: 0,
            initial_datagram_sequence: 1,
            records_per_sample: 1,
            max_samples_per_datagram: None,
            oversize_policy: OversizePolicy::EmitAlone,
            send_error_policy: SendErrorPolicy::Abort,
            pacing: Pacing::Unpaced,
        }
    }
}

impl ReplayConfig {
    /// Load and validate a YAML configuration file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReplayError::config("config file", format!("cannot read {}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(text)
            .map_err(|e| ReplayError::config("config file", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_DATAGRAM_SIZE..=MAX_DATAGRAM_SIZE).contains(&self.max_datagram_size) {
            return Err(ReplayError::config(
                "max_datagram_size",
                format!(
                    "{} is outside {}..={}",
                    self.max_datagram_size, MIN_DATAGRAM_SIZE, MAX_DATAGRAM_SIZE
                ),
            ));
        }

        if self.capture_length_limit == Some(0) {
            return Err(ReplayError::config(
                "capture_length_limit",
                "must be at least 1 byte; omit it to keep whole frames",
            ));
        }

        if self.sampling_rate == 0 {
            return Err(ReplayError::config("sampling_rate", "must be at least 1"));
        }

        if self.source_id_index > 0x00ff_ffff {
            return Err(ReplayError::config("source_id_index", "must fit in 24 bits"));
        }

        if self.records_per_sample == 0 {
            return Err(ReplayError::config("records_per_sample", "must be at least 1"));
        }

        if self.max_samples_per_datagram == Some(0) {
            return Err(ReplayError::config("max_samples_per_datagram", "must be at least 1"));
        }

        if let Pacing::CaptureTimestamps { speed } = self.pacing {
            if !(speed.is_finite() && speed >= MIN_SPEED) {
                return Err(ReplayError::config(
                    "pacing",
                    format!("speed must be a finite number of at least {}", MIN_SPEED),
                ));
            }
        }

        Ok(())
    }

    pub(crate) fn sample_settings(&self) -> SampleSettings {
        SampleSettings {
            sampling_rate: self.sampling_rate,
            source_id_index: self.source_id_index,
            input_interface: self.input_interface,
            output_interface: self.output_interface,
            records_per_sample: self.records_per_sample,
        }
    }
}
