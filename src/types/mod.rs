//! Core data types shared across the replay pipeline.
//!
//! - [`CapturedFrame`] is one frame read from the trace, with zero-copy payload
//! - [`Pacing`] controls how fast frames are replayed

mod frame;
mod pacing;

pub use frame::CapturedFrame;
pub use pacing::{MAX_SCALED_OFFSET, MIN_SPEED, Pacing};
