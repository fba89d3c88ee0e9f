//! Readers: consumers that turn packet streams into typed sample blocks.
//!
//! - [`StreamReader`] reads one signal as a flat sequence of samples
//! - [`MultiReader`] reads several signals aligned on a common time axis
//! - [`TimeReader`] wraps either and converts domain ticks to timestamps
//!
//! Construction errors are returned as `Err`; everything that happens while
//! streaming is reported through [`ReadStatus`] on the read result.

mod channel;
mod convert;
mod multi;
mod stream;
mod time;

pub use multi::{MultiReadResult, MultiReader};
pub use stream::StreamReader;
pub use time::{DomainClock, MultiTimedReadResult, TimeReader, TimedReadResult};

use crate::packet::EventPacket;
use crate::types::SampleBlock;
use std::sync::Arc;

/// Outcome of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Ok,
    /// Stopped at an event; the event is on the result
    Event,
    Timeout,
    /// The current descriptor cannot be converted to the requested type
    UnknownDescriptor,
    InvalidData,
}

/// Reader lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Connected, no descriptor seen yet
    NeedsDescriptor,
    Streaming,
    /// The current descriptor is not convertible
    Invalid,
    Disconnected,
}

/// Values read from one signal
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub values: SampleBlock,
    /// Present for `read_with_domain*`
    pub domain: Option<SampleBlock>,
    /// Samples read; differs from `values.len()` for multi-dimensional data
    pub sample_count: usize,
    pub status: ReadStatus,
    pub event: Option<Arc<EventPacket>>,
}

impl ReadResult {
    /// Number of samples read
    pub fn len(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReadStatus::Ok
    }
}
