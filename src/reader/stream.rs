//! Single-signal reader.

use super::channel::{Channel, EventMode, Step};
use super::{ReadResult, ReadStatus, ReaderState};
use crate::config::{ReadTimeoutMode, ReaderSettings};
use crate::connection::WaitOutcome;
use crate::descriptor::DataDescriptor;
use crate::error::Result;
use crate::input_port::InputPort;
use crate::packet::EventPacket;
use crate::signal::{Signal, SignalRegistry};
use crate::types::SampleBlock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_READER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn reader_port_id(signal: &Signal) -> String {
    format!("{}/reader{}", signal.id(), NEXT_READER.fetch_add(1, Ordering::Relaxed))
}

/// Reads one signal as a flat sequence of typed samples
///
/// The reader owns an input port connected to the signal. Descriptor changes
/// arrive in-band; with `skip_events` set, compatible changes are consumed
/// silently and only changes that alter the sample layout stop a read.
///
/// ```ignore
/// let mut reader = StreamReader::new(&signal, ReaderSettings::new().value_type(SampleType::Float64))?;
/// let result = reader.read(100);
/// let values = result.values.as_slice::<f64>().unwrap_or_default();
/// ```
pub struct StreamReader {
    channel: Channel,
    settings: ReaderSettings,
}

impl StreamReader {
    pub fn new(signal: &Signal, settings: ReaderSettings) -> Result<Self> {
        let channel = Channel::connect(signal, reader_port_id(signal), &settings)?;
        tracing::debug!(
            signal = %signal.id(),
            value_type = %settings.value_type,
            skip_events = settings.skip_events,
            "Stream reader created"
        );
        Ok(Self { channel, settings })
    }

    /// Resolve `id` through `registry` and connect to it
    pub fn from_registry(registry: &SignalRegistry, id: &str, settings: ReaderSettings) -> Result<Self> {
        let signal = registry.get(id)?;
        Self::new(&signal, settings)
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn state(&self) -> ReaderState {
        self.channel.state()
    }

    pub fn port(&self) -> &InputPort {
        self.channel.port()
    }

    pub fn value_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.channel.value_descriptor().cloned()
    }

    pub fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.channel.domain_descriptor().cloned()
    }

    /// Samples discarded by the connection's overflow policy
    pub fn dropped_samples(&self) -> u64 {
        self.channel.dropped_samples()
    }

    /// Events consumed without stopping a read
    pub fn skipped_events(&self) -> u64 {
        self.channel.skipped_events()
    }

    /// Samples readable now without crossing a halting event
    pub fn available_count(&self) -> usize {
        self.channel.available(EventMode::Inline).samples
    }

    pub fn disconnect(&mut self) {
        self.channel.disconnect();
    }

    /// Read up to `n` samples with the configured timeout
    pub fn read(&mut self, n: usize) -> ReadResult {
        self.read_impl(n, false, self.settings.timeout_ms)
    }

    pub fn read_timeout(&mut self, n: usize, timeout_ms: u64) -> ReadResult {
        self.read_impl(n, false, timeout_ms)
    }

    /// Read values together with their domain values
    pub fn read_with_domain(&mut self, n: usize) -> ReadResult {
        self.read_impl(n, true, self.settings.timeout_ms)
    }

    pub fn read_with_domain_timeout(&mut self, n: usize, timeout_ms: u64) -> ReadResult {
        self.read_impl(n, true, timeout_ms)
    }

    fn finish(
        &self,
        values: Option<SampleBlock>,
        domain: Option<SampleBlock>,
        with_domain: bool,
        sample_count: usize,
        status: ReadStatus,
        event: Option<Arc<EventPacket>>,
    ) -> ReadResult {
        ReadResult {
            values: values.unwrap_or_else(|| self.channel.value_block(0)),
            domain: with_domain.then(|| domain.unwrap_or_else(|| self.channel.domain_block(0))),
            sample_count,
            status,
            event,
        }
    }

    fn read_impl(&mut self, n: usize, with_domain: bool, timeout_ms: u64) -> ReadResult {
        let mut values: Option<SampleBlock> = None;
        let mut domain: Option<SampleBlock> = None;

        let Some(conn) = self.channel.connection().cloned() else {
            return self.finish(None, None, with_domain, 0, ReadStatus::InvalidData, None);
        };
        if n == 0 {
            return self.finish(None, None, with_domain, 0, ReadStatus::Ok, None);
        }

        let deadline =
            (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));

        if let (Some(deadline), ReadTimeoutMode::All) = (deadline, self.settings.timeout_mode) {
            let channel = &self.channel;
            let buffered = channel.remaining();
            let outcome = conn.wait_for(Some(deadline), |queue| {
                let avail = channel.count_queued(queue.iter(), EventMode::Inline);
                buffered + avail.samples >= n || avail.boundary
            });
            match outcome {
                WaitOutcome::Ready => {}
                WaitOutcome::TimedOut => {
                    return self.finish(None, None, with_domain, 0, ReadStatus::Timeout, None)
                }
                WaitOutcome::Closed => {
                    return self.finish(None, None, with_domain, 0, ReadStatus::InvalidData, None)
                }
            }
        }

        let mut produced = 0;
        loop {
            let (count, step) = self.channel.fill(
                n - produced,
                Some(&mut values),
                with_domain.then_some(&mut domain),
                EventMode::Inline,
            );
            produced += count;

            let (status, event) = match step {
                Step::Filled | Step::AtEvent => (ReadStatus::Ok, None),
                Step::Event(event) => (ReadStatus::Event, Some(event)),
                Step::Unknown(reason) => {
                    tracing::debug!(port = %self.channel.port().id(), "Unknown descriptor: {}", reason);
                    (ReadStatus::UnknownDescriptor, None)
                }
                Step::Invalid(reason) => {
                    tracing::warn!(port = %self.channel.port().id(), "Invalid data: {}", reason);
                    (ReadStatus::InvalidData, None)
                }
                Step::Closed => (closed_status(produced), None),
                Step::Empty => match deadline {
                    None => (ReadStatus::Ok, None),
                    Some(deadline) => match conn.wait_for_packets(Some(deadline)) {
                        WaitOutcome::Ready => continue,
                        WaitOutcome::TimedOut => (ReadStatus::Timeout, None),
                        WaitOutcome::Closed => (closed_status(produced), None),
                    },
                },
            };
            return self.finish(values, domain, with_domain, produced, status, event);
        }
    }
}

/// Samples read before the connection closed are handed out normally; the
/// next read finds the closed connection and returns `InvalidData` empty.
fn closed_status(produced: usize) -> ReadStatus {
    if produced > 0 {
        ReadStatus::Ok
    } else {
        ReadStatus::InvalidData
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("port", self.channel.port())
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish()
    }
}
