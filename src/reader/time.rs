//! Absolute-time adapter over the stream and multi readers.

use super::{MultiReader, ReadStatus, StreamReader};
use crate::config::ReaderSettings;
use crate::descriptor::DataDescriptor;
use crate::error::{DataPathError, Result};
use crate::packet::EventPacket;
use crate::signal::Signal;
use crate::types::{Ratio, SampleBlock, Scalar};
use chrono::{DateTime, Utc};
use std::sync::Arc;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Maps domain ticks to wall-clock time: `origin + ticks * tick`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainClock {
    origin: DateTime<Utc>,
    tick: Ratio,
}

impl DomainClock {
    pub fn new(origin: DateTime<Utc>, tick: Ratio) -> Self {
        Self { origin, tick }
    }

    /// Clock of a domain descriptor; `NoAbsoluteTime` without origin or tick
    pub fn from_descriptor(descriptor: &DataDescriptor) -> Result<Self> {
        match (descriptor.parsed_origin(), descriptor.tick_resolution()) {
            (Some(origin), Some(tick)) => Ok(Self::new(origin, tick)),
            _ => Err(DataPathError::NoAbsoluteTime),
        }
    }

    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }

    pub fn tick(&self) -> Ratio {
        self.tick
    }

    /// Offset of `ticks` from the origin in nanoseconds, rounded down
    pub fn to_nanos(&self, ticks: i64) -> i128 {
        (ticks as i128 * self.tick.num() as i128 * NANOS_PER_SECOND)
            .div_euclid(self.tick.den() as i128)
    }

    fn scalar_nanos(&self, ticks: Scalar) -> i128 {
        match ticks {
            Scalar::Int(v) => self.to_nanos(v),
            Scalar::UInt(v) => (v as i128 * self.tick.num() as i128 * NANOS_PER_SECOND)
                .div_euclid(self.tick.den() as i128),
            Scalar::Float(v) => {
                (v * self.tick.as_f64() * NANOS_PER_SECOND as f64).floor() as i128
            }
        }
    }

    /// Timestamp of domain value `ticks`; `None` outside chrono's range
    pub fn to_time(&self, ticks: impl Into<Scalar>) -> Option<DateTime<Utc>> {
        let origin = self.origin.timestamp() as i128 * NANOS_PER_SECOND
            + self.origin.timestamp_subsec_nanos() as i128;
        let total = origin + self.scalar_nanos(ticks.into());
        let secs = i64::try_from(total.div_euclid(NANOS_PER_SECOND)).ok()?;
        DateTime::from_timestamp(secs, total.rem_euclid(NANOS_PER_SECOND) as u32)
    }

    fn stamp(&self, domain: &SampleBlock) -> Result<Vec<DateTime<Utc>>> {
        (0..domain.len())
            .map(|i| {
                domain
                    .scalar_at(i)
                    .and_then(|v| self.to_time(v))
                    .ok_or_else(|| {
                        DataPathError::InvalidData(format!("domain value {} has no timestamp", i))
                    })
            })
            .collect()
    }
}

fn clock_of(descriptor: Option<Arc<DataDescriptor>>) -> Option<DomainClock> {
    descriptor.and_then(|d| DomainClock::from_descriptor(&d).ok())
}

/// Samples are stamped with the clock in effect when they were read; a
/// halting event may have replaced it by the time the read returns.
fn effective(before: Option<DomainClock>, after: Option<DomainClock>, halted: bool) -> Option<DomainClock> {
    if halted {
        before.or(after)
    } else {
        after.or(before)
    }
}

/// Values of one signal with absolute timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct TimedReadResult {
    pub values: SampleBlock,
    pub timestamps: Vec<DateTime<Utc>>,
    pub sample_count: usize,
    pub status: ReadStatus,
    pub event: Option<Arc<EventPacket>>,
}

/// Aligned values of several signals with per-signal timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTimedReadResult {
    pub values: Vec<SampleBlock>,
    pub timestamps: Vec<Vec<DateTime<Utc>>>,
    pub frames: usize,
    pub status: ReadStatus,
    pub event: Option<(usize, Arc<EventPacket>)>,
}

/// Wraps a reader and returns `DateTime<Utc>` instead of raw domain ticks
#[derive(Debug)]
pub struct TimeReader<R> {
    reader: R,
}

impl<R> TimeReader<R> {
    pub fn inner(&self) -> &R {
        &self.reader
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl TimeReader<StreamReader> {
    pub fn new(reader: StreamReader) -> Self {
        Self { reader }
    }

    /// Connect a stream reader, failing early if the current domain has no
    /// absolute time reference
    pub fn for_signal(signal: &Signal, settings: ReaderSettings) -> Result<Self> {
        let domain = signal
            .domain_descriptor()
            .ok_or(DataPathError::NoAbsoluteTime)?;
        DomainClock::from_descriptor(&domain)?;
        Ok(Self::new(StreamReader::new(signal, settings)?))
    }

    pub fn clock(&self) -> Option<DomainClock> {
        clock_of(self.reader.domain_descriptor())
    }

    pub fn read(&mut self, n: usize) -> Result<TimedReadResult> {
        let timeout_ms = self.reader.settings().timeout_ms;
        self.read_timeout(n, timeout_ms)
    }

    pub fn read_timeout(&mut self, n: usize, timeout_ms: u64) -> Result<TimedReadResult> {
        let before = self.clock();
        let result = self.reader.read_with_domain_timeout(n, timeout_ms);
        let clock = effective(before, self.clock(), result.event.is_some());

        let timestamps = match &result.domain {
            Some(domain) if !domain.is_empty() => clock
                .ok_or(DataPathError::NoAbsoluteTime)?
                .stamp(domain)?,
            _ => Vec::new(),
        };
        Ok(TimedReadResult {
            values: result.values,
            timestamps,
            sample_count: result.sample_count,
            status: result.status,
            event: result.event,
        })
    }
}

impl TimeReader<MultiReader> {
    /// Multi readers already require an absolute domain on every signal
    pub fn new(reader: MultiReader) -> Self {
        Self { reader }
    }

    fn clocks(&self) -> Vec<Option<DomainClock>> {
        (0..self.reader.signal_count())
            .map(|i| clock_of(self.reader.domain_descriptor(i)))
            .collect()
    }

    pub fn read(&mut self, n: usize) -> Result<MultiTimedReadResult> {
        let timeout_ms = self.reader.settings().timeout_ms;
        self.read_timeout(n, timeout_ms)
    }

    pub fn read_timeout(&mut self, n: usize, timeout_ms: u64) -> Result<MultiTimedReadResult> {
        let before = self.clocks();
        let result = self.reader.read_timeout(n, timeout_ms);
        let after = self.clocks();
        let halted_on = result.event.as_ref().map(|(i, _)| *i);

        let timestamps = result
            .domain
            .iter()
            .enumerate()
            .map(|(i, domain)| {
                if domain.is_empty() {
                    return Ok(Vec::new());
                }
                effective(before[i], after[i], halted_on == Some(i))
                    .ok_or(DataPathError::NoAbsoluteTime)?
                    .stamp(domain)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MultiTimedReadResult {
            values: result.values,
            timestamps,
            frames: result.frames,
            status: result.status,
            event: result.event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MultiReaderSettings;
    use crate::descriptor::{DataRule, UNIX_EPOCH_ORIGIN};
    use crate::packet::DataPacket;
    use crate::types::SampleType;
    use chrono::TimeZone;

    fn domain(origin: &str) -> Arc<DataDescriptor> {
        DataDescriptor::builder()
            .sample_type(SampleType::Int64)
            .rule(DataRule::Linear {
                delta: Scalar::Int(1),
                start: Scalar::Int(0),
            })
            .tick_resolution(Ratio::per(1000).unwrap())
            .origin(origin)
            .build_shared()
            .unwrap()
    }

    fn values() -> Arc<DataDescriptor> {
        DataDescriptor::builder()
            .sample_type(SampleType::Float64)
            .build_shared()
            .unwrap()
    }

    fn pair(id: &str, origin: &str) -> (Signal, Signal) {
        let time = Signal::with_descriptor(format!("{}/time", id), domain(origin));
        let signal = Signal::with_descriptor(id, values());
        signal.set_domain_signal(Some(&time)).unwrap();
        (signal, time)
    }

    #[test]
    fn test_clock_conversion() {
        let origin = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = DomainClock::new(origin, Ratio::per(1000).unwrap());
        assert_eq!(clock.to_nanos(1500), 1_500_000_000);
        assert_eq!(
            clock.to_time(1500i64),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap() + chrono::Duration::milliseconds(500))
        );
        assert_eq!(
            clock.to_time(-1i64),
            Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap() + chrono::Duration::milliseconds(999))
        );
    }

    #[test]
    fn test_clock_requires_origin() {
        let relative = DataDescriptor::builder()
            .sample_type(SampleType::Int64)
            .rule(DataRule::Linear {
                delta: Scalar::Int(1),
                start: Scalar::Int(0),
            })
            .build()
            .unwrap();
        assert!(matches!(
            DomainClock::from_descriptor(&relative),
            Err(DataPathError::NoAbsoluteTime)
        ));
    }

    #[test]
    fn test_stream_timestamps_at_one_millisecond() {
        let (signal, _time) = pair("ai0", UNIX_EPOCH_ORIGIN);
        let mut reader = TimeReader::for_signal(&signal, ReaderSettings::default()).unwrap();
        signal
            .send_packet(DataPacket::from_samples(values(), 0, &[0.0f64; 10]).unwrap())
            .unwrap();
        let result = reader.read(10).unwrap();
        assert_eq!(result.status, ReadStatus::Ok);
        assert_eq!(result.timestamps.len(), 10);
        for (i, ts) in result.timestamps.iter().enumerate() {
            assert_eq!(ts.timestamp_millis(), i as i64);
        }
    }

    #[test]
    fn test_signal_without_domain_is_rejected() {
        let signal = Signal::with_descriptor("bare", values());
        assert!(matches!(
            TimeReader::for_signal(&signal, ReaderSettings::default()),
            Err(DataPathError::NoAbsoluteTime)
        ));
    }

    #[test]
    fn test_multi_timestamps_match_after_alignment() {
        let (a, _ta) = pair("a", "2024-01-01T00:00:00Z");
        let (b, _tb) = pair("b", "2024-01-01T00:00:00.003Z");
        let multi = MultiReader::new(&[a.clone(), b.clone()], MultiReaderSettings::default()).unwrap();
        let mut reader = TimeReader::<MultiReader>::new(multi);
        for s in [&a, &b] {
            s.send_packet(DataPacket::from_samples(values(), 0, &[1.0f64; 20]).unwrap())
                .unwrap();
        }
        let result = reader.read(10).unwrap();
        assert_eq!(result.frames, 10);
        assert_eq!(result.timestamps[0], result.timestamps[1]);
        assert_eq!(
            result.timestamps[0][0],
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(3)
        );
    }
}
