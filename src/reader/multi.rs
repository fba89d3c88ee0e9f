//! Reader for several signals aligned on a common absolute time axis.
//!
//! Every signal must have a domain signal with a linear rule, an origin and a
//! tick resolution. Instants are compared exactly in integer units of a
//! common base (the least common multiple of one nanosecond and every tick
//! resolution denominator), so no rounding enters the alignment.
//!
//! Alignment picks the first instant `t0` at or after the latest first sample
//! that lies on the coarsest signal's sample grid, and discards leading
//! samples of every signal until its next sample is at `t0`. Signals whose
//! sample instants never meet cannot be aligned and read as `InvalidData`.
//! Any event on any signal is a barrier: data is delivered up to it, the
//! event is handled, and alignment runs again.

use super::channel::{Channel, EventMode, Lookahead, Step};
use super::stream::reader_port_id;
use super::{ReadStatus, ReaderState};
use crate::config::{MultiReaderSettings, ReadTimeoutMode, RequiredCommonSampleRate};
use crate::connection::WaitOutcome;
use crate::descriptor::{DataDescriptor, DataRule};
use crate::error::{DataPathError, Result};
use crate::packet::EventPacket;
use crate::signal::{Signal, SignalRegistry};
use crate::types::{lcm_i128, Ratio, SampleBlock, Scalar};
use std::sync::Arc;
use std::time::{Duration, Instant};

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Longest single park while waiting for the slowest signal
const WAIT_SLICE: Duration = Duration::from_millis(5);

/// Absolute timeline of a linear domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timeline {
    origin_ns: i128,
    tick: Ratio,
    delta: i64,
}

impl Timeline {
    fn from_descriptor(descriptor: &DataDescriptor) -> std::result::Result<Self, String> {
        let DataRule::Linear { delta, .. } = *descriptor.rule() else {
            return Err("domain rule is not linear".to_string());
        };
        let tick = descriptor
            .tick_resolution()
            .ok_or_else(|| "domain has no tick resolution".to_string())?;
        let origin = descriptor
            .parsed_origin()
            .ok_or_else(|| "domain has no absolute origin".to_string())?;
        let delta = delta.as_i64();
        if delta <= 0 || tick.num() <= 0 {
            return Err(format!("domain does not advance (delta {}, tick {})", delta, tick));
        }
        Ok(Self {
            origin_ns: origin.timestamp() as i128 * NANOS_PER_SECOND
                + origin.timestamp_subsec_nanos() as i128,
            tick,
            delta,
        })
    }

    fn tick_units(&self, base: i128) -> i128 {
        self.tick.num() as i128 * (base / self.tick.den() as i128)
    }

    /// Sample period in base units
    fn period(&self, base: i128) -> i128 {
        self.tick_units(base) * self.delta as i128
    }

    /// Instant of domain value `ticks` in base units
    fn instant(&self, base: i128, ticks: i64) -> i128 {
        self.origin_ns * (base / NANOS_PER_SECOND) + ticks as i128 * self.tick_units(base)
    }
}

fn common_base(timelines: &[Timeline]) -> i128 {
    timelines
        .iter()
        .fold(NANOS_PER_SECOND, |base, t| lcm_i128(base, t.tick.den() as i128))
}

/// Samples each signal contributes per frame at the coarsest rate
fn frame_sizes(
    timelines: &[Timeline],
    base: i128,
    required: RequiredCommonSampleRate,
) -> std::result::Result<Vec<usize>, String> {
    let periods: Vec<i128> = timelines.iter().map(|t| t.period(base)).collect();
    let coarsest = periods.iter().copied().max().unwrap_or(1);
    if required == RequiredCommonSampleRate::AllEqual && periods.iter().any(|p| *p != coarsest) {
        return Err("signals have different sample rates".to_string());
    }
    periods
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if coarsest % p == 0 {
                Ok((coarsest / p) as usize)
            } else {
                Err(format!(
                    "rate of signal {} is not an integer multiple of the coarsest rate",
                    i
                ))
            }
        })
        .collect()
}

/// Leading samples to drop so every signal starts at one common instant
///
/// Every period divides the coarsest one, so the common start lies on the
/// coarsest signal's grid: its first grid point at or after the latest start.
/// Fails when some signal has no sample on that grid.
fn discard_counts(
    timelines: &[Timeline],
    base: i128,
    ticks: &[Scalar],
) -> std::result::Result<Vec<u64>, String> {
    let starts: Vec<i128> = timelines
        .iter()
        .zip(ticks)
        .map(|(t, v)| t.instant(base, v.as_i64()))
        .collect();
    let periods: Vec<i128> = timelines.iter().map(|t| t.period(base)).collect();
    let Some((coarse, &period)) = periods.iter().enumerate().max_by_key(|(_, p)| **p) else {
        return Ok(Vec::new());
    };
    let anchor = starts[coarse];
    if let Some(i) = (0..starts.len()).find(|&i| (anchor - starts[i]).rem_euclid(periods[i]) != 0) {
        return Err(format!(
            "sample instants of signal {} never coincide with signal {}",
            i, coarse
        ));
    }
    let latest = starts.iter().copied().max().unwrap_or(anchor);
    let t0 = anchor + (latest - anchor + period - 1).div_euclid(period) * period;
    Ok(starts
        .iter()
        .zip(&periods)
        .map(|(start, p)| ((t0 - start) / p) as u64)
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Alignment {
    Unaligned,
    Discarding(Vec<u64>),
    Aligned,
}

type IndexedEvent = Option<(usize, Arc<EventPacket>)>;

enum AlignOutcome {
    Aligned,
    Pending,
    Stop(ReadStatus, IndexedEvent),
}

enum Progress {
    Frames(usize),
    /// Frames kept from a batch that stopped early, and why it stopped
    Interrupted(usize, ReadStatus),
    Blocked,
    Realign,
    Stop(ReadStatus, IndexedEvent),
}

fn block_len(block: &Option<SampleBlock>) -> usize {
    block.as_ref().map(SampleBlock::len).unwrap_or(0)
}

/// Shrink the `count` samples a batch appended after `before` to `keep`
fn trim_batch(block: &mut Option<SampleBlock>, before: usize, count: usize, keep: usize) {
    if let Some(block) = block {
        let per_sample = block.len().saturating_sub(before) / count.max(1);
        block.truncate(before + keep * per_sample);
    }
}

fn status_for(step: &Step) -> ReadStatus {
    match step {
        Step::Filled | Step::Empty | Step::AtEvent => ReadStatus::Ok,
        Step::Event(_) => ReadStatus::Event,
        Step::Unknown(_) => ReadStatus::UnknownDescriptor,
        Step::Invalid(_) | Step::Closed => ReadStatus::InvalidData,
    }
}

/// Aligned values from every signal of a [`MultiReader`]
#[derive(Debug, Clone, PartialEq)]
pub struct MultiReadResult {
    /// One block per signal, in construction order
    pub values: Vec<SampleBlock>,
    pub domain: Vec<SampleBlock>,
    /// Frames read; signal `i` contributed `frames * samples_per_frame(i)` samples
    pub frames: usize,
    pub status: ReadStatus,
    /// Signal index and the event that stopped the read
    pub event: IndexedEvent,
}

impl MultiReadResult {
    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Reads N signals so that index `i` of every block is the same instant
pub struct MultiReader {
    channels: Vec<Channel>,
    settings: MultiReaderSettings,
    alignment: Alignment,
    frame_sizes: Vec<usize>,
}

impl MultiReader {
    /// Connect to `signals`; fails with `NotSynchronized` if any of them lacks
    /// an absolute linear time domain or the rates are incompatible
    pub fn new(signals: &[Signal], settings: MultiReaderSettings) -> Result<Self> {
        if signals.is_empty() {
            return Err(DataPathError::NotSynchronized("no signals given".to_string()));
        }
        let timelines = signals
            .iter()
            .map(|s| {
                let domain = s.domain_descriptor().ok_or_else(|| {
                    DataPathError::NotSynchronized(format!("'{}' has no domain signal", s.id()))
                })?;
                Timeline::from_descriptor(&domain)
                    .map_err(|e| DataPathError::NotSynchronized(format!("'{}': {}", s.id(), e)))
            })
            .collect::<Result<Vec<_>>>()?;
        let base = common_base(&timelines);
        let frame_sizes = frame_sizes(&timelines, base, settings.required_common_sample_rate)
            .map_err(DataPathError::NotSynchronized)?;

        let channel_settings = settings.channel_settings();
        let channels = signals
            .iter()
            .map(|s| Channel::connect(s, reader_port_id(s), &channel_settings))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            signals = signals.len(),
            ?frame_sizes,
            "Multi reader created"
        );
        Ok(Self {
            channels,
            settings,
            alignment: Alignment::Unaligned,
            frame_sizes,
        })
    }

    pub fn from_registry(
        registry: &SignalRegistry,
        ids: &[&str],
        settings: MultiReaderSettings,
    ) -> Result<Self> {
        let signals = ids
            .iter()
            .map(|id| registry.get(id))
            .collect::<Result<Vec<_>>>()?;
        Self::new(&signals, settings)
    }

    pub fn settings(&self) -> &MultiReaderSettings {
        &self.settings
    }

    pub fn signal_count(&self) -> usize {
        self.channels.len()
    }

    /// Leading samples of signal `index` dropped by alignment
    pub fn discarded(&self, index: usize) -> u64 {
        self.channels.get(index).map(|c| c.discarded()).unwrap_or(0)
    }

    pub fn dropped_samples(&self, index: usize) -> u64 {
        self.channels.get(index).map(|c| c.dropped_samples()).unwrap_or(0)
    }

    pub fn samples_per_frame(&self, index: usize) -> usize {
        self.frame_sizes.get(index).copied().unwrap_or(0)
    }

    pub fn value_descriptor(&self, index: usize) -> Option<Arc<DataDescriptor>> {
        self.channels.get(index)?.value_descriptor().cloned()
    }

    pub fn domain_descriptor(&self, index: usize) -> Option<Arc<DataDescriptor>> {
        self.channels.get(index)?.domain_descriptor().cloned()
    }

    pub fn state(&self, index: usize) -> ReaderState {
        self.channels
            .get(index)
            .map(|c| c.state())
            .unwrap_or(ReaderState::Disconnected)
    }

    pub fn is_aligned(&self) -> bool {
        self.alignment == Alignment::Aligned
    }

    pub fn disconnect(&mut self) {
        for channel in &mut self.channels {
            channel.disconnect();
        }
        self.alignment = Alignment::Unaligned;
    }

    /// Frames readable now on every signal (after pending alignment)
    pub fn available_count(&self) -> usize {
        self.frames_per_channel().into_iter().min().unwrap_or(0)
    }

    pub fn read(&mut self, n: usize) -> MultiReadResult {
        self.read_timeout(n, self.settings.timeout_ms)
    }

    pub fn read_timeout(&mut self, n: usize, timeout_ms: u64) -> MultiReadResult {
        let count = self.channels.len();
        let mut values: Vec<Option<SampleBlock>> = (0..count).map(|_| None).collect();
        let mut domain: Vec<Option<SampleBlock>> = (0..count).map(|_| None).collect();

        if n == 0 {
            return self.finish(values, domain, 0, ReadStatus::Ok, None);
        }
        let deadline =
            (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));

        if let (Some(deadline), ReadTimeoutMode::All) = (deadline, self.settings.timeout_mode) {
            while self.available_count() < n && !self.at_halting_event() {
                match self.wait_slowest(deadline) {
                    WaitOutcome::Ready => {}
                    WaitOutcome::TimedOut => {
                        return self.finish(values, domain, 0, ReadStatus::Timeout, None)
                    }
                    WaitOutcome::Closed => {
                        return self.finish(values, domain, 0, ReadStatus::InvalidData, None)
                    }
                }
            }
        }

        let mut produced = 0;
        loop {
            match self.step(n - produced, &mut values, &mut domain) {
                Progress::Frames(frames) => {
                    produced += frames;
                    if produced >= n {
                        return self.finish(values, domain, produced, ReadStatus::Ok, None);
                    }
                    continue;
                }
                Progress::Interrupted(frames, status) => {
                    produced += frames;
                    return self.finish(values, domain, produced, status, None);
                }
                Progress::Realign => continue,
                Progress::Stop(status, event) => {
                    return self.finish(values, domain, produced, status, event)
                }
                Progress::Blocked => {}
            }
            let Some(deadline) = deadline else {
                return self.finish(values, domain, produced, ReadStatus::Ok, None);
            };
            let status = match self.wait_slowest(deadline) {
                WaitOutcome::Ready => continue,
                WaitOutcome::TimedOut => ReadStatus::Timeout,
                WaitOutcome::Closed => ReadStatus::InvalidData,
            };
            return self.finish(values, domain, produced, status, None);
        }
    }

    fn finish(
        &self,
        values: Vec<Option<SampleBlock>>,
        domain: Vec<Option<SampleBlock>>,
        frames: usize,
        status: ReadStatus,
        event: IndexedEvent,
    ) -> MultiReadResult {
        MultiReadResult {
            values: values
                .into_iter()
                .zip(&self.channels)
                .map(|(v, c)| v.unwrap_or_else(|| c.value_block(0)))
                .collect(),
            domain: domain
                .into_iter()
                .zip(&self.channels)
                .map(|(d, c)| d.unwrap_or_else(|| c.domain_block(0)))
                .collect(),
            frames,
            status,
            event,
        }
    }

    /// Frames each channel could deliver now
    fn frames_per_channel(&self) -> Vec<usize> {
        match &self.alignment {
            Alignment::Aligned => self
                .channels
                .iter()
                .zip(&self.frame_sizes)
                .map(|(c, m)| c.available(EventMode::Barrier).samples / m)
                .collect(),
            Alignment::Discarding(pending) => self
                .channels
                .iter()
                .zip(&self.frame_sizes)
                .zip(pending)
                .map(|((c, m), p)| {
                    let samples = c.available(EventMode::Barrier).samples as u64;
                    (samples.saturating_sub(*p) as usize) / m
                })
                .collect(),
            Alignment::Unaligned => self.estimate_unaligned(),
        }
    }

    fn estimate_unaligned(&self) -> Vec<usize> {
        let zeros = vec![0; self.channels.len()];
        let Some(looks) = self
            .channels
            .iter()
            .map(Channel::lookahead)
            .collect::<Option<Vec<Lookahead>>>()
        else {
            return zeros;
        };
        let Ok(timelines) = looks
            .iter()
            .map(|l| Timeline::from_descriptor(&l.domain))
            .collect::<std::result::Result<Vec<_>, _>>()
        else {
            return zeros;
        };
        let base = common_base(&timelines);
        let Ok(sizes) = frame_sizes(&timelines, base, self.settings.required_common_sample_rate)
        else {
            return zeros;
        };
        let ticks: Vec<Scalar> = looks.iter().map(|l| l.first_tick).collect();
        let Ok(pending) = discard_counts(&timelines, base, &ticks) else {
            return zeros;
        };
        looks
            .iter()
            .zip(&sizes)
            .zip(&pending)
            .map(|((l, m), p)| ((l.samples as u64).saturating_sub(*p) as usize) / m)
            .collect()
    }

    fn at_halting_event(&self) -> bool {
        self.channels
            .iter()
            .any(|c| c.available(EventMode::Inline).boundary)
    }

    /// Park on the channel with the fewest frames until its queue changes
    fn wait_slowest(&self, deadline: Instant) -> WaitOutcome {
        let frames = self.frames_per_channel();
        let slowest = self
            .channels
            .iter()
            .zip(frames)
            .enumerate()
            .min_by_key(|(_, (c, f))| (*f, c.available(EventMode::Inline).samples))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let Some(conn) = self.channels.get(slowest).and_then(Channel::connection) else {
            return WaitOutcome::Closed;
        };
        // A packet may land between the caller's check and this snapshot,
        // so the park is bounded and the caller re-checks.
        let before_len = conn.len();
        let before_tail = conn.snapshot().pop();
        let slice = deadline.min(Instant::now() + WAIT_SLICE);
        let outcome = conn.wait_for(Some(slice), |queue| {
            queue.len() != before_len
                || match (queue.back(), &before_tail) {
                    (Some(now), Some(then)) => !now.ptr_eq(then),
                    (None, None) => false,
                    _ => true,
                }
        });
        match outcome {
            WaitOutcome::TimedOut if slice < deadline => WaitOutcome::Ready,
            other => other,
        }
    }

    fn step(
        &mut self,
        wanted: usize,
        values: &mut [Option<SampleBlock>],
        domain: &mut [Option<SampleBlock>],
    ) -> Progress {
        match self.align() {
            AlignOutcome::Aligned => {}
            AlignOutcome::Pending => return Progress::Blocked,
            AlignOutcome::Stop(status, event) => return Progress::Stop(status, event),
        }

        let frames = self.available_count().min(wanted);
        if frames > 0 {
            let before: Vec<(usize, usize)> = values
                .iter()
                .zip(domain.iter())
                .map(|(v, d)| (block_len(v), block_len(d)))
                .collect();
            let mut delivered = vec![0; self.channels.len()];
            let mut failed = None;
            for (i, channel) in self.channels.iter_mut().enumerate() {
                let want = frames * self.frame_sizes[i];
                let (count, step) = channel.fill(
                    want,
                    Some(&mut values[i]),
                    Some(&mut domain[i]),
                    EventMode::Barrier,
                );
                delivered[i] = count;
                if !matches!(step, Step::Filled) {
                    failed = Some(step);
                    break;
                }
            }
            return match failed {
                None => Progress::Frames(frames),
                Some(step) => {
                    let kept = self.keep_whole_frames(&delivered, &before, values, domain);
                    self.alignment = Alignment::Unaligned;
                    Progress::Interrupted(kept, status_for(&step))
                }
            };
        }

        for i in 0..self.channels.len() {
            let channel = &mut self.channels[i];
            let avail = channel.available(EventMode::Barrier);
            if avail.boundary && avail.samples < self.frame_sizes[i] {
                if avail.samples > 0 {
                    channel.fill(avail.samples, None, None, EventMode::Barrier);
                }
                self.alignment = Alignment::Unaligned;
                return match channel.take_event() {
                    Some((event, true)) => Progress::Stop(ReadStatus::Event, Some((i, event))),
                    _ => Progress::Realign,
                };
            }
            if channel.is_closed() {
                return Progress::Stop(ReadStatus::InvalidData, None);
            }
        }
        Progress::Blocked
    }

    /// Cut a failed batch back to the frames every signal completed
    ///
    /// Samples past that point were consumed and are counted as discarded.
    fn keep_whole_frames(
        &mut self,
        delivered: &[usize],
        before: &[(usize, usize)],
        values: &mut [Option<SampleBlock>],
        domain: &mut [Option<SampleBlock>],
    ) -> usize {
        let kept = delivered
            .iter()
            .zip(&self.frame_sizes)
            .map(|(count, m)| count / m)
            .min()
            .unwrap_or(0);
        for (i, channel) in self.channels.iter_mut().enumerate() {
            let count = delivered[i];
            let keep = kept * self.frame_sizes[i];
            if count > keep {
                trim_batch(&mut values[i], before[i].0, count, keep);
                trim_batch(&mut domain[i], before[i].1, count, keep);
                channel.add_discarded((count - keep) as u64);
            }
        }
        kept
    }

    fn align(&mut self) -> AlignOutcome {
        loop {
            match std::mem::replace(&mut self.alignment, Alignment::Unaligned) {
                Alignment::Aligned => {
                    self.alignment = Alignment::Aligned;
                    return AlignOutcome::Aligned;
                }
                Alignment::Unaligned => {
                    if let Some(outcome) = self.prime_all() {
                        return outcome;
                    }
                    match self.compute_alignment() {
                        Ok(pending) => self.alignment = Alignment::Discarding(pending),
                        Err(reason) => {
                            tracing::warn!("Multi reader cannot align: {}", reason);
                            return AlignOutcome::Stop(ReadStatus::InvalidData, None);
                        }
                    }
                }
                Alignment::Discarding(mut pending) => {
                    match self.discard_pending(&mut pending) {
                        None => {
                            tracing::debug!(
                                discarded = ?self.channels.iter().map(Channel::discarded).collect::<Vec<_>>(),
                                "Multi reader aligned"
                            );
                            self.alignment = Alignment::Aligned;
                        }
                        Some(AlignOutcome::Pending) => {
                            self.alignment = Alignment::Discarding(pending);
                            return AlignOutcome::Pending;
                        }
                        Some(AlignOutcome::Aligned) => {}
                        Some(stop) => return stop,
                    }
                }
            }
        }
    }

    /// Load a data packet on every channel, consuming leading events
    fn prime_all(&mut self) -> Option<AlignOutcome> {
        for (i, channel) in self.channels.iter_mut().enumerate() {
            loop {
                match channel.prime(EventMode::Barrier, true) {
                    Ok(()) => break,
                    Err(Step::AtEvent) => match channel.take_event() {
                        Some((event, true)) => {
                            return Some(AlignOutcome::Stop(ReadStatus::Event, Some((i, event))))
                        }
                        _ => continue,
                    },
                    Err(Step::Empty) => return Some(AlignOutcome::Pending),
                    Err(step) => return Some(AlignOutcome::Stop(status_for(&step), None)),
                }
            }
        }
        None
    }

    fn compute_alignment(&mut self) -> std::result::Result<Vec<u64>, String> {
        let timelines = self
            .channels
            .iter()
            .map(|c| {
                c.domain_descriptor()
                    .ok_or_else(|| "domain descriptor missing".to_string())
                    .and_then(|d| Timeline::from_descriptor(d))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let base = common_base(&timelines);
        self.frame_sizes = frame_sizes(&timelines, base, self.settings.required_common_sample_rate)?;
        let ticks = self
            .channels
            .iter()
            .map(|c| c.next_domain_value())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| "no domain value for the first sample".to_string())?;
        discard_counts(&timelines, base, &ticks)
    }

    /// Consume pending discards; `None` once all are done
    ///
    /// `Some(Aligned)` means an event forced realignment and the caller
    /// should loop again.
    fn discard_pending(&mut self, pending: &mut [u64]) -> Option<AlignOutcome> {
        for (i, channel) in self.channels.iter_mut().enumerate() {
            while pending[i] > 0 {
                let (count, step) = channel.fill(pending[i] as usize, None, None, EventMode::Barrier);
                pending[i] -= count as u64;
                match step {
                    Step::Filled => {}
                    Step::Empty => return Some(AlignOutcome::Pending),
                    Step::AtEvent => {
                        return match channel.take_event() {
                            Some((event, true)) => {
                                Some(AlignOutcome::Stop(ReadStatus::Event, Some((i, event))))
                            }
                            _ => Some(AlignOutcome::Aligned),
                        }
                    }
                    other => return Some(AlignOutcome::Stop(status_for(&other), None)),
                }
            }
        }
        None
    }
}

impl std::fmt::Debug for MultiReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiReader")
            .field("signals", &self.channels.len())
            .field("alignment", &self.alignment)
            .field("frame_sizes", &self.frame_sizes)
            .finish()
    }
}
