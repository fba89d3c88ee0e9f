//! Per-signal read cursor shared by the stream and multi readers.
//!
//! A [`Channel`] owns the input port of one signal, the descriptors it has
//! seen so far, the conversions derived from them, and the data packet it is
//! currently consuming.

use super::convert::{self, Conversion};
use super::ReaderState;
use crate::config::ReaderSettings;
use crate::connection::Connection;
use crate::descriptor::DataDescriptor;
use crate::error::Result;
use crate::input_port::InputPort;
use crate::packet::{DataPacket, EventPacket, Packet};
use crate::signal::Signal;
use crate::types::{SampleBlock, SampleType, Scalar};
use std::sync::Arc;

/// How events in the queue are treated while reading or counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventMode {
    /// Silent events are consumed in line, halting events stop the read
    Inline,
    /// Every event stops the read without being consumed
    Barrier,
}

/// Why a fill stopped
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Filled,
    Empty,
    /// A halting event was consumed
    Event(Arc<EventPacket>),
    /// An event is at the head and was left there (`EventMode::Barrier`)
    AtEvent,
    Unknown(String),
    Invalid(String),
    Closed,
}

/// Readable samples before the next stop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Avail {
    pub samples: usize,
    /// Counting ended at an event rather than at the end of the queue
    pub boundary: bool,
}

/// First readable sample of a channel and how many follow it
#[derive(Debug, Clone)]
pub(crate) struct Lookahead {
    pub samples: usize,
    pub domain: Arc<DataDescriptor>,
    pub first_tick: Scalar,
}

fn same(a: &Arc<DataDescriptor>, b: &Arc<DataDescriptor>) -> bool {
    Arc::ptr_eq(a, b) || **a == **b
}

pub(crate) struct Channel {
    port: InputPort,
    value_type: SampleType,
    domain_type: SampleType,
    skip_events: bool,
    value: Option<Arc<DataDescriptor>>,
    domain: Option<Arc<DataDescriptor>>,
    value_plan: std::result::Result<Conversion, String>,
    domain_plan: std::result::Result<Conversion, String>,
    current: Option<Arc<DataPacket>>,
    position: usize,
    skipped_events: u64,
    discarded: u64,
}

impl Channel {
    pub(crate) fn connect(signal: &Signal, port_id: String, settings: &ReaderSettings) -> Result<Self> {
        let mut port = InputPort::new(port_id).with_settings(settings.connection);
        port.connect(signal)?;
        Ok(Self {
            port,
            value_type: settings.value_type,
            domain_type: settings.domain_type,
            skip_events: settings.skip_events,
            value: None,
            domain: None,
            value_plan: Err("no descriptor received".to_string()),
            domain_plan: Err("no domain descriptor received".to_string()),
            current: None,
            position: 0,
            skipped_events: 0,
            discarded: 0,
        })
    }

    pub(crate) fn connection(&self) -> Option<&Arc<Connection>> {
        self.port.connection()
    }

    pub(crate) fn port(&self) -> &InputPort {
        &self.port
    }

    pub(crate) fn disconnect(&mut self) {
        self.port.disconnect();
        self.current = None;
        self.position = 0;
    }

    pub(crate) fn value_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.value.as_ref()
    }

    pub(crate) fn domain_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.domain.as_ref()
    }

    pub(crate) fn state(&self) -> ReaderState {
        match self.connection() {
            None => return ReaderState::Disconnected,
            Some(conn) if conn.is_closed() => return ReaderState::Disconnected,
            Some(_) => {}
        }
        match (&self.value, &self.value_plan) {
            (None, _) => ReaderState::NeedsDescriptor,
            (Some(_), Ok(_)) => ReaderState::Streaming,
            (Some(_), Err(_)) => ReaderState::Invalid,
        }
    }

    pub(crate) fn skipped_events(&self) -> u64 {
        self.skipped_events
    }

    pub(crate) fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Count samples that were consumed but withheld from the consumer
    pub(crate) fn add_discarded(&mut self, count: u64) {
        self.discarded += count;
    }

    pub(crate) fn dropped_samples(&self) -> u64 {
        self.connection().map(|c| c.dropped_samples()).unwrap_or(0)
    }

    /// Samples left in the packet being consumed
    pub(crate) fn remaining(&self) -> usize {
        self.current
            .as_ref()
            .map(|p| p.sample_count() - self.position)
            .unwrap_or(0)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.connection().map(|c| c.is_closed()).unwrap_or(true)
    }

    pub(crate) fn value_block(&self, capacity: usize) -> SampleBlock {
        match &self.value_plan {
            Ok(plan) => plan.new_block(capacity),
            Err(_) => SampleBlock::with_capacity(self.value_type, 0).unwrap_or_default(),
        }
    }

    pub(crate) fn domain_block(&self, capacity: usize) -> SampleBlock {
        match &self.domain_plan {
            Ok(plan) => plan.new_block(capacity),
            Err(_) => SampleBlock::with_capacity(self.domain_type, 0)
                .unwrap_or_else(|| SampleBlock::Int64(Vec::new())),
        }
    }

    /// Whether `event` stops a read given the descriptors in effect before it
    fn halts(
        &self,
        event: &EventPacket,
        value: Option<&Arc<DataDescriptor>>,
        domain: Option<&Arc<DataDescriptor>>,
    ) -> bool {
        if !self.skip_events {
            return true;
        }
        let Some(change) = event.descriptor_change() else {
            return false;
        };
        let Some(value) = value else {
            return false;
        };
        let value_ok = match change.value.apply(Some(value)) {
            Some(next) => value.is_compatible_value(&next),
            None => false,
        };
        let domain_ok = match (domain, change.domain.apply(domain)) {
            (None, None) => true,
            (Some(old), Some(next)) => old.is_compatible_domain(&next),
            _ => false,
        };
        !(value_ok && domain_ok)
    }

    fn set_descriptors(
        &mut self,
        value: Option<Arc<DataDescriptor>>,
        domain: Option<Arc<DataDescriptor>>,
    ) {
        self.value_plan = match &value {
            Some(d) => Conversion::plan(d, self.value_type),
            None => Err("value descriptor cleared".to_string()),
        };
        self.domain_plan = match &domain {
            Some(d) => Conversion::plan(d, self.domain_type),
            None => Err("no domain descriptor".to_string()),
        };
        if let Err(reason) = &self.value_plan {
            if value.is_some() {
                tracing::debug!(port = %self.port.id(), "Unreadable descriptor: {}", reason);
            }
        }
        self.value = value;
        self.domain = domain;
    }

    /// Apply `event`; returns whether it halts the read
    fn apply_event(&mut self, event: &EventPacket) -> bool {
        let halting = self.halts(event, self.value.as_ref(), self.domain.as_ref());
        if let Some(change) = event.descriptor_change() {
            let value = change.value.apply(self.value.as_ref());
            let domain = change.domain.apply(self.domain.as_ref());
            self.set_descriptors(value, domain);
            tracing::debug!(
                port = %self.port.id(),
                halting,
                sample_type = ?self.value.as_ref().map(|d| d.sample_type()),
                "Descriptor change received"
            );
        }
        if !halting {
            self.skipped_events += 1;
        }
        halting
    }

    /// Pop the head event once the current packet is used up
    ///
    /// Returns the event and whether it halts.
    pub(crate) fn take_event(&mut self) -> Option<(Arc<EventPacket>, bool)> {
        if self.remaining() > 0 {
            return None;
        }
        let packet = self.connection()?.dequeue_if(Packet::is_event)?;
        let event = packet.as_event()?.clone();
        let halting = self.apply_event(&event);
        Some((event, halting))
    }

    /// Make the next data packet current
    fn advance(&mut self, mode: EventMode, want_domain: bool) -> std::result::Result<(), Step> {
        loop {
            self.current = None;
            self.position = 0;
            let Some(conn) = self.port.connection().cloned() else {
                return Err(Step::Closed);
            };
            let packet = match mode {
                EventMode::Inline => conn.dequeue(),
                EventMode::Barrier => match conn.dequeue_if(|p| !p.is_event()) {
                    Some(p) => Some(p),
                    None if conn.peek().is_some() => return Err(Step::AtEvent),
                    None => None,
                },
            };
            let Some(packet) = packet else {
                return Err(if conn.is_closed() { Step::Closed } else { Step::Empty });
            };

            let data = match packet {
                Packet::Event(event) => {
                    if self.apply_event(&event) {
                        return Err(Step::Event(event));
                    }
                    continue;
                }
                Packet::Data(data) => data,
            };

            match &self.value {
                Some(current) if same(current, data.descriptor()) => {}
                Some(_) => {
                    return Err(Step::Invalid(
                        "data packet does not match the announced descriptor".to_string(),
                    ))
                }
                None => {
                    return Err(Step::Invalid(
                        "data packet received before any descriptor".to_string(),
                    ))
                }
            }
            if !data.is_consistent() {
                return Err(Step::Invalid(format!(
                    "buffer of {} bytes does not hold {} samples",
                    data.data().len(),
                    data.sample_count()
                )));
            }
            if let Err(reason) = &self.value_plan {
                tracing::trace!(port = %self.port.id(), samples = data.sample_count(), "Discarding unreadable packet");
                return Err(Step::Unknown(reason.clone()));
            }
            if want_domain {
                if let Err(reason) = convert::domain_source(&data, self.domain.as_deref()) {
                    return Err(Step::Invalid(reason));
                }
                if let Err(reason) = &self.domain_plan {
                    if data.domain_packet().is_none() {
                        return Err(Step::Unknown(reason.clone()));
                    }
                }
            }
            if data.sample_count() == 0 {
                continue;
            }
            self.current = Some(data);
            return Ok(());
        }
    }

    /// Ensure a data packet with unread samples is current
    pub(crate) fn prime(&mut self, mode: EventMode, want_domain: bool) -> std::result::Result<(), Step> {
        if self.remaining() > 0 {
            return Ok(());
        }
        self.advance(mode, want_domain)
    }

    /// Non-consuming view of what the next alignment would see
    ///
    /// Silent events ahead of the first data packet are simulated; after it,
    /// any event ends the count.
    pub(crate) fn lookahead(&self) -> Option<Lookahead> {
        let conn = self.connection()?;
        let snapshot = conn.snapshot();

        if self.remaining() > 0 {
            let queued = self.count_queued(snapshot.iter(), EventMode::Barrier);
            return Some(Lookahead {
                samples: self.remaining() + queued.samples,
                domain: self.domain.clone()?,
                first_tick: self.next_domain_value()?,
            });
        }

        let mut value = self.value.clone();
        let mut domain = self.domain.clone();
        for (index, packet) in snapshot.iter().enumerate() {
            match packet {
                Packet::Event(event) => {
                    if self.halts(event, value.as_ref(), domain.as_ref()) {
                        return None;
                    }
                    if let Some(change) = event.descriptor_change() {
                        value = change.value.apply(value.as_ref());
                        domain = change.domain.apply(domain.as_ref());
                    }
                }
                Packet::Data(data) => {
                    let readable = value
                        .as_ref()
                        .is_some_and(|d| Conversion::plan(d, self.value_type).is_ok());
                    if !readable || data.sample_count() == 0 {
                        return None;
                    }
                    let domain = domain?;
                    let first_tick = convert::domain_value(data, Some(&*domain), 0)?;
                    let rest = snapshot[index + 1..]
                        .iter()
                        .take_while(|p| !p.is_event())
                        .map(Packet::sample_count)
                        .sum::<usize>();
                    return Some(Lookahead {
                        samples: data.sample_count() + rest,
                        domain,
                        first_tick,
                    });
                }
            }
        }
        None
    }

    /// Convert up to `n` samples into the output blocks
    ///
    /// `values == None` discards the samples and counts them as discarded.
    /// Blocks are created lazily so their type follows the descriptor in
    /// effect when the first sample is produced.
    pub(crate) fn fill(
        &mut self,
        n: usize,
        mut values: Option<&mut Option<SampleBlock>>,
        mut domain: Option<&mut Option<SampleBlock>>,
        mode: EventMode,
    ) -> (usize, Step) {
        let mut produced = 0;
        while produced < n {
            if self.remaining() == 0 {
                if let Err(step) = self.advance(mode, domain.is_some()) {
                    return (produced, step);
                }
            }
            let Some(packet) = self.current.clone() else {
                return (produced, Step::Empty);
            };
            let start = self.position;
            let count = (n - produced).min(self.remaining());

            match values.as_deref_mut() {
                Some(block) => {
                    if let Ok(plan) = &self.value_plan {
                        let out = block.get_or_insert_with(|| plan.new_block(n));
                        plan.append(&packet, start, count, out);
                    }
                }
                None => self.discarded += count as u64,
            }
            if let Some(block) = domain.as_deref_mut() {
                let capacity = n;
                let out = block.get_or_insert_with(|| self.domain_block(capacity));
                convert::append_domain(&packet, self.domain.as_deref(), start, count, out);
            }

            self.position += count;
            produced += count;
        }
        (produced, Step::Filled)
    }

    /// Domain value of the next unread sample, as used for alignment
    pub(crate) fn next_domain_value(&self) -> Option<Scalar> {
        let packet = self.current.as_ref()?;
        if self.position >= packet.sample_count() {
            return None;
        }
        convert::domain_value(packet, self.domain.as_deref(), self.position)
    }

    /// Readable samples including the current packet and the queued ones
    pub(crate) fn available(&self, mode: EventMode) -> Avail {
        let Some(conn) = self.connection() else {
            return Avail::default();
        };
        let queued = self.count_queued(conn.snapshot().iter(), mode);
        Avail {
            samples: self.remaining() + queued.samples,
            boundary: queued.boundary,
        }
    }

    /// Count readable samples in `packets`, simulating descriptor changes
    pub(crate) fn count_queued<'a, I>(&self, packets: I, mode: EventMode) -> Avail
    where
        I: Iterator<Item = &'a Packet>,
    {
        let mut value = self.value.clone();
        let mut domain = self.domain.clone();
        let mut readable = value.is_some() && self.value_plan.is_ok();
        let mut avail = Avail::default();

        for packet in packets {
            match packet {
                Packet::Event(event) => {
                    if mode == EventMode::Barrier
                        || self.halts(event, value.as_ref(), domain.as_ref())
                    {
                        avail.boundary = true;
                        break;
                    }
                    if let Some(change) = event.descriptor_change() {
                        let next = change.value.apply(value.as_ref());
                        if !change.value.is_unchanged() {
                            readable = next
                                .as_ref()
                                .is_some_and(|d| Conversion::plan(d, self.value_type).is_ok());
                        }
                        value = next;
                        domain = change.domain.apply(domain.as_ref());
                    }
                }
                Packet::Data(data) => {
                    if !readable {
                        avail.boundary = true;
                        break;
                    }
                    avail.samples += data.sample_count();
                }
            }
        }
        avail
    }
}
