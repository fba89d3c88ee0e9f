//! Packets: the unit of transport between signals and readers.
//!
//! A [`Packet`] is either a block of samples ([`DataPacket`]) or an in-band
//! metadata event ([`EventPacket`]). Both are reference counted, so fanning a
//! packet out to many connections copies a pointer, not the buffer.
//!
//! A `DataPacket` is mutable only while its producer owns it by value; once it
//! is wrapped by [`DataPacket::into_packet`] it can no longer change.

use crate::descriptor::DataDescriptor;
use crate::error::{DataPathError, Result};
use crate::types::{Sample, Scalar};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Event identifiers understood by the data path.
pub mod event_ids {
    /// New value and/or domain descriptor takes effect from this point
    pub const DATA_DESCRIPTOR_CHANGED: &str = "DATA_DESCRIPTOR_CHANGED";
    /// A connection discarded data packets on overflow
    pub const DROPPED_SAMPLES: &str = "DROPPED_SAMPLES";
}

/// Parameter keys of the built-in events.
pub mod event_params {
    pub const DATA_DESCRIPTOR: &str = "DataDescriptor";
    pub const DOMAIN_DATA_DESCRIPTOR: &str = "DomainDataDescriptor";
    pub const DROPPED_SAMPLES: &str = "DROPPED_SAMPLES";
}

/// An event parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    Descriptor(Arc<DataDescriptor>),
    /// Explicitly removed
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl EventValue {
    pub fn as_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        match self {
            EventValue::Descriptor(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            EventValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            EventValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EventValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// What a descriptor-change event does to one descriptor slot
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DescriptorUpdate {
    #[default]
    Unchanged,
    Set(Arc<DataDescriptor>),
    Cleared,
}

impl DescriptorUpdate {
    fn from_param(value: Option<&EventValue>) -> Self {
        match value {
            None => DescriptorUpdate::Unchanged,
            Some(EventValue::Descriptor(d)) => DescriptorUpdate::Set(d.clone()),
            Some(_) => DescriptorUpdate::Cleared,
        }
    }

    fn into_param(self) -> Option<EventValue> {
        match self {
            DescriptorUpdate::Unchanged => None,
            DescriptorUpdate::Set(d) => Some(EventValue::Descriptor(d)),
            DescriptorUpdate::Cleared => Some(EventValue::Null),
        }
    }

    /// The descriptor in effect after this update
    pub fn apply(
        &self,
        current: Option<&Arc<DataDescriptor>>,
    ) -> Option<Arc<DataDescriptor>> {
        match self {
            DescriptorUpdate::Unchanged => current.cloned(),
            DescriptorUpdate::Set(d) => Some(d.clone()),
            DescriptorUpdate::Cleared => None,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, DescriptorUpdate::Unchanged)
    }
}

/// Decoded `DATA_DESCRIPTOR_CHANGED` parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescriptorChange {
    pub value: DescriptorUpdate,
    pub domain: DescriptorUpdate,
}

/// Immutable named event carried inline with data
#[derive(Debug, Clone, PartialEq)]
pub struct EventPacket {
    id: String,
    parameters: BTreeMap<String, EventValue>,
}

impl EventPacket {
    pub fn new(id: impl Into<String>, parameters: BTreeMap<String, EventValue>) -> Self {
        Self {
            id: id.into(),
            parameters,
        }
    }

    /// `DATA_DESCRIPTOR_CHANGED`; `None` leaves that descriptor unchanged
    pub fn descriptor_changed(
        value: Option<Arc<DataDescriptor>>,
        domain: Option<Arc<DataDescriptor>>,
    ) -> Self {
        Self::from_change(DescriptorChange {
            value: value.map(DescriptorUpdate::Set).unwrap_or_default(),
            domain: domain.map(DescriptorUpdate::Set).unwrap_or_default(),
        })
    }

    pub fn from_change(change: DescriptorChange) -> Self {
        let mut parameters = BTreeMap::new();
        if let Some(v) = change.value.into_param() {
            parameters.insert(event_params::DATA_DESCRIPTOR.to_string(), v);
        }
        if let Some(v) = change.domain.into_param() {
            parameters.insert(event_params::DOMAIN_DATA_DESCRIPTOR.to_string(), v);
        }
        Self::new(event_ids::DATA_DESCRIPTOR_CHANGED, parameters)
    }

    pub fn dropped_samples(count: u64) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            event_params::DROPPED_SAMPLES.to_string(),
            EventValue::Int(count as i64),
        );
        Self::new(event_ids::DROPPED_SAMPLES, parameters)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parameters(&self) -> &BTreeMap<String, EventValue> {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&EventValue> {
        self.parameters.get(key)
    }

    pub fn is_descriptor_changed(&self) -> bool {
        self.id == event_ids::DATA_DESCRIPTOR_CHANGED
    }

    pub fn is_dropped_samples(&self) -> bool {
        self.id == event_ids::DROPPED_SAMPLES
    }

    pub fn descriptor_change(&self) -> Option<DescriptorChange> {
        if !self.is_descriptor_changed() {
            return None;
        }
        Some(DescriptorChange {
            value: DescriptorUpdate::from_param(self.parameter(event_params::DATA_DESCRIPTOR)),
            domain: DescriptorUpdate::from_param(
                self.parameter(event_params::DOMAIN_DATA_DESCRIPTOR),
            ),
        })
    }

    pub fn dropped_count(&self) -> Option<u64> {
        if !self.is_dropped_samples() {
            return None;
        }
        self.parameter(event_params::DROPPED_SAMPLES)
            .and_then(EventValue::as_int)
            .map(|v| v.max(0) as u64)
    }
}

/// A block of samples described by a descriptor
#[derive(Debug, Clone)]
pub struct DataPacket {
    descriptor: Arc<DataDescriptor>,
    sample_count: usize,
    offset: i64,
    data: Vec<u8>,
    domain_packet: Option<Arc<DataPacket>>,
}

impl DataPacket {
    /// Allocate a packet; explicit fixed-size layouts get a zeroed buffer
    pub fn new(descriptor: Arc<DataDescriptor>, sample_count: usize, offset: i64) -> Result<Self> {
        let data = if descriptor.is_rule_based() {
            Vec::new()
        } else {
            let size = descriptor.raw_sample_size().ok_or_else(|| {
                DataPathError::InvalidDescriptor(format!(
                    "{} samples have no fixed size, construct the packet from raw bytes",
                    descriptor.raw_sample_type()
                ))
            })?;
            vec![0u8; size * sample_count]
        };
        Ok(Self {
            descriptor,
            sample_count,
            offset,
            data,
            domain_packet: None,
        })
    }

    /// Wrap an existing buffer, checking its length against the descriptor
    pub fn from_raw(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        offset: i64,
        data: Vec<u8>,
    ) -> Result<Self> {
        let expected = if descriptor.is_rule_based() {
            Some(0)
        } else {
            descriptor.raw_sample_size().map(|s| s * sample_count)
        };
        if let Some(expected) = expected {
            if data.len() != expected {
                return Err(DataPathError::InvalidData(format!(
                    "buffer holds {} bytes, descriptor needs {}",
                    data.len(),
                    expected
                )));
            }
        }
        Ok(Self {
            descriptor,
            sample_count,
            offset,
            data,
            domain_packet: None,
        })
    }

    /// Build an explicit packet holding `values` (flattened across dimensions)
    pub fn from_samples<T: Sample>(
        descriptor: Arc<DataDescriptor>,
        offset: i64,
        values: &[T],
    ) -> Result<Self> {
        let per_sample = descriptor.elements_per_sample().max(1);
        if values.len() % per_sample != 0 {
            return Err(DataPathError::InvalidData(format!(
                "{} values do not fill whole samples of {} elements",
                values.len(),
                per_sample
            )));
        }
        let mut packet = Self::new(descriptor, values.len() / per_sample, offset)?;
        packet.write_samples(values)?;
        Ok(packet)
    }

    /// Value packet sharing the time vector of `domain_packet`
    pub fn with_domain(
        domain_packet: Arc<DataPacket>,
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        offset: i64,
    ) -> Result<Self> {
        if domain_packet.sample_count != sample_count {
            return Err(DataPathError::DomainMismatch(format!(
                "value packet has {} samples, domain packet has {}",
                sample_count, domain_packet.sample_count
            )));
        }
        let mut packet = Self::new(descriptor, sample_count, offset)?;
        packet.domain_packet = Some(domain_packet);
        Ok(packet)
    }

    /// Attach a domain packet to an already filled packet
    pub fn set_domain_packet(&mut self, domain_packet: Arc<DataPacket>) -> Result<()> {
        if domain_packet.sample_count != self.sample_count {
            return Err(DataPathError::DomainMismatch(format!(
                "value packet has {} samples, domain packet has {}",
                self.sample_count, domain_packet.sample_count
            )));
        }
        self.domain_packet = Some(domain_packet);
        Ok(())
    }

    /// Fill the buffer with raw values of the descriptor's raw element type
    pub fn write_samples<T: Sample>(&mut self, values: &[T]) -> Result<()> {
        let raw_type = self.descriptor.raw_sample_type();
        if T::SAMPLE_TYPE != raw_type {
            return Err(DataPathError::InvalidData(format!(
                "cannot write {} values into a {} buffer",
                T::SAMPLE_TYPE,
                raw_type
            )));
        }
        if self.descriptor.is_rule_based() {
            return Err(DataPathError::InvalidData(
                "rule-based packets have no buffer".to_string(),
            ));
        }
        if values.len() != self.element_count() {
            return Err(DataPathError::InvalidData(format!(
                "expected {} values, got {}",
                self.element_count(),
                values.len()
            )));
        }
        let size = std::mem::size_of::<T>();
        for (chunk, value) in self.data.chunks_exact_mut(size).zip(values) {
            value.write_ne(chunk);
        }
        Ok(())
    }

    pub fn descriptor(&self) -> &Arc<DataDescriptor> {
        &self.descriptor
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn domain_packet(&self) -> Option<&Arc<DataPacket>> {
        self.domain_packet.as_ref()
    }

    /// `sample_count * elements_per_sample`
    pub fn element_count(&self) -> usize {
        self.sample_count * self.descriptor.elements_per_sample()
    }

    /// Raw element `index` at the raw sample type, materializing rules
    #[inline]
    pub fn element_at(&self, index: usize) -> Option<Scalar> {
        if index >= self.element_count() {
            return None;
        }
        let raw_type = self.descriptor.raw_sample_type();
        if let Some(v) = self.descriptor.rule().evaluate(self.offset, index as i64, raw_type) {
            return Some(v);
        }
        let size = raw_type.size_bytes()?;
        let start = index * size;
        raw_type.decode(self.data.get(start..start + size)?)
    }

    /// Raw bytes of sample `index`, `None` for rule-based packets
    pub fn sample_bytes(&self, index: usize) -> Option<&[u8]> {
        if self.descriptor.is_rule_based() {
            return None;
        }
        let size = self.descriptor.raw_sample_size()?;
        self.data.get(index * size..(index + 1) * size)
    }

    /// Copy of all raw elements as `T`
    pub fn samples<T: Sample>(&self) -> Vec<T> {
        (0..self.element_count())
            .filter_map(|i| self.element_at(i))
            .map(T::from_scalar)
            .collect()
    }

    /// Buffer length matches the descriptor
    pub fn is_consistent(&self) -> bool {
        if self.descriptor.is_rule_based() {
            return self.data.is_empty();
        }
        match self.descriptor.raw_sample_size() {
            Some(size) => self.data.len() == size * self.sample_count,
            None => true,
        }
    }

    /// Freeze the packet for sending
    pub fn into_packet(self) -> Packet {
        Packet::Data(Arc::new(self))
    }
}

/// A unit of transport
#[derive(Debug, Clone)]
pub enum Packet {
    Data(Arc<DataPacket>),
    Event(Arc<EventPacket>),
}

impl Packet {
    pub fn event(event: EventPacket) -> Self {
        Packet::Event(Arc::new(event))
    }

    pub fn is_event(&self) -> bool {
        matches!(self, Packet::Event(_))
    }

    pub fn as_data(&self) -> Option<&Arc<DataPacket>> {
        match self {
            Packet::Data(p) => Some(p),
            Packet::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&Arc<EventPacket>> {
        match self {
            Packet::Event(e) => Some(e),
            Packet::Data(_) => None,
        }
    }

    /// Data samples carried, 0 for events
    pub fn sample_count(&self) -> usize {
        match self {
            Packet::Data(p) => p.sample_count(),
            Packet::Event(_) => 0,
        }
    }

    /// Same underlying allocation
    pub fn ptr_eq(&self, other: &Packet) -> bool {
        match (self, other) {
            (Packet::Data(a), Packet::Data(b)) => Arc::ptr_eq(a, b),
            (Packet::Event(a), Packet::Event(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<DataPacket> for Packet {
    fn from(packet: DataPacket) -> Self {
        packet.into_packet()
    }
}

impl From<EventPacket> for Packet {
    fn from(event: EventPacket) -> Self {
        Packet::event(event)
    }
}
