//! Conversion from packet storage to consumer sample blocks.
//!
//! A [`Conversion`] is chosen once per descriptor from the pair (producer
//! type, consumer type). Numeric data is materialized at the raw type, passed
//! through post-scaling and cast with `as` semantics; ranges and structs are
//! copied through only when the consumer asked for the same type.

use crate::descriptor::{DataDescriptor, PostScaling};
use crate::packet::DataPacket;
use crate::types::{SampleBlock, SampleType, Scalar};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Conversion {
    Numeric {
        target: SampleType,
        scaling: Option<PostScaling>,
    },
    Range,
    Raw {
        sample_size: usize,
    },
}

impl Conversion {
    /// Pick the routine for `descriptor` read as `requested`
    ///
    /// `Undefined` means the producer's own type.
    pub(crate) fn plan(descriptor: &DataDescriptor, requested: SampleType) -> Result<Self, String> {
        let produced = descriptor.sample_type();
        let target = match requested {
            SampleType::Undefined => produced,
            other => other,
        };
        let refuse = || {
            Err(format!(
                "cannot convert {} samples to {}",
                produced, target
            ))
        };

        match produced {
            SampleType::Binary | SampleType::String | SampleType::Undefined => refuse(),
            SampleType::Struct => match (target, descriptor.raw_sample_size()) {
                (SampleType::Struct, Some(sample_size)) => Ok(Conversion::Raw { sample_size }),
                _ => refuse(),
            },
            SampleType::RangeInt64 => match target {
                SampleType::RangeInt64 => Ok(Conversion::Range),
                _ => refuse(),
            },
            _ if target.is_numeric() => Ok(Conversion::Numeric {
                target,
                scaling: descriptor.post_scaling().copied(),
            }),
            _ => refuse(),
        }
    }

    pub(crate) fn output_type(&self) -> SampleType {
        match self {
            Conversion::Numeric { target, .. } => *target,
            Conversion::Range => SampleType::RangeInt64,
            Conversion::Raw { .. } => SampleType::Struct,
        }
    }

    pub(crate) fn new_block(&self, capacity: usize) -> SampleBlock {
        match self {
            Conversion::Raw { sample_size } => SampleBlock::raw(*sample_size),
            other => SampleBlock::with_capacity(other.output_type(), capacity)
                .unwrap_or_else(SampleBlock::empty),
        }
    }

    #[inline]
    fn scale(&self, raw: Scalar) -> Scalar {
        match self {
            Conversion::Numeric {
                scaling: Some(scaling),
                ..
            } => scaling.apply(raw),
            _ => raw,
        }
    }

    /// Append samples `start..start + count` of `packet`
    pub(crate) fn append(
        &self,
        packet: &DataPacket,
        start: usize,
        count: usize,
        out: &mut SampleBlock,
    ) {
        match self {
            Conversion::Numeric { .. } => {
                let per_sample = packet.descriptor().elements_per_sample();
                let first = start * per_sample;
                for i in first..first + count * per_sample {
                    if let Some(raw) = packet.element_at(i) {
                        out.push_scalar(self.scale(raw));
                    }
                }
            }
            Conversion::Range | Conversion::Raw { .. } => {
                for i in start..start + count {
                    if let Some(bytes) = packet.sample_bytes(i) {
                        out.push_raw(bytes);
                    }
                }
            }
        }
    }
}

/// Where the domain values of a value packet come from
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DomainSource {
    /// Elements of the linked domain packet
    Linked,
    /// Evaluated from the domain descriptor's rule at the value packet's offset
    Rule,
}

/// Decide how to obtain domain values for `packet`
pub(crate) fn domain_source(
    packet: &DataPacket,
    domain: Option<&DataDescriptor>,
) -> Result<DomainSource, String> {
    if packet.domain_packet().is_some() {
        return Ok(DomainSource::Linked);
    }
    match domain {
        Some(d) if d.is_rule_based() => Ok(DomainSource::Rule),
        Some(_) => Err("explicit domain without a linked domain packet".to_string()),
        None => Err("no domain descriptor and no linked domain packet".to_string()),
    }
}

/// Domain value of sample `index` of `packet`, before any consumer cast
pub(crate) fn domain_value(
    packet: &DataPacket,
    domain: Option<&DataDescriptor>,
    index: usize,
) -> Option<Scalar> {
    if let Some(linked) = packet.domain_packet() {
        let raw = linked.element_at(index)?;
        return Some(match linked.descriptor().post_scaling() {
            Some(scaling) => scaling.apply(raw),
            None => raw,
        });
    }
    let domain = domain?;
    let raw = domain
        .rule()
        .evaluate(packet.offset(), index as i64, domain.raw_sample_type())?;
    Some(match domain.post_scaling() {
        Some(scaling) => scaling.apply(raw),
        None => raw,
    })
}

/// Append domain values of samples `start..start + count`
pub(crate) fn append_domain(
    packet: &DataPacket,
    domain: Option<&DataDescriptor>,
    start: usize,
    count: usize,
    out: &mut SampleBlock,
) {
    for i in start..start + count {
        if let Some(v) = domain_value(packet, domain, i) {
            out.push_scalar(v);
        }
    }
}
