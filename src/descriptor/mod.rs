//! Data descriptors
//!
//! A [`DataDescriptor`] states how the samples of a packet are laid out and
//! what they mean: element type, dimensions, rule, post-scaling, unit and, for
//! domain signals, origin and tick resolution. Descriptors are built once by
//! [`DataDescriptorBuilder`] and shared as `Arc<DataDescriptor>`; a change is
//! announced by emitting a new descriptor, never by mutating an old one.

mod builder;

pub use builder::DataDescriptorBuilder;

use crate::types::{Ratio, SampleType, Scalar, Unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Origin used by domain signals that count from the Unix epoch
pub const UNIX_EPOCH_ORIGIN: &str = "1970-01-01T00:00:00Z";

/// How sample values are obtained for a packet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum DataRule {
    /// Values are stored in the packet buffer
    #[default]
    Explicit,
    /// `start + (offset + i) * delta`
    Linear { delta: Scalar, start: Scalar },
    /// Every sample has the same value
    Constant(Scalar),
}

impl DataRule {
    pub fn is_explicit(&self) -> bool {
        matches!(self, DataRule::Explicit)
    }

    /// Value of the `index`-th sample of a packet at `offset`
    ///
    /// `None` for explicit rules, whose values live in the buffer.
    pub fn evaluate(&self, offset: i64, index: i64, ty: SampleType) -> Option<Scalar> {
        match *self {
            DataRule::Explicit => None,
            DataRule::Linear { delta, start } => {
                Some(Scalar::linear(start, delta, offset.wrapping_add(index), ty))
            }
            DataRule::Constant(value) => Some(value.cast(ty)),
        }
    }
}

/// Affine transform from raw storage values to consumer-visible values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PostScaling {
    Linear {
        scale: f64,
        offset: f64,
        input_type: SampleType,
        output_type: SampleType,
    },
}

impl PostScaling {
    pub fn linear(scale: f64, offset: f64, input_type: SampleType, output_type: SampleType) -> Self {
        PostScaling::Linear {
            scale,
            offset,
            input_type,
            output_type,
        }
    }

    pub fn input_type(&self) -> SampleType {
        match self {
            PostScaling::Linear { input_type, .. } => *input_type,
        }
    }

    pub fn output_type(&self) -> SampleType {
        match self {
            PostScaling::Linear { output_type, .. } => *output_type,
        }
    }

    /// Scale a raw value; the result is cast to the output type
    #[inline]
    pub fn apply(&self, raw: Scalar) -> Scalar {
        match *self {
            PostScaling::Linear {
                scale,
                offset,
                output_type,
                ..
            } => Scalar::Float(raw.as_f64() * scale + offset).cast(output_type),
        }
    }
}

/// Rule describing the labels along one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DimensionRule {
    Linear { delta: f64, start: f64 },
    List(Vec<f64>),
}

/// One axis of a multi-dimensional sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub size: usize,
    pub rule: DimensionRule,
    pub unit: Unit,
}

impl Dimension {
    pub fn linear(name: impl Into<String>, size: usize, start: f64, delta: f64) -> Self {
        Self {
            name: name.into(),
            size,
            rule: DimensionRule::Linear { delta, start },
            unit: Unit::default(),
        }
    }

    pub fn list(name: impl Into<String>, labels: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            size: labels.len(),
            rule: DimensionRule::List(labels),
            unit: Unit::default(),
        }
    }

    /// Label of the `index`-th element along this dimension
    pub fn label(&self, index: usize) -> Option<f64> {
        if index >= self.size {
            return None;
        }
        match &self.rule {
            DimensionRule::Linear { delta, start } => Some(start + index as f64 * delta),
            DimensionRule::List(labels) => labels.get(index).copied(),
        }
    }
}

/// Immutable description of a signal's sample blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDescriptor {
    pub(crate) name: String,
    pub(crate) sample_type: SampleType,
    pub(crate) dimensions: Vec<Dimension>,
    pub(crate) rule: DataRule,
    pub(crate) post_scaling: Option<PostScaling>,
    pub(crate) unit: Unit,
    pub(crate) origin: String,
    pub(crate) tick_resolution: Option<Ratio>,
    pub(crate) value_range: Option<(f64, f64)>,
    pub(crate) struct_fields: Vec<DataDescriptor>,
    pub(crate) metadata: BTreeMap<String, String>,
}

impl DataDescriptor {
    pub fn builder() -> DataDescriptorBuilder {
        DataDescriptorBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consumer-visible element type (after post-scaling)
    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn rule(&self) -> &DataRule {
        &self.rule
    }

    pub fn post_scaling(&self) -> Option<&PostScaling> {
        self.post_scaling.as_ref()
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// ISO-8601 epoch of the domain, empty when unset
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn tick_resolution(&self) -> Option<Ratio> {
        self.tick_resolution
    }

    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.value_range
    }

    pub fn struct_fields(&self) -> &[DataDescriptor] {
        &self.struct_fields
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Element type stored in packet buffers (before post-scaling)
    pub fn raw_sample_type(&self) -> SampleType {
        self.post_scaling
            .as_ref()
            .map(|s| s.input_type())
            .unwrap_or(self.sample_type)
    }

    /// Size in bytes of one raw element, `None` for variable-size types
    pub fn raw_element_size(&self) -> Option<usize> {
        match self.raw_sample_type() {
            SampleType::Struct => self
                .struct_fields
                .iter()
                .map(|f| f.raw_sample_size())
                .sum(),
            other => other.size_bytes(),
        }
    }

    /// Size in bytes of one raw sample including all dimensions
    pub fn raw_sample_size(&self) -> Option<usize> {
        self.raw_element_size()
            .map(|size| size * self.elements_per_sample())
    }

    /// Product of the dimension sizes, 1 for scalar samples
    pub fn elements_per_sample(&self) -> usize {
        self.dimensions.iter().map(|d| d.size).product()
    }

    /// Linear and constant rules need no buffer
    pub fn is_rule_based(&self) -> bool {
        !self.rule.is_explicit()
    }

    /// Origin and tick resolution are both present
    pub fn has_absolute_time(&self) -> bool {
        !self.origin.is_empty() && self.tick_resolution.is_some()
    }

    /// Parsed origin, `None` when empty or malformed
    pub fn parsed_origin(&self) -> Option<DateTime<Utc>> {
        parse_origin(&self.origin)
    }

    /// Changes the reader can absorb without halting on a value descriptor
    pub fn is_compatible_value(&self, other: &DataDescriptor) -> bool {
        self.sample_type == other.sample_type
            && self.post_scaling == other.post_scaling
            && self.dimensions == other.dimensions
            && self.struct_fields == other.struct_fields
    }

    /// Value compatibility plus an identical time base
    pub fn is_compatible_domain(&self, other: &DataDescriptor) -> bool {
        self.is_compatible_value(other)
            && self.rule == other.rule
            && self.tick_resolution == other.tick_resolution
            && self.origin == other.origin
    }
}

pub(crate) fn parse_origin(origin: &str) -> Option<DateTime<Utc>> {
    if origin.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(origin)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(start: i64) -> DataDescriptor {
        DataDescriptor::builder()
            .sample_type(SampleType::Int64)
            .rule(DataRule::Linear {
                delta: Scalar::Int(1),
                start: Scalar::Int(start),
            })
            .tick_resolution(Ratio::per(1000).unwrap())
            .origin(UNIX_EPOCH_ORIGIN)
            .unit(Unit::seconds())
            .build()
            .unwrap()
    }

    #[test]
    fn test_rule_evaluate() {
        let rule = DataRule::Linear {
            delta: Scalar::Int(2),
            start: Scalar::Int(100),
        };
        assert_eq!(rule.evaluate(10, 3, SampleType::Int64), Some(Scalar::Int(126)));
        let rule = DataRule::Constant(Scalar::Float(1.5));
        assert_eq!(rule.evaluate(10, 3, SampleType::Float64), Some(Scalar::Float(1.5)));
        assert_eq!(DataRule::Explicit.evaluate(0, 0, SampleType::Int8), None);
    }

    #[test]
    fn test_post_scaling_apply() {
        let scaling = PostScaling::linear(0.1, 1.0, SampleType::Int32, SampleType::Float64);
        assert_eq!(scaling.apply(Scalar::Int(10)), Scalar::Float(2.0));
    }

    #[test]
    fn test_raw_sizes() {
        let desc = DataDescriptor::builder()
            .sample_type(SampleType::Float64)
            .post_scaling(PostScaling::linear(
                0.5,
                0.0,
                SampleType::Int16,
                SampleType::Float64,
            ))
            .dimensions(vec![Dimension::linear("bin", 4, 0.0, 1.0)])
            .build()
            .unwrap();
        assert_eq!(desc.raw_sample_type(), SampleType::Int16);
        assert_eq!(desc.elements_per_sample(), 4);
        assert_eq!(desc.raw_sample_size(), Some(8));
    }

    #[test]
    fn test_struct_size_is_sum_of_fields() {
        let field = |ty| DataDescriptor::builder().sample_type(ty).build().unwrap();
        let desc = DataDescriptor::builder()
            .sample_type(SampleType::Struct)
            .struct_fields(vec![field(SampleType::Int32), field(SampleType::Float64)])
            .build()
            .unwrap();
        assert_eq!(desc.raw_sample_size(), Some(12));
    }

    #[test]
    fn test_domain_compatibility() {
        let a = domain(0);
        let mut renamed = a.clone();
        renamed.name = "time".into();
        assert!(a.is_compatible_domain(&renamed));
        assert!(!a.is_compatible_domain(&domain(5)));
        assert!(a.is_compatible_value(&domain(5)));
    }

    #[test]
    fn test_parsed_origin() {
        let d = domain(0);
        assert!(d.has_absolute_time());
        assert_eq!(d.parsed_origin().unwrap().timestamp(), 0);
    }

    #[test]
    fn test_dimension_labels() {
        let dim = Dimension::linear("freq", 3, 10.0, 5.0);
        assert_eq!(dim.label(2), Some(20.0));
        assert_eq!(dim.label(3), None);
        let dim = Dimension::list("ch", vec![1.0, 4.0]);
        assert_eq!(dim.size, 2);
        assert_eq!(dim.label(1), Some(4.0));
    }

    #[test]
    fn test_descriptor_serializes() {
        let json = serde_json::to_string(&domain(0)).unwrap();
        let back: DataDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, domain(0));
    }
}
