//! Validating builder for [`DataDescriptor`].

use super::{parse_origin, DataDescriptor, DataRule, Dimension, PostScaling};
use crate::error::{DataPathError, Result};
use crate::types::{Ratio, SampleType, Unit};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builder for [`DataDescriptor`]
///
/// `build()` enforces the layout rules; a descriptor that exists is valid.
#[derive(Debug, Clone, Default)]
pub struct DataDescriptorBuilder {
    name: String,
    sample_type: SampleType,
    dimensions: Vec<Dimension>,
    rule: DataRule,
    post_scaling: Option<PostScaling>,
    unit: Unit,
    origin: String,
    tick_resolution: Option<Ratio>,
    value_range: Option<(f64, f64)>,
    struct_fields: Vec<DataDescriptor>,
    metadata: BTreeMap<String, String>,
}

impl DataDescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing descriptor
    pub fn from_descriptor(descriptor: &DataDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            sample_type: descriptor.sample_type,
            dimensions: descriptor.dimensions.clone(),
            rule: descriptor.rule,
            post_scaling: descriptor.post_scaling,
            unit: descriptor.unit.clone(),
            origin: descriptor.origin.clone(),
            tick_resolution: descriptor.tick_resolution,
            value_range: descriptor.value_range,
            struct_fields: descriptor.struct_fields.clone(),
            metadata: descriptor.metadata.clone(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    pub fn dimensions(mut self, dimensions: Vec<Dimension>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn rule(mut self, rule: DataRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn post_scaling(mut self, post_scaling: PostScaling) -> Self {
        self.post_scaling = Some(post_scaling);
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn tick_resolution(mut self, resolution: Ratio) -> Self {
        self.tick_resolution = Some(resolution);
        self
    }

    pub fn value_range(mut self, low: f64, high: f64) -> Self {
        self.value_range = Some((low, high));
        self
    }

    pub fn struct_fields(mut self, fields: Vec<DataDescriptor>) -> Self {
        self.struct_fields = fields;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<DataDescriptor> {
        let invalid = |msg: String| Err(DataPathError::InvalidDescriptor(msg));

        if self.sample_type == SampleType::Undefined {
            return invalid("sample type is not set".to_string());
        }

        if !self.rule.is_explicit() {
            if !self.sample_type.is_numeric() {
                return invalid(format!(
                    "rule-based descriptors need a numeric sample type, got {}",
                    self.sample_type
                ));
            }
            if !self.dimensions.is_empty() {
                return invalid("rule-based descriptors cannot have dimensions".to_string());
            }
        }

        if let Some(scaling) = &self.post_scaling {
            if !scaling.input_type().is_numeric() {
                return invalid(format!(
                    "post-scaling input type {} is not numeric",
                    scaling.input_type()
                ));
            }
            if scaling.output_type() != self.sample_type {
                return invalid(format!(
                    "post-scaling output type {} does not match sample type {}",
                    scaling.output_type(),
                    self.sample_type
                ));
            }
        }

        if !self.origin.is_empty() {
            let Some(resolution) = self.tick_resolution else {
                return invalid("origin requires a tick resolution".to_string());
            };
            if resolution.num() <= 0 {
                return invalid(format!("tick resolution {} must be positive", resolution));
            }
            if parse_origin(&self.origin).is_none() {
                return invalid(format!("origin '{}' is not an ISO-8601 time", self.origin));
            }
        }

        match (self.sample_type, self.struct_fields.is_empty()) {
            (SampleType::Struct, true) => {
                return invalid("struct descriptors need at least one field".to_string())
            }
            (SampleType::Struct, false) => {}
            (_, false) => return invalid("only struct descriptors have fields".to_string()),
            (_, true) => {}
        }

        if let Some(dim) = self.dimensions.iter().find(|d| d.size == 0) {
            return invalid(format!("dimension '{}' has size 0", dim.name));
        }

        Ok(DataDescriptor {
            name: self.name,
            sample_type: self.sample_type,
            dimensions: self.dimensions,
            rule: self.rule,
            post_scaling: self.post_scaling,
            unit: self.unit,
            origin: self.origin,
            tick_resolution: self.tick_resolution,
            value_range: self.value_range,
            struct_fields: self.struct_fields,
            metadata: self.metadata,
        })
    }

    /// Validate, build and wrap for sharing
    pub fn build_shared(self) -> Result<Arc<DataDescriptor>> {
        self.build().map(Arc::new)
    }
}
