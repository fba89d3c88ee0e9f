//! Test data builders for creating signals and descriptors

use signalpath_rs::descriptor::UNIX_EPOCH_ORIGIN;
use signalpath_rs::{DataDescriptor, DataRule, PostScaling, Ratio, SampleType, Scalar, Signal};
use std::sync::Arc;

/// Plain descriptor of `sample_type`
pub fn descriptor(sample_type: SampleType) -> Arc<DataDescriptor> {
    DataDescriptor::builder()
        .sample_type(sample_type)
        .build_shared()
        .unwrap()
}

/// Float64 values stored as Int32 and scaled by `scale`
pub fn scaled_descriptor(scale: f64, offset: f64) -> Arc<DataDescriptor> {
    DataDescriptor::builder()
        .sample_type(SampleType::Float64)
        .post_scaling(PostScaling::linear(
            scale,
            offset,
            SampleType::Int32,
            SampleType::Float64,
        ))
        .build_shared()
        .unwrap()
}

/// Builder for a value signal with a linear time domain
pub struct SignalBuilder {
    id: String,
    sample_type: SampleType,
    rate_hz: i64,
    origin: Option<String>,
}

impl SignalBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            sample_type: SampleType::Float64,
            rate_hz: 1000,
            origin: Some(UNIX_EPOCH_ORIGIN.to_string()),
        }
    }

    pub fn sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    pub fn rate(mut self, rate_hz: i64) -> Self {
        self.rate_hz = rate_hz;
        self
    }

    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    /// Relative time: no origin on the domain
    pub fn relative(mut self) -> Self {
        self.origin = None;
        self
    }

    pub fn domain_descriptor(&self) -> Arc<DataDescriptor> {
        let mut builder = DataDescriptor::builder()
            .sample_type(SampleType::Int64)
            .rule(DataRule::Linear {
                delta: Scalar::Int(1),
                start: Scalar::Int(0),
            })
            .tick_resolution(Ratio::per(self.rate_hz).unwrap());
        if let Some(origin) = &self.origin {
            builder = builder.origin(origin.clone());
        }
        builder.build_shared().unwrap()
    }

    /// Returns (value signal, domain signal); keep the domain alive
    pub fn build(self) -> (Signal, Signal) {
        let domain = Signal::with_descriptor(format!("{}/time", self.id), self.domain_descriptor());
        let signal = Signal::with_descriptor(self.id.clone(), descriptor(self.sample_type));
        signal.set_domain_signal(Some(&domain)).unwrap();
        (signal, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_builder() {
        let (signal, domain) = SignalBuilder::new("ai0").rate(500).build();
        assert_eq!(domain.id(), "ai0/time");
        let d = signal.domain_descriptor().unwrap();
        assert_eq!(d.tick_resolution(), Ratio::per(500));
        assert!(d.has_absolute_time());
    }
}
