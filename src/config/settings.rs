//! Settings for connections, readers and the synthetic generator
//!
//! These are plain serde structs. They are embedded in
//! [`DataPathConfig`](super::DataPathConfig) and can also be built in code and
//! passed to the constructors directly.
//!
//! # Main Types
//!
//! - [`ConnectionSettings`] - Queue bound and overflow behavior, fixed at connect time
//! - [`ReaderSettings`] - Stream reader conversion, event and timeout policy
//! - [`MultiReaderSettings`] - Multi reader policy including sample-rate requirements
//! - [`GeneratorConfig`] - Synthetic producer parameters

use crate::types::SampleType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a connection does with a data packet that would exceed its high-water mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverflowPolicy {
    /// Discard the incoming packet
    DropNewest,
    /// Discard the oldest queued data packet
    #[default]
    DropOldest,
    /// Make the producer wait; the signal must opt in
    Block,
}

/// Per-connection queue settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Maximum queued data packets, `None` for unbounded
    pub high_water_mark: Option<usize>,

    pub overflow_policy: OverflowPolicy,

    /// Insert `DROPPED_SAMPLES` events where packets were discarded
    pub emit_drop_events: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            high_water_mark: None,
            overflow_policy: OverflowPolicy::default(),
            emit_drop_events: true,
        }
    }
}

impl ConnectionSettings {
    /// Bounded queue with the given policy
    pub fn bounded(high_water_mark: usize, overflow_policy: OverflowPolicy) -> Self {
        Self {
            high_water_mark: Some(high_water_mark.max(1)),
            overflow_policy,
            emit_drop_events: true,
        }
    }
}

/// How a read with a positive timeout decides it is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReadTimeoutMode {
    /// Return partial data when the budget elapses
    #[default]
    Any,
    /// Return nothing unless all requested samples arrive in time
    All,
}

/// Stream reader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Consumer value type; `Undefined` matches the producer
    pub value_type: SampleType,

    /// Consumer domain type; `Undefined` matches the producer
    pub domain_type: SampleType,

    /// Consume compatible descriptor changes and other events silently
    pub skip_events: bool,

    /// Default read timeout in milliseconds
    pub timeout_ms: u64,

    pub timeout_mode: ReadTimeoutMode,

    /// Settings for the reader's internal connection
    pub connection: ConnectionSettings,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            value_type: SampleType::Undefined,
            domain_type: SampleType::Undefined,
            skip_events: true,
            timeout_ms: 0,
            timeout_mode: ReadTimeoutMode::Any,
            connection: ConnectionSettings::default(),
        }
    }
}

impl ReaderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value_type(mut self, ty: SampleType) -> Self {
        self.value_type = ty;
        self
    }

    pub fn domain_type(mut self, ty: SampleType) -> Self {
        self.domain_type = ty;
        self
    }

    pub fn skip_events(mut self, skip: bool) -> Self {
        self.skip_events = skip;
        self
    }

    pub fn timeout(mut self, timeout_ms: u64, mode: ReadTimeoutMode) -> Self {
        self.timeout_ms = timeout_ms;
        self.timeout_mode = mode;
        self
    }

    pub fn connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Whether a multi reader accepts signals with different sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RequiredCommonSampleRate {
    /// Deliver at the coarsest rate, finer signals contribute several samples per frame
    #[default]
    Any,
    /// Reject signals whose rates differ
    AllEqual,
}

/// Multi reader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiReaderSettings {
    pub value_type: SampleType,
    pub domain_type: SampleType,
    pub skip_events: bool,
    pub timeout_ms: u64,
    pub timeout_mode: ReadTimeoutMode,
    pub required_common_sample_rate: RequiredCommonSampleRate,
    pub connection: ConnectionSettings,
}

impl Default for MultiReaderSettings {
    fn default() -> Self {
        Self {
            value_type: SampleType::Undefined,
            domain_type: SampleType::Undefined,
            skip_events: true,
            timeout_ms: 0,
            timeout_mode: ReadTimeoutMode::Any,
            required_common_sample_rate: RequiredCommonSampleRate::Any,
            connection: ConnectionSettings::default(),
        }
    }
}

impl MultiReaderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value_type(mut self, ty: SampleType) -> Self {
        self.value_type = ty;
        self
    }

    pub fn domain_type(mut self, ty: SampleType) -> Self {
        self.domain_type = ty;
        self
    }

    pub fn skip_events(mut self, skip: bool) -> Self {
        self.skip_events = skip;
        self
    }

    pub fn timeout(mut self, timeout_ms: u64, mode: ReadTimeoutMode) -> Self {
        self.timeout_ms = timeout_ms;
        self.timeout_mode = mode;
        self
    }

    pub fn required_common_sample_rate(mut self, rate: RequiredCommonSampleRate) -> Self {
        self.required_common_sample_rate = rate;
        self
    }

    /// Per-signal reader settings sharing this policy
    pub(crate) fn channel_settings(&self) -> ReaderSettings {
        ReaderSettings {
            value_type: self.value_type,
            domain_type: self.domain_type,
            skip_events: self.skip_events,
            timeout_ms: self.timeout_ms,
            timeout_mode: self.timeout_mode,
            connection: self.connection,
        }
    }
}

/// Waveform produced by the synthetic generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Waveform {
    /// Float64 sine
    #[default]
    Sine,
    /// Int32 counter with linear post-scaling to Float64
    ScaledCounter,
    /// Float64 constant-rule packets
    Constant,
}

/// Synthetic generator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Global id of the value signal; the domain signal appends `/time`
    pub signal_id: String,
    pub waveform: Waveform,
    pub sample_rate_hz: u32,
    pub samples_per_packet: usize,
    pub amplitude: f64,
    pub frequency_hz: f64,
    /// Scale applied by `ScaledCounter` post-scaling
    pub scale: f64,
    /// Domain origin, ISO-8601
    pub origin: String,
    /// Tick offset of the first generated sample
    pub start_tick: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            signal_id: "/generator/ai0".to_string(),
            waveform: Waveform::Sine,
            sample_rate_hz: super::DEFAULT_SAMPLE_RATE_HZ,
            samples_per_packet: super::DEFAULT_SAMPLES_PER_PACKET,
            amplitude: 1.0,
            frequency_hz: 10.0,
            scale: 0.1,
            origin: crate::descriptor::UNIX_EPOCH_ORIGIN.to_string(),
            start_tick: 0,
        }
    }
}
