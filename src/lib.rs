//! # signalpath-rs: in-process signal data path
//!
//! Producers push packets into signals, signals fan them out to connected
//! input ports, and readers turn the packet streams into typed sample blocks.
//!
//! ## Architecture
//!
//! - **Descriptors**: immutable [`DataDescriptor`]s describe sample type, rule,
//!   post-scaling, unit and time base; they change only in-band
//! - **Packets**: data and event packets shared by `Arc`, so fan-out is a
//!   pointer copy
//! - **Signals**: named endpoints with an optional domain (time) signal
//! - **Connections**: one FIFO per (signal, port) pair with configurable
//!   backpressure
//! - **Readers**: [`StreamReader`] for one signal, [`MultiReader`] for several
//!   signals aligned on absolute time, [`TimeReader`] for timestamps
//!
//! ## Example
//!
//! ```ignore
//! use signalpath_rs::{DataDescriptor, DataPacket, ReaderSettings, SampleType, Signal, StreamReader};
//!
//! let descriptor = DataDescriptor::builder()
//!     .sample_type(SampleType::Float64)
//!     .build_shared()?;
//! let signal = Signal::with_descriptor("/device/ai0", descriptor.clone());
//! let mut reader = StreamReader::new(&signal, ReaderSettings::default())?;
//!
//! signal.send_packet(DataPacket::from_samples(descriptor, 0, &[1.0f64, 2.0, 3.0])?)?;
//! let result = reader.read(3);
//! assert_eq!(result.values.as_slice::<f64>(), Some(&[1.0, 2.0, 3.0][..]));
//! ```

pub mod config;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod generator;
pub mod input_port;
pub mod packet;
pub mod reader;
pub mod signal;
pub mod types;

// Re-export commonly used types
pub use config::{
    ConnectionSettings, DataPathConfig, MultiReaderSettings, OverflowPolicy, ReadTimeoutMode,
    ReaderSettings, RequiredCommonSampleRate,
};
pub use connection::Connection;
pub use descriptor::{DataDescriptor, DataRule, Dimension, PostScaling};
pub use error::{DataPathError, Result};
pub use generator::{GeneratorHandle, SignalGenerator};
pub use input_port::InputPort;
pub use packet::{DataPacket, EventPacket, Packet};
pub use reader::{MultiReader, ReadResult, ReadStatus, StreamReader, TimeReader};
pub use signal::{Signal, SignalRegistry};
pub use types::{Ratio, SampleBlock, SampleType, Scalar, Unit};
