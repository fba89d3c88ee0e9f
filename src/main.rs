//! signalpath demo - runs a synthetic generator and reads it back
//!
//! Usage: `signalpath [config.toml]`

use anyhow::Context;
use signalpath_rs::{
    config::DataPathConfig,
    reader::{ReadStatus, TimeReader},
    SignalGenerator, StreamReader,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Packets generated before the demo stops
const DEMO_PACKETS: u64 = 10;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => DataPathConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => DataPathConfig::default(),
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting signal path demo");
    config.validate()?;

    let generator = SignalGenerator::new(config.generator.clone())?;
    if let Some(descriptor) = generator.value_signal().descriptor() {
        tracing::debug!(
            descriptor = %serde_json::to_string(&*descriptor)?,
            "Value descriptor"
        );
    }
    let mut timed = TimeReader::for_signal(generator.value_signal(), config.reader)?;
    let mut plain = StreamReader::new(generator.value_signal(), config.reader)?;

    let handle = generator.spawn()?;
    handle.start()?;

    let packet_size = config.generator.samples_per_packet;
    let mut total = 0usize;
    let mut received = 0u64;
    while received < DEMO_PACKETS {
        let result = timed.read_timeout(packet_size, 1000)?;
        match result.status {
            ReadStatus::Ok | ReadStatus::Event => {}
            ReadStatus::Timeout => {
                tracing::warn!("No data within one second");
                break;
            }
            other => {
                tracing::warn!("Read stopped: {:?}", other);
                break;
            }
        }
        if let (Some(first), Some(last)) = (result.timestamps.first(), result.timestamps.last()) {
            tracing::info!(
                samples = result.sample_count,
                first = %first.to_rfc3339(),
                last = %last.to_rfc3339(),
                "Timed read"
            );
        }
        total += result.sample_count;
        if result.sample_count > 0 {
            received += 1;
        }
    }

    handle.stop()?;
    std::thread::sleep(Duration::from_millis(10));
    let drained = plain.available_count();
    let values = plain.read(drained);
    let mean = {
        let v = values.values.to_f64_vec();
        if v.is_empty() {
            0.0
        } else {
            v.iter().sum::<f64>() / v.len() as f64
        }
    };

    tracing::info!(
        timed_samples = total,
        drained_samples = values.sample_count,
        mean,
        dropped = plain.dropped_samples(),
        "Shutting down..."
    );
    handle.shutdown();
    Ok(())
}
