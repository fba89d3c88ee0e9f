//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use signalpath_rs::{DataPacket, Signal};
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Send `values` as one Float64 packet starting at `offset`
pub fn send_f64(signal: &Signal, offset: i64, values: &[f64]) {
    let descriptor = signal.descriptor().expect("signal has a descriptor");
    let packet = DataPacket::from_samples(descriptor, offset, values).expect("valid packet");
    signal.send_packet(packet).expect("send succeeds");
}

/// Send `count` Float64 samples whose values equal their sample index
pub fn send_ramp(signal: &Signal, offset: i64, count: usize) {
    let values: Vec<f64> = (0..count).map(|i| (offset + i as i64) as f64).collect();
    send_f64(signal, offset, &values);
}
