//! Benchmarks for the packet path and readers
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use signalpath_rs::{
    DataDescriptor, DataPacket, DataRule, MultiReader, MultiReaderSettings, PostScaling, Ratio,
    ReaderSettings, SampleType, Scalar, Signal, StreamReader,
};
use std::sync::Arc;

const PACKETS: usize = 16;

fn float_descriptor() -> Arc<DataDescriptor> {
    DataDescriptor::builder()
        .sample_type(SampleType::Float64)
        .build_shared()
        .unwrap()
}

fn scaled_descriptor() -> Arc<DataDescriptor> {
    DataDescriptor::builder()
        .sample_type(SampleType::Float64)
        .post_scaling(PostScaling::linear(0.1, 0.0, SampleType::Int32, SampleType::Float64))
        .build_shared()
        .unwrap()
}

fn time_signal(id: &str) -> Signal {
    let descriptor = DataDescriptor::builder()
        .sample_type(SampleType::Int64)
        .rule(DataRule::Linear {
            delta: Scalar::Int(1),
            start: Scalar::Int(0),
        })
        .tick_resolution(Ratio::per(1000).unwrap())
        .origin("1970-01-01T00:00:00Z")
        .build_shared()
        .unwrap();
    Signal::with_descriptor(format!("{}/time", id), descriptor)
}

fn bench_stream_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_read");

    for size in [64usize, 1024, 16384].iter() {
        group.throughput(Throughput::Elements((*size * PACKETS) as u64));

        let float = float_descriptor();
        let values: Vec<f64> = (0..*size).map(|i| i as f64).collect();
        let packet = DataPacket::from_samples(float.clone(), 0, &values).unwrap().into_packet();
        group.bench_with_input(BenchmarkId::new("float64", size), size, |b, &size| {
            let signal = Signal::with_descriptor("bench", float.clone());
            let mut reader = StreamReader::new(&signal, ReaderSettings::default()).unwrap();
            b.iter(|| {
                for _ in 0..PACKETS {
                    signal.send_packet(packet.clone()).unwrap();
                }
                black_box(reader.read(size * PACKETS))
            });
        });

        let scaled = scaled_descriptor();
        let raw: Vec<i32> = (0..*size as i32).collect();
        let packet = DataPacket::from_samples(scaled.clone(), 0, &raw).unwrap().into_packet();
        group.bench_with_input(BenchmarkId::new("scaled_int32", size), size, |b, &size| {
            let signal = Signal::with_descriptor("bench", scaled.clone());
            let mut reader = StreamReader::new(&signal, ReaderSettings::default()).unwrap();
            b.iter(|| {
                for _ in 0..PACKETS {
                    signal.send_packet(packet.clone()).unwrap();
                }
                black_box(reader.read(size * PACKETS))
            });
        });
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    let float = float_descriptor();
    let packet = DataPacket::from_samples(float.clone(), 0, &[0.0f64; 256])
        .unwrap()
        .into_packet();

    for readers in [1usize, 4, 16].iter() {
        group.throughput(Throughput::Elements(*readers as u64));
        group.bench_with_input(BenchmarkId::new("send", readers), readers, |b, &readers| {
            let signal = Signal::with_descriptor("bench", float.clone());
            let mut ports: Vec<StreamReader> = (0..readers)
                .map(|_| StreamReader::new(&signal, ReaderSettings::default()).unwrap())
                .collect();
            b.iter(|| {
                signal.send_packet(packet.clone()).unwrap();
                for reader in ports.iter_mut() {
                    black_box(reader.read(256));
                }
            });
        });
    }

    group.finish();
}

fn bench_multi_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_read");
    let float = float_descriptor();
    let size = 1024usize;
    group.throughput(Throughput::Elements(size as u64));

    group.bench_function("two_signals_aligned", |b| {
        let domains = [time_signal("a"), time_signal("b")];
        let signals: Vec<Signal> = ["a", "b"]
            .iter()
            .zip(&domains)
            .map(|(id, domain)| {
                let s = Signal::with_descriptor(*id, float.clone());
                s.set_domain_signal(Some(domain)).unwrap();
                s
            })
            .collect();
        let mut reader = MultiReader::new(&signals, MultiReaderSettings::default()).unwrap();
        let values = vec![1.0f64; size];
        let mut offset = 0i64;
        b.iter(|| {
            for s in &signals {
                s.send_packet(DataPacket::from_samples(float.clone(), offset, &values).unwrap())
                    .unwrap();
            }
            offset += size as i64;
            black_box(reader.read(size))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_stream_read, bench_fan_out, bench_multi_read);
criterion_main!(benches);
