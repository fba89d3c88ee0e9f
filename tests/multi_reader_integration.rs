//! Integration tests for time-aligned reading of several signals

mod common;

use chrono::{TimeZone, Utc};
use common::builders::{descriptor, SignalBuilder};
use common::send_ramp;
use signalpath_rs::reader::MultiTimedReadResult;
use signalpath_rs::{
    DataPacket, DataPathError, MultiReader, MultiReaderSettings, ReadStatus, ReadTimeoutMode,
    RequiredCommonSampleRate, SampleType, SignalRegistry, TimeReader,
};
use std::thread;
use std::time::Duration;

#[test]
fn test_drop_to_align() {
    let (a, _ta) = SignalBuilder::new("A").origin("2024-03-01T12:00:00Z").build();
    let (b, _tb) = SignalBuilder::new("B").origin("2024-03-01T12:00:00.003Z").build();
    let mut reader = MultiReader::new(&[a.clone(), b.clone()], MultiReaderSettings::default()).unwrap();

    send_ramp(&a, 0, 20);
    send_ramp(&b, 0, 20);

    let result = reader.read(10);
    assert_eq!(result.status, ReadStatus::Ok);
    assert_eq!(result.len(), 10);
    assert_eq!(reader.discarded(0), 3);
    assert_eq!(reader.discarded(1), 0);
    assert_eq!(result.values[0].as_slice::<f64>().unwrap()[..3], [3.0, 4.0, 5.0]);
    assert_eq!(result.values[1].as_slice::<f64>().unwrap()[..3], [0.0, 1.0, 2.0]);
}

#[test]
fn test_aligned_timestamps_are_equal() {
    let (a, _ta) = SignalBuilder::new("A").origin("2024-03-01T12:00:00Z").build();
    let (b, _tb) = SignalBuilder::new("B").origin("2024-03-01T12:00:00.003Z").build();
    let multi = MultiReader::new(&[a.clone(), b.clone()], MultiReaderSettings::default()).unwrap();
    let mut reader = TimeReader::<MultiReader>::new(multi);

    send_ramp(&a, 0, 20);
    send_ramp(&b, 0, 20);

    let MultiTimedReadResult { timestamps, frames, .. } = reader.read(10).unwrap();
    assert_eq!(frames, 10);
    assert_eq!(timestamps[0], timestamps[1]);
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(3);
    assert_eq!(timestamps[0][0], start);
    assert_eq!(timestamps[0][9], start + chrono::Duration::milliseconds(9));
}

#[test]
fn test_offsets_align_within_one_timeline() {
    let (a, _ta) = SignalBuilder::new("A").build();
    let (b, _tb) = SignalBuilder::new("B").build();
    let mut reader = MultiReader::new(&[a.clone(), b.clone()], MultiReaderSettings::default()).unwrap();
    send_ramp(&a, 100, 10);
    send_ramp(&b, 104, 10);

    assert_eq!(reader.available_count(), 6);
    let result = reader.read(6);
    assert_eq!(result.domain[0].as_slice::<i64>().unwrap()[0], 104);
    assert_eq!(result.domain[1].as_slice::<i64>().unwrap()[0], 104);
}

#[test]
fn test_not_synchronized_signals() {
    let (relative, _t) = SignalBuilder::new("rel").relative().build();
    let (absolute, _u) = SignalBuilder::new("abs").build();
    let err = MultiReader::new(&[relative, absolute], MultiReaderSettings::default()).unwrap_err();
    assert!(matches!(err, DataPathError::NotSynchronized(_)));

    let (fast, _f) = SignalBuilder::new("fast").rate(2000).build();
    let (slow, _s) = SignalBuilder::new("slow").rate(1000).build();
    let settings = MultiReaderSettings::new().required_common_sample_rate(RequiredCommonSampleRate::AllEqual);
    assert!(MultiReader::new(&[fast, slow], settings).is_err());
}

#[test]
fn test_multi_rate_frames() {
    let (fast, _f) = SignalBuilder::new("fast").rate(3000).build();
    let (slow, _s) = SignalBuilder::new("slow").rate(1000).build();
    let mut reader = MultiReader::new(&[fast.clone(), slow.clone()], MultiReaderSettings::default()).unwrap();
    assert_eq!(reader.samples_per_frame(0), 3);
    assert_eq!(reader.samples_per_frame(1), 1);

    send_ramp(&fast, 0, 30);
    send_ramp(&slow, 0, 10);
    let result = reader.read(10);
    assert_eq!(result.len(), 10);
    assert_eq!(result.values[0].len(), 30);
    assert_eq!(result.values[1].len(), 10);
}

#[test]
fn test_multi_rate_offset_origins_share_first_instant() {
    let (fast, _f) = SignalBuilder::new("fast").rate(1000).origin("2024-03-01T12:00:00.001Z").build();
    let (slow, _s) = SignalBuilder::new("slow").rate(500).origin("2024-03-01T12:00:00Z").build();
    let multi = MultiReader::new(&[fast.clone(), slow.clone()], MultiReaderSettings::default()).unwrap();
    let mut reader = TimeReader::<MultiReader>::new(multi);

    send_ramp(&fast, 0, 40);
    send_ramp(&slow, 0, 20);

    let result = reader.read(5).unwrap();
    assert_eq!(result.status, ReadStatus::Ok);
    assert_eq!(result.frames, 5);
    assert_eq!(result.timestamps[0].len(), 10);
    assert_eq!(result.timestamps[1].len(), 5);
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(2);
    assert_eq!(result.timestamps[0][0], start);
    assert_eq!(result.timestamps[1][0], start);
    // every slow sample lines up with every second fast sample
    for (i, slow_ts) in result.timestamps[1].iter().enumerate() {
        assert_eq!(result.timestamps[0][2 * i], *slow_ts);
    }
}

#[test]
fn test_multi_reader_conserves_samples() {
    let (fast, _f) = SignalBuilder::new("fast").rate(1000).origin("2024-03-01T12:00:00.001Z").build();
    let (slow, _s) = SignalBuilder::new("slow").rate(500).origin("2024-03-01T12:00:00Z").build();
    let mut reader = MultiReader::new(&[fast.clone(), slow.clone()], MultiReaderSettings::default()).unwrap();
    let sent = [41usize, 21];
    send_ramp(&fast, 0, sent[0]);
    send_ramp(&slow, 0, sent[1]);

    let mut delivered = [0usize; 2];
    let mut frames = 0;
    loop {
        let result = reader.read(7);
        if result.is_empty() {
            break;
        }
        assert_eq!(result.status, ReadStatus::Ok);
        frames += result.frames;
        for (total, block) in delivered.iter_mut().zip(&result.values) {
            *total += block.len();
        }
    }

    assert_eq!(frames, 20);
    for i in 0..2 {
        assert_eq!(delivered[i] + reader.discarded(i) as usize, sent[i]);
        assert_eq!(delivered[i], frames * reader.samples_per_frame(i));
    }
}

#[test]
fn test_from_registry() {
    let registry = SignalRegistry::new();
    let (a, ta) = SignalBuilder::new("/dev/a").build();
    let (b, tb) = SignalBuilder::new("/dev/b").build();
    for s in [a, ta, b, tb] {
        registry.register(s);
    }
    let reader = MultiReader::from_registry(&registry, &["/dev/a", "/dev/b"], MultiReaderSettings::default()).unwrap();
    assert_eq!(reader.signal_count(), 2);
    assert!(matches!(
        MultiReader::from_registry(&registry, &["/dev/a", "/dev/c"], MultiReaderSettings::default()),
        Err(DataPathError::NotFound(_))
    ));
}

#[test]
fn test_realigns_after_descriptor_change() {
    let (a, _ta) = SignalBuilder::new("A").build();
    let (b, _tb) = SignalBuilder::new("B").build();
    let mut reader = MultiReader::new(&[a.clone(), b.clone()], MultiReaderSettings::default()).unwrap();
    send_ramp(&a, 0, 5);
    send_ramp(&b, 0, 10);

    let int = descriptor(SampleType::Int32);
    a.set_descriptor(int.clone()).unwrap();
    a.send_packet(DataPacket::from_samples(int, 7, &[7i32, 8, 9]).unwrap())
        .unwrap();

    let first = reader.read(10);
    assert_eq!(first.status, ReadStatus::Event);
    assert_eq!(first.len(), 5);
    assert_eq!(first.event.as_ref().map(|(i, _)| *i), Some(0));

    let second = reader.read(10);
    assert_eq!(second.status, ReadStatus::Ok);
    assert_eq!(second.len(), 3);
    assert_eq!(reader.discarded(1), 2);
    assert_eq!(second.values[0].as_slice::<i32>(), Some(&[7, 8, 9][..]));
    assert_eq!(second.values[1].as_slice::<f64>(), Some(&[7.0, 8.0, 9.0][..]));
}

#[test]
fn test_waits_for_slowest_signal() {
    let (a, _ta) = SignalBuilder::new("A").build();
    let (b, _tb) = SignalBuilder::new("B").build();
    let settings = MultiReaderSettings::new().timeout(2000, ReadTimeoutMode::All);
    let mut reader = MultiReader::new(&[a.clone(), b.clone()], settings).unwrap();
    send_ramp(&a, 0, 40);

    let producer = {
        let b = b.clone();
        thread::spawn(move || {
            for i in 0..4 {
                thread::sleep(Duration::from_millis(5));
                send_ramp(&b, i * 10, 10);
            }
        })
    };
    let result = reader.read(40);
    producer.join().unwrap();
    assert_eq!(result.status, ReadStatus::Ok);
    assert_eq!(result.len(), 40);
}

#[test]
fn test_timeout_any_returns_partial() {
    let (a, _ta) = SignalBuilder::new("A").build();
    let (b, _tb) = SignalBuilder::new("B").build();
    let settings = MultiReaderSettings::new().timeout(20, ReadTimeoutMode::Any);
    let mut reader = MultiReader::new(&[a.clone(), b.clone()], settings).unwrap();
    send_ramp(&a, 0, 10);
    send_ramp(&b, 0, 4);

    let result = reader.read(10);
    assert_eq!(result.status, ReadStatus::Timeout);
    assert_eq!(result.len(), 4);
}
