//! Synthetic signal producer
//!
//! [`SignalGenerator`] owns a value signal and its time domain signal and
//! produces one packet pair per [`step`](SignalGenerator::step). The value
//! packets link the domain packets, so readers get explicit time without
//! evaluating the domain rule.
//!
//! For free-running production, [`SignalGenerator::spawn`] moves the
//! generator into a worker thread controlled over crossbeam channels:
//!
//! ```ignore
//! let generator = SignalGenerator::new(GeneratorConfig::default())?;
//! let mut reader = StreamReader::new(generator.value_signal(), ReaderSettings::default())?;
//! let handle = generator.spawn()?;
//! handle.start()?;
//! // ... read ...
//! handle.shutdown();
//! ```

use crate::config::{GeneratorConfig, Waveform};
use crate::descriptor::{DataDescriptor, DataRule, PostScaling};
use crate::error::{DataPathError, Result, ResultExt};
use crate::packet::{DataPacket, Packet};
use crate::signal::{Signal, SignalRegistry};
use crate::types::{Ratio, SampleType, Scalar, Unit};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Capacity of the command and message channels
const CHANNEL_CAPACITY: usize = 64;

/// Commands accepted by the generator worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorCommand {
    Start,
    Stop,
    /// Change the number of samples per packet
    SetPacketSize(usize),
    /// Re-announce the current descriptors in-band
    Announce,
    Shutdown,
}

/// Notifications from the generator worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorMessage {
    Started,
    Stopped,
    /// Total packet pairs sent so far
    PacketsSent(u64),
    Error(String),
    Shutdown,
}

fn domain_descriptor(config: &GeneratorConfig) -> Result<Arc<DataDescriptor>> {
    let tick = Ratio::per(config.sample_rate_hz as i64)
        .ok_or_else(|| DataPathError::Config("sample rate must be positive".to_string()))?;
    DataDescriptor::builder()
        .name("time")
        .sample_type(SampleType::Int64)
        .rule(DataRule::Linear {
            delta: Scalar::Int(1),
            start: Scalar::Int(0),
        })
        .tick_resolution(tick)
        .origin(config.origin.clone())
        .unit(Unit::seconds())
        .build_shared()
}

fn value_descriptor(config: &GeneratorConfig) -> Result<Arc<DataDescriptor>> {
    let peak = config.amplitude.abs();
    let builder = DataDescriptor::builder()
        .name(config.signal_id.rsplit('/').next().unwrap_or("value"))
        .sample_type(SampleType::Float64);
    match config.waveform {
        Waveform::Sine => builder.value_range(-peak, peak),
        Waveform::ScaledCounter => builder.post_scaling(PostScaling::linear(
            config.scale,
            0.0,
            SampleType::Int32,
            SampleType::Float64,
        )),
        Waveform::Constant => builder
            .value_range(-peak, peak)
            .rule(DataRule::Constant(Scalar::Float(config.amplitude))),
    }
    .build_shared()
}

/// Produces packets on a value signal and its domain signal
#[derive(Debug)]
pub struct SignalGenerator {
    config: GeneratorConfig,
    value: Signal,
    domain: Signal,
    value_descriptor: Arc<DataDescriptor>,
    domain_descriptor: Arc<DataDescriptor>,
    next_tick: i64,
    packets_sent: u64,
}

impl SignalGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        if config.samples_per_packet == 0 {
            return Err(DataPathError::Config(
                "samples_per_packet must be at least 1".to_string(),
            ));
        }
        let domain_descriptor = domain_descriptor(&config).context("generator domain")?;
        let value_descriptor = value_descriptor(&config).context("generator values")?;

        let domain = Signal::with_descriptor(format!("{}/time", config.signal_id), domain_descriptor.clone());
        let value = Signal::with_descriptor(config.signal_id.clone(), value_descriptor.clone());
        value.set_domain_signal(Some(&domain))?;

        tracing::debug!(
            signal = %config.signal_id,
            waveform = ?config.waveform,
            rate = config.sample_rate_hz,
            "Generator created"
        );
        Ok(Self {
            next_tick: config.start_tick,
            config,
            value,
            domain,
            value_descriptor,
            domain_descriptor,
            packets_sent: 0,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn value_signal(&self) -> &Signal {
        &self.value
    }

    pub fn domain_signal(&self) -> &Signal {
        &self.domain
    }

    /// Tick of the next sample to be produced
    pub fn next_tick(&self) -> i64 {
        self.next_tick
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Register both signals under their ids
    pub fn register(&self, registry: &SignalRegistry) {
        registry.register(self.domain.clone());
        registry.register(self.value.clone());
    }

    pub fn set_packet_size(&mut self, samples: usize) {
        self.config.samples_per_packet = samples.max(1);
    }

    /// Send the current descriptors again
    pub fn announce(&self) -> Result<()> {
        self.domain.set_descriptor(self.domain_descriptor.clone())?;
        self.value.set_descriptor(self.value_descriptor.clone())
    }

    /// Time covered by one packet
    pub fn packet_interval(&self) -> Duration {
        let rate = self.config.sample_rate_hz.max(1) as f64;
        Duration::from_secs_f64(self.config.samples_per_packet as f64 / rate)
    }

    fn samples(&self, offset: i64, count: usize) -> Vec<f64> {
        let rate = self.config.sample_rate_hz.max(1) as f64;
        let omega = 2.0 * std::f64::consts::PI * self.config.frequency_hz;
        (0..count)
            .map(|i| {
                let t = (offset + i as i64) as f64 / rate;
                self.config.amplitude * (omega * t).sin()
            })
            .collect()
    }

    /// Produce one packet on each signal
    pub fn step(&mut self) -> Result<()> {
        let count = self.config.samples_per_packet;
        let offset = self.next_tick;

        let domain_packet = Arc::new(DataPacket::new(self.domain_descriptor.clone(), count, offset)?);
        let mut packet = DataPacket::with_domain(
            domain_packet.clone(),
            self.value_descriptor.clone(),
            count,
            offset,
        )?;
        match self.config.waveform {
            Waveform::Sine => packet.write_samples(&self.samples(offset, count))?,
            Waveform::ScaledCounter => {
                let raw: Vec<i32> = (0..count).map(|i| (offset + i as i64) as i32).collect();
                packet.write_samples(&raw)?;
            }
            Waveform::Constant => {}
        }

        self.domain.send_packet(Packet::Data(domain_packet))?;
        self.value.send_packet(packet)?;
        self.next_tick += count as i64;
        self.packets_sent += 1;
        tracing::trace!(signal = %self.config.signal_id, offset, count, "Generated packet");
        Ok(())
    }

    /// Move the generator into a worker thread
    pub fn spawn(self) -> Result<GeneratorHandle> {
        let (command_tx, command_rx) = bounded(CHANNEL_CAPACITY);
        let (message_tx, message_rx) = bounded(CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let value = self.value.clone();
        let domain = self.domain.clone();

        let mut worker = GeneratorWorker::new(self, command_rx, message_tx, running.clone());
        let thread = std::thread::Builder::new()
            .name("signal-generator".to_string())
            .spawn(move || worker.run())?;

        Ok(GeneratorHandle {
            command_tx,
            message_rx,
            running,
            thread: Some(thread),
            value,
            domain,
        })
    }
}

/// Worker loop driving a [`SignalGenerator`]
struct GeneratorWorker {
    generator: SignalGenerator,
    command_rx: Receiver<GeneratorCommand>,
    message_tx: Sender<GeneratorMessage>,
    running: Arc<AtomicBool>,
    generating: bool,
    last_step_time: Instant,
}

impl GeneratorWorker {
    fn new(
        generator: SignalGenerator,
        command_rx: Receiver<GeneratorCommand>,
        message_tx: Sender<GeneratorMessage>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            generator,
            command_rx,
            message_tx,
            running,
            generating: false,
            last_step_time: Instant::now(),
        }
    }

    fn run(&mut self) {
        tracing::info!(signal = %self.generator.config.signal_id, "Generator worker started");

        while self.running.load(Ordering::SeqCst) {
            self.process_commands();

            if self.generating {
                match self.generator.step() {
                    Ok(()) => self.try_send_message(GeneratorMessage::PacketsSent(
                        self.generator.packets_sent(),
                    )),
                    Err(e) => {
                        tracing::warn!("Generator step failed: {}", e);
                        self.try_send_message(GeneratorMessage::Error(e.to_string()));
                    }
                }
            }

            self.rate_limit();
        }

        let _ = self.message_tx.send(GeneratorMessage::Shutdown);
        tracing::info!("Generator worker stopped");
    }

    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: GeneratorCommand) {
        match cmd {
            GeneratorCommand::Start => {
                if !self.generating {
                    self.generating = true;
                    self.try_send_message(GeneratorMessage::Started);
                }
            }
            GeneratorCommand::Stop => {
                if self.generating {
                    self.generating = false;
                    self.try_send_message(GeneratorMessage::Stopped);
                }
            }
            GeneratorCommand::SetPacketSize(samples) => self.generator.set_packet_size(samples),
            GeneratorCommand::Announce => {
                if let Err(e) = self.generator.announce() {
                    self.try_send_message(GeneratorMessage::Error(e.to_string()));
                }
            }
            GeneratorCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Sleep so packets leave at the rate they cover
    fn rate_limit(&mut self) {
        let interval = if self.generating {
            self.generator.packet_interval()
        } else {
            Duration::from_millis(1)
        };
        let elapsed = self.last_step_time.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
        self.last_step_time = Instant::now();
    }

    fn try_send_message(&self, msg: GeneratorMessage) {
        if self.message_tx.try_send(msg).is_err() {
            tracing::trace!("Generator message channel full");
        }
    }
}

/// Controls a generator running in its worker thread
///
/// Dropping the handle shuts the worker down.
#[derive(Debug)]
pub struct GeneratorHandle {
    command_tx: Sender<GeneratorCommand>,
    message_rx: Receiver<GeneratorMessage>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    value: Signal,
    domain: Signal,
}

impl GeneratorHandle {
    pub fn value_signal(&self) -> &Signal {
        &self.value
    }

    pub fn domain_signal(&self) -> &Signal {
        &self.domain
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn send(&self, cmd: GeneratorCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| DataPathError::Channel(e.to_string()))
    }

    pub fn start(&self) -> Result<()> {
        self.send(GeneratorCommand::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(GeneratorCommand::Stop)
    }

    pub fn set_packet_size(&self, samples: usize) -> Result<()> {
        self.send(GeneratorCommand::SetPacketSize(samples))
    }

    pub fn announce(&self) -> Result<()> {
        self.send(GeneratorCommand::Announce)
    }

    /// Wait for the next message; `None` on timeout or once the worker is gone
    pub fn recv_timeout(&self, timeout: Duration) -> Option<GeneratorMessage> {
        match self.message_rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// All messages currently queued
    pub fn drain(&self) -> Vec<GeneratorMessage> {
        self.message_rx.try_iter().collect()
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let _ = self.command_tx.send(GeneratorCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Generator worker panicked");
            }
        }
    }
}

impl Drop for GeneratorHandle {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderSettings;
    use crate::reader::{ReadStatus, StreamReader};

    fn create_test_worker(
        config: GeneratorConfig,
    ) -> (GeneratorWorker, Receiver<GeneratorMessage>, Sender<GeneratorCommand>) {
        let (cmd_tx, cmd_rx) = bounded(16);
        let (msg_tx, msg_rx) = bounded(16);
        let running = Arc::new(AtomicBool::new(true));
        let generator = SignalGenerator::new(config).unwrap();
        (GeneratorWorker::new(generator, cmd_rx, msg_tx, running), msg_rx, cmd_tx)
    }

    fn config(waveform: Waveform) -> GeneratorConfig {
        GeneratorConfig {
            waveform,
            samples_per_packet: 10,
            amplitude: 2.0,
            frequency_hz: 50.0,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_generator_signals() {
        let generator = SignalGenerator::new(config(Waveform::Sine)).unwrap();
        assert_eq!(generator.value_signal().id(), "/generator/ai0");
        assert_eq!(generator.domain_signal().id(), "/generator/ai0/time");
        assert!(generator
            .value_signal()
            .domain_signal()
            .is_some_and(|d| d.ptr_eq(generator.domain_signal())));
        let registry = SignalRegistry::new();
        generator.register(&registry);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_zero_packet_size_rejected() {
        let cfg = GeneratorConfig {
            samples_per_packet: 0,
            ..GeneratorConfig::default()
        };
        assert!(matches!(SignalGenerator::new(cfg), Err(DataPathError::Config(_))));
    }

    #[test]
    fn test_sine_step_links_domain() {
        let mut generator = SignalGenerator::new(config(Waveform::Sine)).unwrap();
        let mut reader = StreamReader::new(generator.value_signal(), ReaderSettings::default()).unwrap();
        generator.step().unwrap();
        generator.step().unwrap();

        let result = reader.read_with_domain(20);
        assert_eq!(result.status, ReadStatus::Ok);
        assert_eq!(result.len(), 20);
        let ticks = result.domain.unwrap();
        assert_eq!(ticks.as_slice::<i64>().unwrap(), &(0..20).collect::<Vec<i64>>()[..]);
        let values = result.values.as_slice::<f64>().unwrap();
        assert_eq!(values[0], 0.0);
        assert!(values.iter().all(|v| v.abs() <= 2.0));
        assert_eq!(generator.next_tick(), 20);
    }

    #[test]
    fn test_scaled_counter_values() {
        let mut generator = SignalGenerator::new(config(Waveform::ScaledCounter)).unwrap();
        let mut reader = StreamReader::new(generator.value_signal(), ReaderSettings::default()).unwrap();
        generator.step().unwrap();
        let result = reader.read(10);
        let values = result.values.as_slice::<f64>().unwrap();
        for (i, v) in values.iter().enumerate() {
            assert!((v - i as f64 * 0.1).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_packets() {
        let mut generator = SignalGenerator::new(config(Waveform::Constant)).unwrap();
        let mut reader = StreamReader::new(generator.value_signal(), ReaderSettings::default()).unwrap();
        generator.step().unwrap();
        let result = reader.read(10);
        assert_eq!(result.values.as_slice::<f64>(), Some(&[2.0; 10][..]));
    }

    #[test]
    fn test_start_stop_commands() {
        let (mut worker, msg_rx, cmd_tx) = create_test_worker(config(Waveform::Sine));

        cmd_tx.send(GeneratorCommand::Start).unwrap();
        cmd_tx.send(GeneratorCommand::SetPacketSize(0)).unwrap();
        worker.process_commands();
        assert!(worker.generating);
        assert_eq!(worker.generator.config().samples_per_packet, 1);
        assert_eq!(msg_rx.try_recv(), Ok(GeneratorMessage::Started));

        cmd_tx.send(GeneratorCommand::Stop).unwrap();
        worker.process_commands();
        assert!(!worker.generating);
        assert_eq!(msg_rx.try_recv(), Ok(GeneratorMessage::Stopped));
    }

    #[test]
    fn test_shutdown_command() {
        let (mut worker, _, cmd_tx) = create_test_worker(config(Waveform::Sine));
        cmd_tx.send(GeneratorCommand::Shutdown).unwrap();
        worker.process_commands();
        assert!(!worker.running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_spawned_generator_produces_packets() {
        let generator = SignalGenerator::new(GeneratorConfig {
            sample_rate_hz: 10_000,
            ..config(Waveform::Sine)
        })
        .unwrap();
        let mut reader = StreamReader::new(generator.value_signal(), ReaderSettings::default()).unwrap();
        let handle = generator.spawn().unwrap();
        handle.start().unwrap();

        let mut sent = 0;
        while sent < 3 {
            match handle.recv_timeout(Duration::from_secs(2)) {
                Some(GeneratorMessage::PacketsSent(n)) => sent = n,
                Some(_) => {}
                None => panic!("generator did not report progress"),
            }
        }
        let result = reader.read(30);
        assert_eq!(result.len(), 30);
        handle.shutdown();
        let queued = reader.available_count();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(reader.available_count(), queued);
    }
}
