//! Ordered packet queue between one signal and one input port.
//!
//! A [`Connection`] is single-producer / single-consumer. The producer side is
//! the signal's fan-out in [`crate::signal::Signal::send_packet`]; the consumer
//! side is whoever owns the input port, normally a reader. The only lock in
//! the data path lives here, together with two condition variables: one wakes
//! readers when packets arrive, the other wakes a blocked producer when the
//! queue drains below its high-water mark.
//!
//! Events are never dropped and never count toward the high-water mark.

use crate::config::{ConnectionSettings, OverflowPolicy};
use crate::error::{DataPathError, Result};
use crate::packet::{EventPacket, Packet};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Samples readable before the next event, and the number of queued events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvailableCount {
    pub data_samples: usize,
    pub event_count: usize,
}

/// Result of waiting on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Closed,
}

struct QueueState {
    queue: VecDeque<Packet>,
    data_packets: usize,
    closed: bool,
}

/// FIFO of packets from one signal to one input port
pub struct Connection {
    signal_id: String,
    port_id: String,
    settings: ConnectionSettings,
    state: Mutex<QueueState>,
    data_ready: Condvar,
    space_ready: Condvar,
    dropped: AtomicU64,
}

impl Connection {
    pub fn new(
        signal_id: impl Into<String>,
        port_id: impl Into<String>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            signal_id: signal_id.into(),
            port_id: port_id.into(),
            settings,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                data_packets: 0,
                closed: false,
            }),
            data_ready: Condvar::new(),
            space_ready: Condvar::new(),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn signal_id(&self) -> &str {
        &self.signal_id
    }

    pub fn port_id(&self) -> &str {
        &self.port_id
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Enqueue without reporting overflow; producers use this path
    pub fn enqueue(&self, packet: Packet) {
        if let Err(e) = self.try_enqueue(packet) {
            tracing::trace!(
                signal = %self.signal_id,
                port = %self.port_id,
                "enqueue: {}",
                e
            );
        }
    }

    /// Enqueue and report `Overflow` when data had to be dropped
    ///
    /// The packet order is preserved in every case. Returns `NotConnected`
    /// once the connection has been closed.
    pub fn try_enqueue(&self, packet: Packet) -> Result<()> {
        let mut st = self.state.lock();
        if st.closed {
            return Err(DataPathError::NotConnected);
        }

        let data = match packet {
            Packet::Event(_) => {
                st.queue.push_back(packet);
                drop(st);
                self.data_ready.notify_all();
                return Ok(());
            }
            Packet::Data(ref data) => data.sample_count() as u64,
        };

        let mut overflow = None;
        if let Some(hwm) = self.settings.high_water_mark.map(|h| h.max(1)) {
            if st.data_packets >= hwm {
                match self.settings.overflow_policy {
                    OverflowPolicy::DropNewest => {
                        self.record_drop_at_tail(&mut st, data);
                        drop(st);
                        self.data_ready.notify_all();
                        tracing::warn!(
                            signal = %self.signal_id,
                            port = %self.port_id,
                            dropped = data,
                            "Connection full, dropping newest packet"
                        );
                        return Err(DataPathError::Overflow { dropped: data });
                    }
                    OverflowPolicy::DropOldest => {
                        let mut dropped = 0;
                        while st.data_packets >= hwm {
                            match self.drop_oldest(&mut st) {
                                Some(n) => dropped += n,
                                None => break,
                            }
                        }
                        tracing::warn!(
                            signal = %self.signal_id,
                            port = %self.port_id,
                            dropped,
                            "Connection full, dropping oldest packet"
                        );
                        overflow = Some(dropped);
                    }
                    OverflowPolicy::Block => {
                        while st.data_packets >= hwm && !st.closed {
                            self.space_ready.wait(&mut st);
                        }
                        if st.closed {
                            return Err(DataPathError::NotConnected);
                        }
                    }
                }
            }
        }

        st.queue.push_back(packet);
        st.data_packets += 1;
        drop(st);
        self.data_ready.notify_all();

        match overflow {
            Some(dropped) => Err(DataPathError::Overflow { dropped }),
            None => Ok(()),
        }
    }

    fn record_drop_at_tail(&self, st: &mut MutexGuard<'_, QueueState>, samples: u64) {
        self.dropped.fetch_add(samples, Ordering::Relaxed);
        if !self.settings.emit_drop_events {
            return;
        }
        let merged = st
            .queue
            .back()
            .and_then(|p| p.as_event())
            .and_then(|e| e.dropped_count());
        match merged {
            Some(prev) => {
                if let Some(last) = st.queue.back_mut() {
                    *last = Packet::event(EventPacket::dropped_samples(prev + samples));
                }
            }
            None => st
                .queue
                .push_back(Packet::event(EventPacket::dropped_samples(samples))),
        }
    }

    /// Remove the oldest data packet, leaving a drop marker at its position
    fn drop_oldest(&self, st: &mut MutexGuard<'_, QueueState>) -> Option<u64> {
        let index = st.queue.iter().position(|p| !p.is_event())?;
        let samples = st.queue.remove(index)?.sample_count() as u64;
        st.data_packets -= 1;
        self.dropped.fetch_add(samples, Ordering::Relaxed);

        if self.settings.emit_drop_events {
            let previous = index
                .checked_sub(1)
                .and_then(|i| st.queue.get(i))
                .and_then(|p| p.as_event())
                .and_then(|e| e.dropped_count());
            match previous {
                Some(prev) => {
                    st.queue[index - 1] =
                        Packet::event(EventPacket::dropped_samples(prev + samples));
                }
                None => st
                    .queue
                    .insert(index, Packet::event(EventPacket::dropped_samples(samples))),
            }
        }
        Some(samples)
    }

    /// Remove and return the head packet
    pub fn dequeue(&self) -> Option<Packet> {
        let mut st = self.state.lock();
        let packet = st.queue.pop_front()?;
        if !packet.is_event() {
            st.data_packets -= 1;
            drop(st);
            self.space_ready.notify_one();
        }
        Some(packet)
    }

    /// Remove the head packet only if `pred` accepts it
    pub fn dequeue_if<F>(&self, pred: F) -> Option<Packet>
    where
        F: FnOnce(&Packet) -> bool,
    {
        let mut st = self.state.lock();
        if !pred(st.queue.front()?) {
            return None;
        }
        let packet = st.queue.pop_front()?;
        if !packet.is_event() {
            st.data_packets -= 1;
            drop(st);
            self.space_ready.notify_one();
        }
        Some(packet)
    }

    /// Head packet without removing it
    pub fn peek(&self) -> Option<Packet> {
        self.state.lock().queue.front().cloned()
    }

    /// Samples up to the next event, plus every queued event
    pub fn available_count(&self) -> AvailableCount {
        let st = self.state.lock();
        let mut count = AvailableCount::default();
        let mut blocked = false;
        for packet in &st.queue {
            match packet {
                Packet::Event(_) => {
                    count.event_count += 1;
                    blocked = true;
                }
                Packet::Data(data) if !blocked => count.data_samples += data.sample_count(),
                Packet::Data(_) => {}
            }
        }
        count
    }

    /// Pointer copies of all queued packets, head first
    pub fn snapshot(&self) -> Vec<Packet> {
        self.state.lock().queue.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Queued data packets (the quantity the high-water mark bounds)
    pub fn data_packet_count(&self) -> usize {
        self.state.lock().data_packets
    }

    /// Total samples discarded by the overflow policy
    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Discard queued packets, keep the connection open
    pub fn clear(&self) {
        let mut st = self.state.lock();
        st.queue.clear();
        st.data_packets = 0;
        drop(st);
        self.space_ready.notify_all();
    }

    /// Discard queued packets and refuse further ones; wakes every waiter
    pub fn close(&self) {
        let mut st = self.state.lock();
        if st.closed {
            return;
        }
        st.closed = true;
        st.queue.clear();
        st.data_packets = 0;
        drop(st);
        tracing::debug!(signal = %self.signal_id, port = %self.port_id, "Connection closed");
        self.data_ready.notify_all();
        self.space_ready.notify_all();
    }

    /// Block until the queue is non-empty
    pub fn wait_for_packets(&self, deadline: Option<Instant>) -> WaitOutcome {
        self.wait_for(deadline, |queue| !queue.is_empty())
    }

    /// Block until `ready` holds for the queue, the deadline passes or the
    /// connection closes. `None` waits indefinitely.
    pub fn wait_for<F>(&self, deadline: Option<Instant>, mut ready: F) -> WaitOutcome
    where
        F: FnMut(&VecDeque<Packet>) -> bool,
    {
        let mut st = self.state.lock();
        loop {
            if st.closed {
                return WaitOutcome::Closed;
            }
            if ready(&st.queue) {
                return WaitOutcome::Ready;
            }
            match deadline {
                None => self.data_ready.wait(&mut st),
                Some(deadline) => {
                    if self.data_ready.wait_until(&mut st, deadline).timed_out() {
                        return if st.closed {
                            WaitOutcome::Closed
                        } else if ready(&st.queue) {
                            WaitOutcome::Ready
                        } else {
                            WaitOutcome::TimedOut
                        };
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("signal_id", &self.signal_id)
            .field("port_id", &self.port_id)
            .field("settings", &self.settings)
            .field("dropped", &self.dropped_samples())
            .finish()
    }
}
