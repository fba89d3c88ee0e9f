//! Signals: identified packet producers.
//!
//! A [`Signal`] is a cheap clonable handle. Sending a packet appends it to
//! every attached [`Connection`] in attach order. The signal tracks its
//! current value descriptor and a weak link to its domain signal; a domain
//! signal in turn remembers its dependents and forwards its own descriptor
//! changes to them.
//!
//! # Main Types
//!
//! - [`Signal`] - Producer handle
//! - [`WeakSignal`] - Non-owning handle, used by input ports and domain links
//! - [`SignalRegistry`] - Lookup of signals by global id

mod registry;

pub use registry::SignalRegistry;

use crate::connection::Connection;
use crate::descriptor::DataDescriptor;
use crate::error::{DataPathError, Result};
use crate::packet::{DescriptorChange, DescriptorUpdate, EventPacket, Packet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

struct SignalState {
    descriptor: Option<Arc<DataDescriptor>>,
    domain: Option<Weak<SignalInner>>,
    dependents: Vec<Weak<SignalInner>>,
    connections: Vec<Arc<Connection>>,
}

struct SignalInner {
    id: String,
    name: String,
    active: AtomicBool,
    public: AtomicBool,
    allow_blocking: AtomicBool,
    state: Mutex<SignalState>,
}

impl SignalInner {
    fn close_connections(&self) {
        let connections = std::mem::take(&mut self.state.lock().connections);
        for conn in &connections {
            conn.close();
        }
        if !connections.is_empty() {
            tracing::debug!(signal = %self.id, count = connections.len(), "Signal torn down");
        }
    }
}

impl Drop for SignalInner {
    fn drop(&mut self) {
        self.close_connections();
    }
}

fn same_descriptor(a: &Arc<DataDescriptor>, b: &Arc<DataDescriptor>) -> bool {
    Arc::ptr_eq(a, b) || **a == **b
}

/// Handle to a packet producer
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    /// New active, public signal without a descriptor
    ///
    /// The local name defaults to the last `/`-separated segment of `id`.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let name = id.rsplit('/').next().unwrap_or_default().to_string();
        Self::with_name(id, name)
    }

    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: id.into(),
                name: name.into(),
                active: AtomicBool::new(true),
                public: AtomicBool::new(true),
                allow_blocking: AtomicBool::new(false),
                state: Mutex::new(SignalState {
                    descriptor: None,
                    domain: None,
                    dependents: Vec::new(),
                    connections: Vec::new(),
                }),
            }),
        }
    }

    /// New signal that already carries `descriptor`
    pub fn with_descriptor(id: impl Into<String>, descriptor: impl Into<Arc<DataDescriptor>>) -> Self {
        let signal = Self::new(id);
        signal.inner.state.lock().descriptor = Some(descriptor.into());
        signal
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.inner.active.store(active, Ordering::Release);
    }

    pub fn is_public(&self) -> bool {
        self.inner.public.load(Ordering::Acquire)
    }

    pub fn set_public(&self, public: bool) {
        self.inner.public.store(public, Ordering::Release);
    }

    /// Permit connections with the `Block` overflow policy
    pub fn allow_blocking_send(&self, allow: bool) {
        self.inner.allow_blocking.store(allow, Ordering::Release);
    }

    pub fn allows_blocking(&self) -> bool {
        self.inner.allow_blocking.load(Ordering::Acquire)
    }

    pub fn descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.inner.state.lock().descriptor.clone()
    }

    pub fn domain_signal(&self) -> Option<Signal> {
        self.inner
            .state
            .lock()
            .domain
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Signal { inner })
    }

    /// Current descriptor of the domain signal
    pub fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.domain_signal().and_then(|d| d.descriptor())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.state.lock().connections.len()
    }

    pub fn downgrade(&self) -> WeakSignal {
        WeakSignal(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Deliver `packet` to every attached connection
    ///
    /// Descriptor-change events update this signal before they are enqueued.
    /// A data packet carrying a descriptor other than the current one is
    /// preceded by an automatic `DATA_DESCRIPTOR_CHANGED`. Data sent while the
    /// signal is inactive is dropped with `Inactive`; events always go out.
    pub fn send_packet(&self, packet: impl Into<Packet>) -> Result<()> {
        let packet = packet.into();
        match &packet {
            Packet::Event(event) => {
                let forward = match event.descriptor_change() {
                    Some(change) => self.apply_change(&change),
                    None => None,
                };
                self.fan_out(&packet);
                if let Some(descriptor) = forward {
                    self.forward_to_dependents(descriptor);
                }
                Ok(())
            }
            Packet::Data(data) => {
                if !self.is_active() {
                    tracing::trace!(signal = %self.inner.id, "Dropping data on inactive signal");
                    return Err(DataPathError::Inactive(self.inner.id.clone()));
                }

                if let (Some(domain_packet), Some(expected)) =
                    (data.domain_packet(), self.domain_descriptor())
                {
                    if !same_descriptor(domain_packet.descriptor(), &expected) {
                        return Err(DataPathError::DomainMismatch(format!(
                            "domain packet of '{}' does not belong to its domain signal",
                            self.inner.id
                        )));
                    }
                }

                let announce = {
                    let mut st = self.inner.state.lock();
                    let changed = !st
                        .descriptor
                        .as_ref()
                        .is_some_and(|d| same_descriptor(d, data.descriptor()));
                    if changed {
                        st.descriptor = Some(data.descriptor().clone());
                    }
                    changed
                };
                if announce {
                    tracing::debug!(signal = %self.inner.id, "Announcing descriptor of data packet");
                    let event = Packet::event(EventPacket::descriptor_changed(
                        Some(data.descriptor().clone()),
                        None,
                    ));
                    self.fan_out(&event);
                    self.forward_to_dependents(Some(data.descriptor().clone()));
                }

                self.fan_out(&packet);
                Ok(())
            }
        }
    }

    /// Send each packet in turn, stopping at the first error
    pub fn send_packets<I>(&self, packets: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Packet>,
    {
        for packet in packets {
            self.send_packet(packet)?;
        }
        Ok(())
    }

    /// Replace the value descriptor and announce it in-band
    pub fn set_descriptor(&self, descriptor: impl Into<Arc<DataDescriptor>>) -> Result<()> {
        self.send_packet(EventPacket::descriptor_changed(Some(descriptor.into()), None))
    }

    /// Replace the domain link and announce the new domain descriptor
    pub fn set_domain_signal(&self, domain: Option<&Signal>) -> Result<()> {
        if domain.is_some_and(|d| d.ptr_eq(self)) {
            return Err(DataPathError::Rejected(format!(
                "signal '{}' cannot be its own domain",
                self.inner.id
            )));
        }

        let previous = {
            let mut st = self.inner.state.lock();
            std::mem::replace(&mut st.domain, domain.map(|d| Arc::downgrade(&d.inner)))
        };
        if let Some(old) = previous.and_then(|w| w.upgrade()) {
            let me = Arc::downgrade(&self.inner);
            old.state
                .lock()
                .dependents
                .retain(|w| !w.ptr_eq(&me) && w.strong_count() > 0);
        }

        let update = match domain {
            Some(domain) => {
                domain
                    .inner
                    .state
                    .lock()
                    .dependents
                    .push(Arc::downgrade(&self.inner));
                match domain.descriptor() {
                    Some(d) => DescriptorUpdate::Set(d),
                    None => DescriptorUpdate::Cleared,
                }
            }
            None => DescriptorUpdate::Cleared,
        };

        tracing::debug!(
            signal = %self.inner.id,
            domain = domain.map(|d| d.id()).unwrap_or("<none>"),
            "Domain signal changed"
        );
        self.send_packet(EventPacket::from_change(DescriptorChange {
            value: DescriptorUpdate::Unchanged,
            domain: update,
        }))
    }

    /// Close every attached connection and detach them
    pub fn teardown(&self) {
        self.inner.close_connections();
    }

    /// Attach a connection, queueing the current descriptors ahead of any data
    pub(crate) fn attach(&self, connection: Arc<Connection>) {
        let mut st = self.inner.state.lock();
        let domain = st
            .domain
            .as_ref()
            .and_then(Weak::upgrade)
            .and_then(|d| d.state.lock().descriptor.clone());
        let change = DescriptorChange {
            value: st
                .descriptor
                .clone()
                .map(DescriptorUpdate::Set)
                .unwrap_or(DescriptorUpdate::Cleared),
            domain: domain
                .map(DescriptorUpdate::Set)
                .unwrap_or(DescriptorUpdate::Cleared),
        };
        connection.enqueue(Packet::event(EventPacket::from_change(change)));
        st.connections.push(connection);
    }

    pub(crate) fn detach(&self, connection: &Arc<Connection>) {
        self.inner
            .state
            .lock()
            .connections
            .retain(|c| !Arc::ptr_eq(c, connection));
    }

    fn apply_change(&self, change: &DescriptorChange) -> Option<Option<Arc<DataDescriptor>>> {
        if change.value.is_unchanged() {
            return None;
        }
        let mut st = self.inner.state.lock();
        st.descriptor = change.value.apply(st.descriptor.as_ref());
        tracing::debug!(
            signal = %self.inner.id,
            sample_type = ?st.descriptor.as_ref().map(|d| d.sample_type()),
            "Descriptor changed"
        );
        Some(st.descriptor.clone())
    }

    fn fan_out(&self, packet: &Packet) {
        let connections = self.inner.state.lock().connections.clone();
        tracing::trace!(
            signal = %self.inner.id,
            connections = connections.len(),
            samples = packet.sample_count(),
            "send"
        );
        for conn in &connections {
            conn.enqueue(packet.clone());
        }
    }

    fn forward_to_dependents(&self, descriptor: Option<Arc<DataDescriptor>>) {
        let dependents: Vec<Arc<SignalInner>> = {
            let mut st = self.inner.state.lock();
            st.dependents.retain(|w| w.strong_count() > 0);
            st.dependents.iter().filter_map(Weak::upgrade).collect()
        };
        for inner in dependents {
            let dependent = Signal { inner };
            let event = EventPacket::from_change(DescriptorChange {
                value: DescriptorUpdate::Unchanged,
                domain: descriptor
                    .clone()
                    .map(DescriptorUpdate::Set)
                    .unwrap_or(DescriptorUpdate::Cleared),
            });
            dependent.fan_out(&Packet::event(event));
        }
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("connections", &self.connection_count())
            .finish()
    }
}

/// Non-owning signal handle
#[derive(Clone, Debug, Default)]
pub struct WeakSignal(Weak<SignalInner>);

impl WeakSignal {
    pub fn upgrade(&self) -> Option<Signal> {
        self.0.upgrade().map(|inner| Signal { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;
    use crate::descriptor::DataRule;
    use crate::packet::DataPacket;
    use crate::types::{Ratio, SampleType, Scalar};

    fn int32() -> Arc<DataDescriptor> {
        DataDescriptor::builder()
            .sample_type(SampleType::Int32)
            .build_shared()
            .unwrap()
    }

    fn time() -> Arc<DataDescriptor> {
        DataDescriptor::builder()
            .sample_type(SampleType::Int64)
            .rule(DataRule::Linear {
                delta: Scalar::Int(1),
                start: Scalar::Int(0),
            })
            .tick_resolution(Ratio::per(1000).unwrap())
            .origin(crate::descriptor::UNIX_EPOCH_ORIGIN)
            .build_shared()
            .unwrap()
    }

    fn attach(signal: &Signal) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(signal.id(), "test", ConnectionSettings::default()));
        signal.attach(conn.clone());
        conn
    }

    fn drain(conn: &Connection) -> Vec<Packet> {
        std::iter::from_fn(|| conn.dequeue()).collect()
    }

    #[test]
    fn test_attach_queues_current_descriptor() {
        let signal = Signal::with_descriptor("/dev/ai0", int32());
        let conn = attach(&signal);
        let head = conn.dequeue().unwrap();
        let change = head.as_event().unwrap().descriptor_change().unwrap();
        assert_eq!(change.value, DescriptorUpdate::Set(int32()));
        assert_eq!(change.domain, DescriptorUpdate::Cleared);
        assert_eq!(signal.name(), "ai0");
    }

    #[test]
    fn test_fan_out_shares_packets() {
        let signal = Signal::with_descriptor("sig", int32());
        let a = attach(&signal);
        let b = attach(&signal);
        let pkt = DataPacket::from_samples(int32(), 0, &[1i32, 2]).unwrap().into_packet();
        signal.send_packet(pkt.clone()).unwrap();
        let (pa, pb) = (drain(&a), drain(&b));
        assert_eq!(pa.len(), 2);
        assert!(pa[1].ptr_eq(&pkt));
        assert!(pb[1].ptr_eq(&pkt));
    }

    #[test]
    fn test_inactive_drops_data_forwards_events() {
        let signal = Signal::with_descriptor("sig", int32());
        let conn = attach(&signal);
        conn.dequeue();
        signal.set_active(false);
        let pkt = DataPacket::from_samples(int32(), 0, &[1i32]).unwrap();
        assert!(matches!(signal.send_packet(pkt), Err(DataPathError::Inactive(_))));
        signal.send_packet(EventPacket::dropped_samples(1)).unwrap();
        let queued = drain(&conn);
        assert_eq!(queued.len(), 1);
        assert!(queued[0].is_event());
    }

    #[test]
    fn test_new_descriptor_in_data_is_announced() {
        let signal = Signal::new("sig");
        let conn = attach(&signal);
        conn.dequeue();
        signal
            .send_packet(DataPacket::from_samples(int32(), 0, &[7i32]).unwrap())
            .unwrap();
        let queued = drain(&conn);
        assert_eq!(queued.len(), 2);
        assert!(queued[0].as_event().unwrap().is_descriptor_changed());
        assert_eq!(signal.descriptor(), Some(int32()));
    }

    #[test]
    fn test_set_descriptor_updates_before_enqueue() {
        let signal = Signal::with_descriptor("sig", int32());
        let conn = attach(&signal);
        conn.dequeue();
        let float = DataDescriptor::builder()
            .sample_type(SampleType::Float32)
            .build_shared()
            .unwrap();
        signal.set_descriptor(float.clone()).unwrap();
        assert_eq!(signal.descriptor(), Some(float));
        assert_eq!(conn.len(), 1);
    }

    #[test]
    fn test_domain_link_and_forwarding() {
        let domain = Signal::with_descriptor("sig/time", time());
        let signal = Signal::with_descriptor("sig", int32());
        let conn = attach(&signal);
        conn.dequeue();

        signal.set_domain_signal(Some(&domain)).unwrap();
        assert_eq!(signal.domain_descriptor(), Some(time()));
        let change = conn.dequeue().unwrap().as_event().unwrap().descriptor_change().unwrap();
        assert!(change.value.is_unchanged());
        assert_eq!(change.domain, DescriptorUpdate::Set(time()));

        let new_time = DataDescriptor::builder()
            .sample_type(SampleType::Int64)
            .rule(DataRule::Linear {
                delta: Scalar::Int(2),
                start: Scalar::Int(0),
            })
            .build_shared()
            .unwrap();
        domain.set_descriptor(new_time.clone()).unwrap();
        let change = conn.dequeue().unwrap().as_event().unwrap().descriptor_change().unwrap();
        assert_eq!(change.domain, DescriptorUpdate::Set(new_time));
    }

    #[test]
    fn test_domain_packet_must_match_domain_signal() {
        let domain = Signal::with_descriptor("sig/time", time());
        let signal = Signal::with_descriptor("sig", int32());
        signal.set_domain_signal(Some(&domain)).unwrap();

        let other_time = DataDescriptor::builder()
            .sample_type(SampleType::Int64)
            .build_shared()
            .unwrap();
        let foreign = Arc::new(DataPacket::from_samples(other_time, 0, &[0i64]).unwrap());
        let mut pkt = DataPacket::from_samples(int32(), 0, &[1i32]).unwrap();
        pkt.set_domain_packet(foreign).unwrap();
        assert!(matches!(
            signal.send_packet(pkt),
            Err(DataPathError::DomainMismatch(_))
        ));
        assert!(signal.set_domain_signal(Some(&signal)).is_err());
    }

    #[test]
    fn test_drop_closes_connections() {
        let signal = Signal::with_descriptor("sig", int32());
        let conn = attach(&signal);
        assert_eq!(signal.connection_count(), 1);
        drop(signal);
        assert!(conn.is_closed());
    }
}
