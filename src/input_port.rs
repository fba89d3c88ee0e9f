//! Consumer-side binding point.
//!
//! An [`InputPort`] binds to at most one signal. Connecting runs the port's
//! acceptance checks against the signal's current descriptor, creates the
//! [`Connection`] and queues a synthetic `DATA_DESCRIPTOR_CHANGED` so the
//! consumer always sees metadata before data.

use crate::config::{ConnectionSettings, OverflowPolicy};
use crate::connection::Connection;
use crate::descriptor::DataDescriptor;
use crate::error::{DataPathError, Result};
use crate::signal::{Signal, WeakSignal};
use crate::types::SampleType;
use std::sync::Arc;

type Acceptance = Box<dyn Fn(&DataDescriptor) -> bool + Send + Sync>;

/// Connection state of an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Idle,
    Connected,
}

struct Binding {
    signal: WeakSignal,
    connection: Arc<Connection>,
}

/// Binding point for one signal
pub struct InputPort {
    id: String,
    settings: ConnectionSettings,
    acceptance: Option<Acceptance>,
    sample_types: Vec<SampleType>,
    require_domain: bool,
    binding: Option<Binding>,
}

impl InputPort {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            settings: ConnectionSettings::default(),
            acceptance: None,
            sample_types: Vec::new(),
            require_domain: false,
            binding: None,
        }
    }

    /// Custom predicate run against the signal's descriptor
    pub fn with_acceptance<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&DataDescriptor) -> bool + Send + Sync + 'static,
    {
        self.acceptance = Some(Box::new(predicate));
        self
    }

    /// Only accept signals whose value type is one of `types`
    pub fn accept_sample_types(mut self, types: &[SampleType]) -> Self {
        self.sample_types = types.to_vec();
        self
    }

    /// Only accept signals that have a domain signal
    pub fn require_domain_signal(mut self, require: bool) -> Self {
        self.require_domain = require;
        self
    }

    /// Queue settings for connections made by this port
    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn state(&self) -> PortState {
        match self.binding {
            Some(_) => PortState::Connected,
            None => PortState::Idle,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.binding.is_some()
    }

    /// The bound signal, if it is still alive
    pub fn signal(&self) -> Option<Signal> {
        self.binding.as_ref().and_then(|b| b.signal.upgrade())
    }

    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.binding.as_ref().map(|b| &b.connection)
    }

    fn has_predicate(&self) -> bool {
        self.acceptance.is_some() || !self.sample_types.is_empty() || self.require_domain
    }

    fn check(&self, signal: &Signal) -> Result<()> {
        if self.settings.overflow_policy == OverflowPolicy::Block
            && self.settings.high_water_mark.is_some()
            && !signal.allows_blocking()
        {
            return Err(DataPathError::Rejected(format!(
                "signal '{}' does not allow blocking sends",
                signal.id()
            )));
        }
        if !self.has_predicate() {
            return Ok(());
        }
        let Some(descriptor) = signal.descriptor() else {
            return Err(DataPathError::Rejected(format!(
                "signal '{}' has no descriptor",
                signal.id()
            )));
        };
        if !self.sample_types.is_empty() && !self.sample_types.contains(&descriptor.sample_type()) {
            return Err(DataPathError::Rejected(format!(
                "sample type {} of '{}' is not accepted",
                descriptor.sample_type(),
                signal.id()
            )));
        }
        if self.require_domain && signal.domain_signal().is_none() {
            return Err(DataPathError::Rejected(format!(
                "signal '{}' has no domain signal",
                signal.id()
            )));
        }
        if let Some(accept) = &self.acceptance {
            if !accept(&descriptor) {
                return Err(DataPathError::Rejected(format!(
                    "signal '{}' refused by acceptance predicate",
                    signal.id()
                )));
            }
        }
        Ok(())
    }

    /// Bind to `signal`
    pub fn connect(&mut self, signal: &Signal) -> Result<()> {
        if self.binding.is_some() {
            return Err(DataPathError::AlreadyConnected);
        }
        if let Err(e) = self.check(signal) {
            tracing::warn!(port = %self.id, signal = %signal.id(), "Connection rejected: {}", e);
            return Err(e);
        }

        let connection = Arc::new(Connection::new(signal.id(), self.id.as_str(), self.settings));
        signal.attach(connection.clone());
        self.binding = Some(Binding {
            signal: signal.downgrade(),
            connection,
        });
        tracing::debug!(port = %self.id, signal = %signal.id(), "Input port connected");
        Ok(())
    }

    /// Unbind and empty the connection; no-op when idle
    pub fn disconnect(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        if let Some(signal) = binding.signal.upgrade() {
            signal.detach(&binding.connection);
        }
        binding.connection.close();
        tracing::debug!(port = %self.id, "Input port disconnected");
    }
}

impl Drop for InputPort {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for InputPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPort")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::DescriptorUpdate;

    fn signal_of(ty: SampleType) -> Signal {
        let desc = DataDescriptor::builder().sample_type(ty).build_shared().unwrap();
        Signal::with_descriptor("sig", desc)
    }

    #[test]
    fn test_connect_queues_descriptor_first() {
        let signal = signal_of(SampleType::Float64);
        let mut port = InputPort::new("in");
        port.connect(&signal).unwrap();
        assert_eq!(port.state(), PortState::Connected);
        let head = port.connection().unwrap().dequeue().unwrap();
        let change = head.as_event().unwrap().descriptor_change().unwrap();
        assert!(matches!(change.value, DescriptorUpdate::Set(_)));
    }

    #[test]
    fn test_already_connected() {
        let signal = signal_of(SampleType::Float64);
        let mut port = InputPort::new("in");
        port.connect(&signal).unwrap();
        assert!(matches!(
            port.connect(&signal),
            Err(DataPathError::AlreadyConnected)
        ));
    }

    #[test]
    fn test_acceptance_predicates() {
        let signal = signal_of(SampleType::Int32);
        let mut port = InputPort::new("in").accept_sample_types(&[SampleType::Float64]);
        assert!(matches!(port.connect(&signal), Err(DataPathError::Rejected(_))));

        let mut port = InputPort::new("in").require_domain_signal(true);
        assert!(port.connect(&signal).is_err());

        let mut port = InputPort::new("in").with_acceptance(|d| d.sample_type().is_integer());
        assert!(port.connect(&signal).is_ok());

        let bare = Signal::new("bare");
        let mut port = InputPort::new("in").with_acceptance(|_| true);
        assert!(port.connect(&bare).is_err());
        let mut port = InputPort::new("in");
        assert!(port.connect(&bare).is_ok());
    }

    #[test]
    fn test_block_policy_needs_opt_in() {
        let signal = signal_of(SampleType::Int32);
        let settings = ConnectionSettings::bounded(2, OverflowPolicy::Block);
        let mut port = InputPort::new("in").with_settings(settings);
        assert!(matches!(port.connect(&signal), Err(DataPathError::Rejected(_))));
        signal.allow_blocking_send(true);
        assert!(port.connect(&signal).is_ok());
    }

    #[test]
    fn test_disconnect_is_idempotent_and_reconnects() {
        let signal = signal_of(SampleType::Int32);
        let mut port = InputPort::new("in");
        port.connect(&signal).unwrap();
        let conn = port.connection().unwrap().clone();
        port.disconnect();
        port.disconnect();
        assert!(conn.is_closed());
        assert_eq!(conn.available_count().data_samples, 0);
        assert_eq!(signal.connection_count(), 0);
        port.connect(&signal).unwrap();
        assert_eq!(signal.connection_count(), 1);
    }

    #[test]
    fn test_drop_detaches() {
        let signal = signal_of(SampleType::Int32);
        {
            let mut port = InputPort::new("in");
            port.connect(&signal).unwrap();
            assert_eq!(signal.connection_count(), 1);
        }
        assert_eq!(signal.connection_count(), 0);
    }
}
