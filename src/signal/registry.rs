//! Global-id lookup of signals, used by readers to resolve string targets.

use super::Signal;
use crate::error::{DataPathError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Map of global id to signal
#[derive(Debug, Default)]
pub struct SignalRegistry {
    signals: RwLock<HashMap<String, Signal>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the signal's id, returning the signal it replaced
    pub fn register(&self, signal: Signal) -> Option<Signal> {
        tracing::debug!(signal = %signal.id(), "Registering signal");
        self.signals
            .write()
            .insert(signal.id().to_string(), signal)
    }

    pub fn get(&self, id: &str) -> Result<Signal> {
        self.signals
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DataPathError::NotFound(format!("signal '{}'", id)))
    }

    pub fn remove(&self, id: &str) -> Option<Signal> {
        self.signals.write().remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.signals.read().contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.signals.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of public signals only
    pub fn public_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .signals
            .read()
            .values()
            .filter(|s| s.is_public())
            .map(|s| s.id().to_string())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = SignalRegistry::new();
        let signal = Signal::new("/dev/ai0");
        assert!(registry.register(signal.clone()).is_none());
        assert!(registry.get("/dev/ai0").unwrap().ptr_eq(&signal));
        assert!(matches!(
            registry.get("/dev/ai1"),
            Err(DataPathError::NotFound(_))
        ));
    }

    #[test]
    fn test_ids_sorted_and_public_filter() {
        let registry = SignalRegistry::new();
        registry.register(Signal::new("b"));
        let hidden = Signal::new("a");
        hidden.set_public(false);
        registry.register(hidden);
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.public_ids(), vec!["b".to_string()]);
        assert!(registry.remove("a").is_some());
        assert_eq!(registry.len(), 1);
    }
}
