//! Registry of live device links.
//!
//! Maps a device identifier to its link so an application never creates two
//! links for the same physical device. The registry is an explicit object
//! owned by the composition root, not ambient global state: insert a link
//! when it is created, evict it on disposal. Re-registering an identifier
//! replaces the previous entry (last writer wins).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::charger::Charger;
use crate::die::Die;
use crate::mpc::Mpc;

/// A live link of any device kind.
#[derive(Clone)]
pub enum LinkHandle {
    Die(Arc<Die>),
    Charger(Arc<Charger>),
    Mpc(Arc<Mpc>),
}

impl LinkHandle {
    pub fn device_id(&self) -> u32 {
        match self {
            LinkHandle::Die(die) => die.device_id(),
            LinkHandle::Charger(charger) => charger.device_id(),
            LinkHandle::Mpc(mpc) => mpc.device_id(),
        }
    }
}

/// Device id → live link.
#[derive(Default)]
pub struct LinkRegistry {
    links: Mutex<HashMap<u32, LinkHandle>>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a link under `device_id`, replacing any previous entry.
    pub fn insert(&self, device_id: u32, handle: LinkHandle) {
        if let Ok(mut links) = self.links.lock() {
            if links.insert(device_id, handle).is_some() {
                debug!(device_id, "replaced registered link");
            }
        }
    }

    /// The link registered for `device_id`, if any.
    pub fn get(&self, device_id: u32) -> Option<LinkHandle> {
        self.links
            .lock()
            .ok()
            .and_then(|links| links.get(&device_id).cloned())
    }

    /// Evicts the link registered for `device_id`.
    pub fn remove(&self, device_id: u32) -> Option<LinkHandle> {
        self.links.lock().ok().and_then(|mut links| links.remove(&device_id))
    }

    pub fn len(&self) -> usize {
        self.links.lock().map(|links| links.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registered device identifiers.
    pub fn device_ids(&self) -> Vec<u32> {
        self.links
            .lock()
            .map(|links| links.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::session::MockDeviceSession;

    fn make_die(system_id: &str) -> Arc<Die> {
        let mut session = MockDeviceSession::new();
        session.expect_system_id().return_const(system_id.to_string());
        session.expect_advertised_name().return_const(None);
        Die::new(Arc::new(session), LinkConfig::default())
    }

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let registry = LinkRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(1).is_none());
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let registry = LinkRegistry::new();
        registry.insert(7, LinkHandle::Die(make_die("a")));
        assert_eq!(registry.len(), 1);
        assert!(matches!(registry.get(7), Some(LinkHandle::Die(_))));
    }

    #[tokio::test]
    async fn test_insert_same_id_replaces_previous_link() {
        let registry = LinkRegistry::new();
        let first = make_die("first");
        let second = make_die("second");
        registry.insert(7, LinkHandle::Die(first));
        registry.insert(7, LinkHandle::Die(Arc::clone(&second)));
        assert_eq!(registry.len(), 1);
        let Some(LinkHandle::Die(current)) = registry.get(7) else {
            panic!("expected a die link");
        };
        assert_eq!(current.system_id(), second.system_id());
    }

    #[tokio::test]
    async fn test_remove_evicts_link() {
        let registry = LinkRegistry::new();
        registry.insert(9, LinkHandle::Die(make_die("a")));
        assert!(registry.remove(9).is_some());
        assert!(registry.get(9).is_none());
        assert!(registry.remove(9).is_none());
    }
}
