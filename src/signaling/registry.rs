//! In-memory, `parking_lot`-guarded server state: the VAddr table and the
//! pending named-context registrations. Non-durable by design (§6: "no
//! persisted state").

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::ConfigError;
use crate::vaddr::{ContextId, VAddr};

#[derive(Debug, Default)]
struct PendingContext {
    expected_size: usize,
    members: Vec<VAddr>,
}

#[derive(Debug, Default)]
struct State {
    next_vaddr: u32,
    endpoints: HashMap<u32, String>,
    next_context_id: u32,
    pending: HashMap<String, PendingContext>,
    finished: HashMap<String, (ContextId, Vec<VAddr>)>,
}

/// Shared, mutex-guarded rendezvous state. Cheap to lock: every critical
/// section below is a handful of map operations, never an I/O wait.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<State>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next dense VAddr, records `endpoint_uri`, and folds the
    /// peer into `context_name`'s pending membership. `expected_size` must
    /// agree with whatever size a prior peer under the same name supplied.
    pub fn request_vaddr(
        &self,
        endpoint_uri: String,
        expected_size: usize,
        context_name: String,
    ) -> Result<VAddr, ConfigError> {
        let mut state = self.state.lock();
        let vaddr = VAddr(state.next_vaddr);
        state.next_vaddr += 1;
        state.endpoints.insert(vaddr.0, endpoint_uri);

        let entry = state
            .pending
            .entry(context_name.clone())
            .or_insert_with(|| PendingContext {
                expected_size,
                members: Vec::new(),
            });

        if entry.expected_size != expected_size {
            return Err(ConfigError::ContextSizeConflict {
                context_name,
                requested: expected_size,
                registered: entry.expected_size,
            });
        }
        entry.members.push(vaddr);

        if entry.members.len() == entry.expected_size {
            let members = entry.members.clone();
            let context_id = ContextId(state.next_context_id);
            state.next_context_id += 1;
            state.finished.insert(context_name, (context_id, members));
        }

        Ok(vaddr)
    }

    /// Resolves a previously assigned VAddr to its endpoint URI, or `None`
    /// if it has not registered yet.
    pub fn lookup(&self, vaddr: VAddr) -> Option<String> {
        self.state.lock().endpoints.get(&vaddr.0).cloned()
    }

    /// Returns the finished membership for `context_name`, or `None` while
    /// still waiting on more peers to register.
    pub fn context(&self, context_name: &str) -> Option<(ContextId, Vec<VAddr>)> {
        self.state.lock().finished.get(context_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn assigns_dense_vaddrs_in_arrival_order() {
        let registry = Registry::new();
        let a = registry
            .request_vaddr("tcp://a".into(), 2, "demo".into())
            .unwrap();
        let b = registry
            .request_vaddr("tcp://b".into(), 2, "demo".into())
            .unwrap();
        assert_eq!(a, VAddr(0));
        assert_eq!(b, VAddr(1));
    }

    #[test]
    fn context_completes_once_expected_size_is_reached() {
        let registry = Registry::new();
        assert!(registry.context("demo").is_none());
        registry
            .request_vaddr("tcp://a".into(), 2, "demo".into())
            .unwrap();
        assert!(registry.context("demo").is_none());
        registry
            .request_vaddr("tcp://b".into(), 2, "demo".into())
            .unwrap();
        let (_, members) = registry.context("demo").unwrap();
        assert_eq!(members, vec![VAddr(0), VAddr(1)]);
    }

    #[test]
    fn conflicting_context_size_is_rejected() {
        let registry = Registry::new();
        registry
            .request_vaddr("tcp://a".into(), 2, "demo".into())
            .unwrap();
        let err = registry.request_vaddr("tcp://b".into(), 3, "demo".into());
        assert_matches!(err, Err(ConfigError::ContextSizeConflict { .. }));
    }

    #[test]
    fn lookup_misses_unregistered_vaddr() {
        let registry = Registry::new();
        assert!(registry.lookup(VAddr(0)).is_none());
    }
}
