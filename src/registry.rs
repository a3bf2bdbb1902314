//! The registration table: the agreed-upon mapping from wire-level ids to
//! this processor's cells and inboxes.
//!
//! Ids are dense integers starting at 0, assigned monotonically in collective
//! construction order, which is what makes them identical on every processor
//! without any communication.

use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased handle to a queue's local inbox, owned jointly by the queue
/// handle and the registration table.
pub(crate) trait InboxSink: Send + Sync {
    /// Drop the previous superstep's delivery.
    fn clear(&self);
    /// Decode one incoming message and append it.
    fn append(&self, tag: &[u8], content: &[u8]) -> anyhow::Result<()>;
}

/// A registered variable's local cell: a stable address and its size.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Location {
    pub(crate) addr: usize,
    pub(crate) size: usize,
}

pub(crate) struct Registry {
    locations: HashMap<i32, Location>,
    queues: HashMap<i32, Arc<dyn InboxSink>>,
    next_var_id: i32,
    next_queue_id: i32,
}

impl Registry {
    pub(crate) fn new() -> Registry {
        Registry {
            locations: HashMap::new(),
            queues: HashMap::new(),
            next_var_id: 0,
            next_queue_id: 0,
        }
    }

    pub(crate) fn register_location(&mut self, addr: usize, size: usize) -> i32 {
        let id = self.next_var_id;
        self.next_var_id += 1;
        self.locations.insert(id, Location { addr, size });
        id
    }

    pub(crate) fn unregister_location(&mut self, id: i32) {
        self.locations.remove(&id);
    }

    pub(crate) fn location(&self, id: i32) -> Option<Location> {
        self.locations.get(&id).copied()
    }

    pub(crate) fn register_queue(&mut self, sink: Arc<dyn InboxSink>) -> i32 {
        let id = self.next_queue_id;
        self.next_queue_id += 1;
        self.queues.insert(id, sink);
        id
    }

    pub(crate) fn unregister_queue(&mut self, id: i32) {
        self.queues.remove(&id);
    }

    pub(crate) fn queue(&self, id: i32) -> Option<Arc<dyn InboxSink>> {
        self.queues.get(&id).cloned()
    }

    pub(crate) fn clear_inboxes(&self) {
        for sink in self.queues.values() {
            sink.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_monotone() {
        let mut registry = Registry::new();
        assert_eq!(registry.register_location(0x1000, 4), 0);
        assert_eq!(registry.register_location(0x2000, 8), 1);
        registry.unregister_location(0);
        // ids are never reused, even after an unregister
        assert_eq!(registry.register_location(0x3000, 4), 2);
        assert!(registry.location(0).is_none());
        assert_eq!(registry.location(1).unwrap().size, 8);
    }

    #[test]
    fn queue_ids_are_a_separate_space() {
        struct Null;
        impl InboxSink for Null {
            fn clear(&self) {}
            fn append(&self, _tag: &[u8], _content: &[u8]) -> anyhow::Result<()> {
                Ok(())
            }
        }
        let mut registry = Registry::new();
        registry.register_location(0x1000, 4);
        assert_eq!(registry.register_queue(Arc::new(Null)), 0);
        assert_eq!(registry.register_queue(Arc::new(Null)), 1);
    }
}
