//! Ordered, removable storage for subscriber callbacks.

use crate::common::CallbackId;
use slotmap::SlotMap;

/// A function closure invoked on every pulse with the current pulse count.
pub type PulseCallback = Box<dyn FnMut(u64) + Send + Sync>;

/// A function closure invoked on every beat with the current beat count and
/// pulse count.
pub type BeatCallback = Box<dyn FnMut(u64, u64) + Send + Sync>;

/// Stores callbacks keyed by [`CallbackId`] while preserving registration
/// order for dispatch.
///
/// A slotmap alone does not guarantee iteration in insertion order once
/// slots are reused after removals, so a separate order index is kept.
pub(crate) struct CallbackRegistry<F> {
    entries: SlotMap<CallbackId, F>,
    order: Vec<CallbackId>,
}

impl<F> CallbackRegistry<F> {
    pub(crate) fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    /// Appends a callback. Dispatch order equals registration order; no
    /// de-duplication is performed.
    pub(crate) fn insert(&mut self, callback: F) -> CallbackId {
        let id = self.entries.insert(callback);
        self.order.push(id);
        id
    }

    /// Removes a callback by id. Returns `true` if it was present. The
    /// relative order of the remaining callbacks is unchanged.
    pub(crate) fn remove(&mut self, id: CallbackId) -> bool {
        if self.entries.remove(id).is_some() {
            self.order.retain(|&entry| entry != id);
            true
        } else {
            false
        }
    }

    /// Visits every callback mutably, in registration order.
    pub(crate) fn for_each_mut(&mut self, mut visit: impl FnMut(&mut F)) {
        for id in &self.order {
            if let Some(callback) = self.entries.get_mut(*id) {
                visit(callback);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_order(registry: &mut CallbackRegistry<u32>) -> Vec<u32> {
        let mut seen = Vec::new();
        registry.for_each_mut(|tag| seen.push(*tag));
        seen
    }

    #[test]
    fn dispatches_in_registration_order() {
        let mut registry = CallbackRegistry::new();
        for tag in [10u32, 20, 30] {
            registry.insert(tag);
        }
        assert_eq!(collect_order(&mut registry), vec![10, 20, 30]);
    }

    #[test]
    fn removal_preserves_remaining_order() {
        let mut registry = CallbackRegistry::new();
        let first = registry.insert(1u32);
        registry.insert(2u32);
        let third = registry.insert(3u32);

        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        assert_eq!(collect_order(&mut registry), vec![2, 3]);

        // A slot freed by removal must not let a new callback jump the queue.
        registry.insert(4u32);
        assert_eq!(collect_order(&mut registry), vec![2, 3, 4]);

        assert!(registry.remove(third));
        assert_eq!(collect_order(&mut registry), vec![2, 4]);
        assert_eq!(registry.len(), 2);
    }
}
