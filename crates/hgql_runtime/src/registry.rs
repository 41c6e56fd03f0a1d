//! Host-visible subscription handles.

use crate::queue::PayloadQueue;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Handle of a subscription as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub i32);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps subscription handles to their payload queues.
///
/// Handles are not reused until the counter wraps, so messages still in
/// flight for a cancelled subscription cannot reach a newer one. After the
/// wrap, handles that are still live are skipped.
///
/// A subscription whose worker stopped on its own keeps its entry until the
/// next [`SubscriptionRegistry::prune`].
pub struct SubscriptionRegistry<T> {
    entries: FxHashMap<SubscriptionHandle, Arc<PayloadQueue<T>>>,
    last: i32,
}

impl<T> Default for SubscriptionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            last: 0,
        }
    }

    /// Allocates the next handle.
    pub fn next_handle(&mut self) -> SubscriptionHandle {
        loop {
            self.last = self.last.wrapping_add(1).max(1);
            let handle = SubscriptionHandle(self.last);
            if !self.entries.contains_key(&handle) {
                return handle;
            }
        }
    }

    /// Records the queue of a subscription.
    pub fn register(&mut self, handle: SubscriptionHandle, queue: Arc<PayloadQueue<T>>) {
        self.entries.insert(handle, queue);
    }

    /// Unsubscribes and forgets a subscription. Unknown handles are ignored.
    pub fn cancel(&mut self, handle: SubscriptionHandle) -> bool {
        match self.entries.remove(&handle) {
            Some(queue) => {
                queue.unsubscribe();
                true
            }
            None => false,
        }
    }

    /// Unsubscribes every live subscription, then clears the registry.
    pub fn cancel_all(&mut self) {
        for queue in self.entries.values() {
            queue.unsubscribe();
        }
        self.entries.clear();
    }

    /// Forgets subscriptions whose queue was unsubscribed without going
    /// through the registry. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, queue| queue.is_registered());
        before - self.entries.len()
    }

    /// Returns true if the handle is live.
    pub fn contains(&self, handle: SubscriptionHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Returns the number of live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no live subscriptions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_queue() -> Arc<PayloadQueue<i32>> {
        let queue = Arc::new(PayloadQueue::new());
        queue.activate();
        queue
    }

    #[test]
    fn test_handles_start_at_one() {
        let mut registry = SubscriptionRegistry::<i32>::new();
        assert_eq!(registry.next_handle(), SubscriptionHandle(1));
        assert_eq!(registry.next_handle(), SubscriptionHandle(2));
    }

    #[test]
    fn test_cancel_unsubscribes() {
        let mut registry = SubscriptionRegistry::new();
        let handle = registry.next_handle();
        let queue = active_queue();
        registry.register(handle, Arc::clone(&queue));

        assert!(registry.cancel(handle));
        assert!(!queue.is_registered());
        assert!(!registry.cancel(handle));
        assert!(!registry.cancel(SubscriptionHandle(99)));
    }

    #[test]
    fn test_cancel_all_keeps_handles_increasing() {
        let mut registry = SubscriptionRegistry::new();
        let queues: Vec<_> = (0..3)
            .map(|_| {
                let queue = active_queue();
                let handle = registry.next_handle();
                registry.register(handle, Arc::clone(&queue));
                queue
            })
            .collect();

        registry.cancel_all();
        assert!(registry.is_empty());
        assert!(queues.iter().all(|q| !q.is_registered()));
        assert_eq!(registry.next_handle(), SubscriptionHandle(4));
    }

    #[test]
    fn test_wrapped_handles_skip_live_ones() {
        let mut registry = SubscriptionRegistry::new();
        let first = registry.next_handle();
        registry.register(first, active_queue());

        registry.last = i32::MAX - 1;
        assert_eq!(registry.next_handle(), SubscriptionHandle(i32::MAX));
        assert_eq!(registry.next_handle(), SubscriptionHandle(2));
    }

    #[test]
    fn test_prune_forgets_closed_queues() {
        let mut registry = SubscriptionRegistry::new();
        let closed = active_queue();
        let live = active_queue();
        let first = registry.next_handle();
        registry.register(first, Arc::clone(&closed));
        let second = registry.next_handle();
        registry.register(second, Arc::clone(&live));

        assert_eq!(registry.prune(), 0);
        closed.unsubscribe();
        assert_eq!(registry.prune(), 1);
        assert!(!registry.contains(first));
        assert!(registry.contains(second));
        assert_eq!(registry.len(), 1);
    }
}
