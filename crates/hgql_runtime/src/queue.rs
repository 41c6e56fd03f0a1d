//! Subscription payload queue.
//!
//! One producer (the engine's delivery callback, on any thread) and one
//! consumer (the dispatch worker draining the subscription). The mutex
//! guards the payloads, the registration state and the cancellation key
//! together; the engine is never called while it is held.

use hgql_engine::{Engine, SubscriptionKey};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    /// Created, not yet accepting payloads.
    Idle,
    /// Accepting payloads.
    Active,
    /// Unsubscribed. Terminal.
    Closed,
}

/// Deferred engine cancellation.
struct CancelKey {
    engine: Weak<dyn Engine>,
    key: SubscriptionKey,
}

impl CancelKey {
    fn cancel(self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.unsubscribe(self.key);
        }
    }
}

struct QueueState<T> {
    payloads: VecDeque<T>,
    registration: Registration,
    cancel: Option<CancelKey>,
}

/// Pending payloads of one subscription.
pub struct PayloadQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

impl<T> Default for PayloadQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PayloadQueue<T> {
    /// Creates an idle queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                payloads: VecDeque::new(),
                registration: Registration::Idle,
                cancel: None,
            }),
            ready: Condvar::new(),
        }
    }

    /// Starts accepting payloads, ahead of the engine registration that may
    /// deliver the first one.
    pub fn activate(&self) {
        let mut state = self.state.lock();
        if state.registration == Registration::Idle {
            state.registration = Registration::Active;
        }
    }

    /// Stores the engine key to cancel on unsubscribe.
    ///
    /// If the queue was unsubscribed while the engine registration was in
    /// flight, the key is cancelled right away.
    pub fn register(&self, engine: &Arc<dyn Engine>, key: SubscriptionKey) {
        let cancel = CancelKey {
            engine: Arc::downgrade(engine),
            key,
        };
        let late = {
            let mut state = self.state.lock();
            match state.registration {
                Registration::Closed => Some(cancel),
                Registration::Idle | Registration::Active => {
                    state.registration = Registration::Active;
                    state.cancel = Some(cancel);
                    None
                }
            }
        };
        self.ready.notify_all();
        if let Some(cancel) = late {
            debug!(key = %key, "subscription closed during registration");
            cancel.cancel();
        }
    }

    /// Pushes a payload. Returns false, dropping the payload, once the queue
    /// is no longer registered.
    pub fn enqueue(&self, payload: T) -> bool {
        {
            let mut state = self.state.lock();
            if state.registration != Registration::Active {
                return false;
            }
            state.payloads.push_back(payload);
        }
        self.ready.notify_one();
        true
    }

    /// Blocks until there are payloads or the queue is unsubscribed, then
    /// drains every pending payload.
    ///
    /// Returns the batch and whether the queue is still registered.
    pub fn wait_for_work(&self) -> (Vec<T>, bool) {
        let mut state = self.state.lock();
        while state.payloads.is_empty() && state.registration != Registration::Closed {
            self.ready.wait(&mut state);
        }
        let batch = state.payloads.drain(..).collect();
        (batch, state.registration != Registration::Closed)
    }

    /// Stops accepting payloads and cancels the engine registration.
    /// Idempotent.
    pub fn unsubscribe(&self) {
        let cancel = {
            let mut state = self.state.lock();
            if state.registration == Registration::Closed {
                return;
            }
            state.registration = Registration::Closed;
            state.cancel.take()
        };
        self.ready.notify_all();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
    }

    /// Returns true until the queue is unsubscribed.
    pub fn is_registered(&self) -> bool {
        self.state.lock().registration != Registration::Closed
    }

    /// Returns the number of pending payloads.
    pub fn len(&self) -> usize {
        self.state.lock().payloads.len()
    }

    /// Returns true if no payloads are pending.
    pub fn is_empty(&self) -> bool {
        self.state.lock().payloads.is_empty()
    }
}

impl<T> fmt::Debug for PayloadQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PayloadQueue")
            .field("registration", &state.registration)
            .field("pending", &state.payloads.len())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for PayloadQueue<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgql_engine::{
        Document, EngineError, RequestParams, Response, SubscriptionParams,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingEngine {
        unsubscribed: AtomicUsize,
    }

    impl Engine for CountingEngine {
        fn parse(&self, _query: &str) -> Result<Document, EngineError> {
            unimplemented!()
        }

        fn resolve(&self, _params: RequestParams) -> Result<Response, EngineError> {
            unimplemented!()
        }

        fn subscribe(&self, _params: SubscriptionParams) -> Result<SubscriptionKey, EngineError> {
            unimplemented!()
        }

        fn unsubscribe(&self, _key: SubscriptionKey) {
            self.unsubscribed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registered_queue() -> (PayloadQueue<i32>, Arc<CountingEngine>) {
        let engine = Arc::new(CountingEngine::default());
        let dyn_engine: Arc<dyn Engine> = engine.clone();
        let queue = PayloadQueue::new();
        queue.activate();
        queue.register(&dyn_engine, SubscriptionKey(1));
        (queue, engine)
    }

    #[test]
    fn test_batch_in_order() {
        let (queue, _engine) = registered_queue();
        assert!(queue.enqueue(1));
        assert!(queue.enqueue(2));
        assert!(queue.enqueue(3));

        assert_eq!(queue.wait_for_work(), (vec![1, 2, 3], true));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_idle_queue_drops_payloads() {
        let queue = PayloadQueue::new();
        assert!(!queue.enqueue(1));
        queue.activate();
        assert!(queue.enqueue(2));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let (queue, engine) = registered_queue();
        queue.unsubscribe();
        queue.unsubscribe();
        drop(queue);
        assert_eq!(engine.unsubscribed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (queue, engine) = registered_queue();
        drop(queue);
        assert_eq!(engine.unsubscribed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_enqueue_after_unsubscribe() {
        let (queue, _engine) = registered_queue();
        assert!(queue.enqueue(1));
        queue.unsubscribe();
        assert!(!queue.enqueue(2));

        // Payloads present when the flag flipped are still drained.
        assert_eq!(queue.wait_for_work(), (vec![1], false));
        assert_eq!(queue.wait_for_work(), (vec![], false));
    }

    #[test]
    fn test_register_after_close_cancels_immediately() {
        let engine = Arc::new(CountingEngine::default());
        let dyn_engine: Arc<dyn Engine> = engine.clone();
        let queue = PayloadQueue::<i32>::new();
        queue.activate();
        queue.unsubscribe();
        queue.register(&dyn_engine, SubscriptionKey(9));
        assert_eq!(engine.unsubscribed.load(Ordering::SeqCst), 1);
        assert!(!queue.is_registered());
    }

    #[test]
    fn test_blocked_waiter_wakes_on_unsubscribe() {
        let (queue, engine) = registered_queue();
        let queue = Arc::new(queue);
        let (tx, rx) = mpsc::channel();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let result = queue.wait_for_work();
                let _ = tx.send(result);
            })
        };

        // The consumer is blocked: nothing arrives yet.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        queue.unsubscribe();
        let (batch, registered) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(batch.is_empty());
        assert!(!registered);
        consumer.join().unwrap();
        assert_eq!(engine.unsubscribed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blocked_waiter_wakes_on_enqueue() {
        let (queue, _engine) = registered_queue();
        let queue = Arc::new(queue);

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for_work())
        };

        thread::sleep(Duration::from_millis(20));
        queue.enqueue(42);
        assert_eq!(consumer.join().unwrap(), (vec![42], true));
    }

    #[test]
    fn test_debug_reports_state() {
        let (queue, _engine) = registered_queue();
        queue.enqueue(1);
        assert_eq!(
            format!("{queue:?}"),
            "PayloadQueue { registration: Active, pending: 1, .. }"
        );
        queue.unsubscribe();
        assert!(format!("{queue:?}").contains("registration: Closed"));
    }
}
