//! Handoff from worker threads to the host thread.
//!
//! Workers post [`HostMessage`]s through a [`HostBridge`]. The [`HostLoop`]
//! owns the receiving end and is the only code that invokes host callbacks,
//! so callbacks run on the host thread and need not be `Send`.

use crate::error::ServiceError;
use crate::registry::SubscriptionHandle;
use rustc_hash::FxHashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Identifies a pending one-shot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// A message from a worker to the host.
#[derive(Debug)]
pub enum HostMessage {
    /// A one-shot request finished.
    Resolved {
        request: RequestId,
        result: Result<String, ServiceError>,
    },
    /// Encoded payloads of a subscription, in production order.
    Payloads {
        subscription: SubscriptionHandle,
        payloads: Vec<String>,
    },
    /// A subscription will produce no further payloads.
    Completed { subscription: SubscriptionHandle },
}

/// Sending side of the host loop, cloned into every worker.
#[derive(Debug, Clone)]
pub struct HostBridge {
    sender: mpsc::UnboundedSender<HostMessage>,
}

impl HostBridge {
    /// Posts a message to the host. Returns false if the host loop is gone.
    pub fn post(&self, message: HostMessage) -> bool {
        match self.sender.send(message) {
            Ok(()) => true,
            Err(_) => {
                debug!("host loop closed, dropping message");
                false
            }
        }
    }
}

/// The eventual result of a one-shot request, resolved by the host loop.
#[derive(Debug)]
pub struct PendingResult {
    receiver: oneshot::Receiver<Result<String, ServiceError>>,
}

impl PendingResult {
    /// Creates a result that is already settled.
    pub fn ready(result: Result<String, ServiceError>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(result);
        Self { receiver }
    }
}

impl Future for PendingResult {
    type Output = Result<String, ServiceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ServiceError::Cancelled)))
    }
}

/// Host callbacks of one subscription.
pub struct Subscriber {
    on_payload: Option<Box<dyn FnMut(&str)>>,
    on_complete: Option<Box<dyn FnOnce()>>,
}

impl Subscriber {
    /// Creates a subscriber invoked once per payload.
    pub fn new(on_payload: impl FnMut(&str) + 'static) -> Self {
        Self {
            on_payload: Some(Box::new(on_payload)),
            on_complete: None,
        }
    }

    /// Sets a callback invoked when the subscription completes.
    #[must_use]
    pub fn on_complete(mut self, on_complete: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(on_complete));
        self
    }

    fn complete(mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete();
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("attached", &self.on_payload.is_some())
            .finish_non_exhaustive()
    }
}

/// Receiving side: dispatches worker messages to host callbacks.
#[derive(Debug)]
pub struct HostLoop {
    sender: mpsc::UnboundedSender<HostMessage>,
    receiver: mpsc::UnboundedReceiver<HostMessage>,
    requests: FxHashMap<RequestId, oneshot::Sender<Result<String, ServiceError>>>,
    subscribers: FxHashMap<SubscriptionHandle, Subscriber>,
    last_request: u64,
}

impl Default for HostLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl HostLoop {
    /// Creates a host loop.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            requests: FxHashMap::default(),
            subscribers: FxHashMap::default(),
            last_request: 0,
        }
    }

    /// Returns a bridge for workers.
    pub fn bridge(&self) -> HostBridge {
        HostBridge {
            sender: self.sender.clone(),
        }
    }

    /// Registers a pending request.
    pub fn pending_request(&mut self) -> (RequestId, PendingResult) {
        self.last_request += 1;
        let request = RequestId(self.last_request);
        let (sender, receiver) = oneshot::channel();
        self.requests.insert(request, sender);
        (request, PendingResult { receiver })
    }

    /// Attaches the callbacks of a subscription.
    pub fn attach(&mut self, subscription: SubscriptionHandle, subscriber: Subscriber) {
        self.subscribers.insert(subscription, subscriber);
    }

    /// Stops payload delivery to a subscription right away. Payloads already
    /// in the channel are discarded; completion is still reported.
    pub fn detach(&mut self, subscription: SubscriptionHandle) {
        if let Some(subscriber) = self.subscribers.get_mut(&subscription) {
            subscriber.on_payload = None;
        }
    }

    /// Returns the number of subscriptions still awaiting completion.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Cancels pending requests and completes every subscriber.
    pub fn reset(&mut self) {
        // Dropping the senders settles the results as cancelled.
        self.requests.clear();
        for (_, subscriber) in self.subscribers.drain() {
            subscriber.complete();
        }
        while self.receiver.try_recv().is_ok() {}
    }

    /// Handles one worker message.
    pub fn dispatch(&mut self, message: HostMessage) {
        match message {
            HostMessage::Resolved { request, result } => {
                if let Some(sender) = self.requests.remove(&request) {
                    let _ = sender.send(result);
                }
            }
            HostMessage::Payloads {
                subscription,
                payloads,
            } => {
                let Some(on_payload) = self
                    .subscribers
                    .get_mut(&subscription)
                    .and_then(|s| s.on_payload.as_mut())
                else {
                    debug!(%subscription, count = payloads.len(), "discarding payloads");
                    return;
                };
                for payload in &payloads {
                    on_payload(payload);
                }
            }
            HostMessage::Completed { subscription } => {
                if let Some(subscriber) = self.subscribers.remove(&subscription) {
                    debug!(%subscription, "subscription completed");
                    subscriber.complete();
                }
            }
        }
    }

    /// Dispatches every message that is ready without waiting. Returns the
    /// number of messages handled.
    pub fn run_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.dispatch(message);
            handled += 1;
        }
        handled
    }

    /// Waits for one message and dispatches it.
    pub async fn turn(&mut self) {
        if let Some(message) = self.receiver.recv().await {
            self.dispatch(message);
        }
    }

    /// Dispatches messages until `future` completes.
    pub async fn run_until<F: Future>(&mut self, future: F) -> F::Output {
        tokio::pin!(future);
        loop {
            tokio::select! {
                biased;
                output = &mut future => return output,
                Some(message) = self.receiver.recv() => self.dispatch(message),
            }
        }
    }
}
