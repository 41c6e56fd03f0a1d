//! The host-facing service handle.
//!
//! Every method is called on the host thread. Work is dispatched to the
//! worker pool and results come back through the [`HostLoop`], which the
//! host drives with [`Service::run_until`], [`Service::run_pending`] or
//! [`Service::turn`].

use crate::bridge::{HostLoop, PendingResult, Subscriber};
use crate::cache::{OperationCache, OperationHandle};
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::registry::{SubscriptionHandle, SubscriptionRegistry};
use crate::worker::{self, DispatchWorker, DocumentSource, Job, WorkerPool};
use hgql_engine::{Engine, OperationKind, Response};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The document an operation runs against.
#[derive(Debug, Clone)]
pub enum OperationSource {
    /// A document stored by [`Service::parse`].
    Handle(OperationHandle),
    /// Query text, parsed on each call.
    Text(String),
}

impl From<OperationHandle> for OperationSource {
    fn from(handle: OperationHandle) -> Self {
        Self::Handle(handle)
    }
}

impl From<&str> for OperationSource {
    fn from(query: &str) -> Self {
        Self::Text(query.to_string())
    }
}

impl From<String> for OperationSource {
    fn from(query: String) -> Self {
        Self::Text(query)
    }
}

struct Running {
    engine: Arc<dyn Engine>,
    pool: WorkerPool,
}

/// Runs GraphQL operations off the host thread.
pub struct Service {
    config: ServiceConfig,
    running: Option<Running>,
    host: HostLoop,
    cache: OperationCache,
    registry: SubscriptionRegistry<Response>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("config", &self.config)
            .field("started", &self.is_started())
            .field("operations", &self.cache.len())
            .field("subscriptions", &self.registry.len())
            .finish()
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

impl Service {
    /// Creates a stopped service.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            running: None,
            host: HostLoop::new(),
            cache: OperationCache::new(),
            registry: SubscriptionRegistry::new(),
        }
    }

    /// Starts the worker pool over an engine. A running service is stopped
    /// first.
    pub fn start(&mut self, engine: Arc<dyn Engine>) -> Result<(), ServiceError> {
        if self.running.is_some() {
            self.stop();
        }
        let pool = WorkerPool::new(&self.config)?;
        self.running = Some(Running { engine, pool });
        info!(
            worker_threads = self.config.worker_threads,
            "service started"
        );
        Ok(())
    }

    /// Returns true between `start` and `stop`.
    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    fn running(&self) -> Result<&Running, ServiceError> {
        self.running.as_ref().ok_or(ServiceError::NotStarted)
    }

    /// Parses and validates a document and stores it for later calls.
    pub fn parse(&mut self, query: &str) -> Result<OperationHandle, ServiceError> {
        let document = self.running()?.engine.parse(query).map_err(ServiceError::Parse)?;
        let handle = self.cache.store(Arc::new(document));
        debug!(%handle, "stored operation");
        Ok(handle)
    }

    /// Forgets a stored document. Unknown handles are ignored.
    pub fn discard(&mut self, handle: OperationHandle) {
        if self.cache.discard(handle) {
            debug!(%handle, "discarded operation");
        }
    }

    /// Runs a query or mutation.
    ///
    /// Fails right away only when the service is not started. Every other
    /// failure settles the returned result.
    pub fn execute(
        &mut self,
        source: impl Into<OperationSource>,
        operation_name: &str,
        variables: &str,
    ) -> Result<PendingResult, ServiceError> {
        let Running { engine, pool } = self.running.as_ref().ok_or(ServiceError::NotStarted)?;
        let source = match self.document_source(source.into()) {
            Ok(source) => source,
            Err(error) => return Ok(PendingResult::ready(Err(error))),
        };

        let (request, pending) = self.host.pending_request();
        pool.dispatch(DispatchWorker::new(
            Arc::clone(engine),
            self.host.bridge(),
            Job::Execute {
                request,
                source,
                operation_name: operation_name.to_string(),
                variables: variables.to_string(),
            },
        ));
        Ok(pending)
    }

    /// Starts a subscription. Payloads reach `subscriber` on the host thread
    /// until [`Service::unsubscribe`] or [`Service::stop`].
    ///
    /// A query or mutation is run once and reported as a single payload
    /// followed by completion.
    pub fn subscribe(
        &mut self,
        source: impl Into<OperationSource>,
        operation_name: &str,
        variables: &str,
        subscriber: Subscriber,
    ) -> Result<SubscriptionHandle, ServiceError> {
        let result = self.start_subscription(source.into(), operation_name, variables, subscriber);
        if let Err(error) = &result {
            warn!(%error, "failed to start subscription");
        }
        result
    }

    fn start_subscription(
        &mut self,
        source: OperationSource,
        operation_name: &str,
        variables: &str,
        subscriber: Subscriber,
    ) -> Result<SubscriptionHandle, ServiceError> {
        let engine = Arc::clone(&self.running()?.engine);
        let source = self.document_source(source)?;
        let (params, kind) = worker::prepare(engine.as_ref(), source, operation_name, variables)?;

        self.registry.prune();
        let (subscription, job) = if kind == OperationKind::Subscription {
            let queue = worker::stream(&engine, params)?;
            let subscription = self.registry.next_handle();
            self.registry.register(subscription, Arc::clone(&queue));
            (subscription, Job::Stream { subscription, queue })
        } else {
            let subscription = self.registry.next_handle();
            (subscription, Job::Once { subscription, params })
        };

        self.host.attach(subscription, subscriber);
        self.running()?
            .pool
            .dispatch(DispatchWorker::new(engine, self.host.bridge(), job));
        debug!(%subscription, %kind, "subscription started");
        Ok(subscription)
    }

    /// Stops a subscription. Payloads already on their way are discarded
    /// and the completion callback still runs. Unknown handles are ignored.
    pub fn unsubscribe(&mut self, subscription: SubscriptionHandle) {
        self.host.detach(subscription);
        if self.registry.cancel(subscription) {
            debug!(%subscription, "unsubscribed");
        }
        self.registry.prune();
    }

    /// Returns the number of subscriptions the service still tracks.
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Cancels every subscription, clears stored documents and releases
    /// the engine. Pending results settle as cancelled.
    pub fn stop(&mut self) {
        self.registry.cancel_all();
        self.cache.clear();
        self.host.reset();
        if let Some(mut running) = self.running.take() {
            running.pool.shutdown();
            info!("service stopped");
        }
    }

    /// Drives the host loop until `future` completes.
    pub async fn run_until<F: Future>(&mut self, future: F) -> F::Output {
        self.host.run_until(future).await
    }

    /// Handles every worker message that is ready. Returns how many were
    /// handled.
    pub fn run_pending(&mut self) -> usize {
        self.host.run_pending()
    }

    /// Waits for one worker message and handles it.
    pub async fn turn(&mut self) {
        self.host.turn().await;
    }

    fn document_source(&self, source: OperationSource) -> Result<DocumentSource, ServiceError> {
        match source {
            OperationSource::Handle(handle) => self.cache.lookup(handle).map(DocumentSource::Document),
            OperationSource::Text(query) => Ok(DocumentSource::Text(query)),
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}
