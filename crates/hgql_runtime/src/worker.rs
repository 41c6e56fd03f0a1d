//! Dispatch workers and the worker pool.
//!
//! A [`DispatchWorker`] carries one unit of work from preparation to its last
//! host message. A streaming worker parks on its payload queue, so it gets a
//! blocking thread of the pool's runtime to itself.

use crate::bridge::{HostBridge, HostMessage, RequestId};
use crate::config::ServiceConfig;
use crate::encoder::{encode, encode_outcome, Outcome};
use crate::error::ServiceError;
use crate::queue::PayloadQueue;
use crate::registry::SubscriptionHandle;
use hgql_engine::engine::panic_message;
use hgql_engine::{Document, Engine, OperationKind, RequestParams, Response, SubscriptionParams};
use serde_json::{Map, Value};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tokio::task;
use tracing::{debug, error};

/// Lifecycle of a dispatch worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Resolving the document, variables and operation kind.
    Preparing,
    /// Running a one-shot operation on the engine.
    Running,
    /// The one-shot result was posted.
    Completed,
    /// Preparation failed and the error was posted.
    Failed,
    /// Registered with the engine, about to drain.
    Streaming,
    /// Forwarding payload batches to the host.
    Draining,
    /// Unsubscribed and completion posted.
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "preparing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Where the document of an operation comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// A document from the operation cache.
    Document(Arc<Document>),
    /// Query text, parsed and validated by the engine.
    Text(String),
}

/// Work handed to a dispatch worker.
#[derive(Debug)]
pub enum Job {
    /// Resolve an operation and settle a pending request with its result.
    Execute {
        request: RequestId,
        source: DocumentSource,
        operation_name: String,
        variables: String,
    },
    /// Resolve a query or mutation started through `subscribe`, reported as a
    /// single payload.
    Once {
        subscription: SubscriptionHandle,
        params: RequestParams,
    },
    /// Drain a registered subscription.
    Stream {
        subscription: SubscriptionHandle,
        queue: Arc<PayloadQueue<Response>>,
    },
}

/// Parses a variables object. An empty string is an empty object.
pub fn parse_variables(variables: &str) -> Result<Map<String, Value>, ServiceError> {
    if variables.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(variables) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ServiceError::InvalidVariables),
    }
}

/// Resolves the document, variables and operation kind of a request.
pub fn prepare(
    engine: &dyn Engine,
    source: DocumentSource,
    operation_name: &str,
    variables: &str,
) -> Result<(RequestParams, OperationKind), ServiceError> {
    let document = match source {
        DocumentSource::Document(document) => document,
        DocumentSource::Text(query) => Arc::new(engine.parse(&query).map_err(ServiceError::Parse)?),
    };
    let variables = parse_variables(variables)?;
    let params = RequestParams::new(document)
        .with_operation_name(operation_name)
        .with_variables(variables);
    let kind = engine
        .find_operation(&params.document, params.operation_name.as_deref())
        .map_err(ServiceError::Operation)?;
    Ok((params, kind))
}

/// Registers a subscription with the engine and returns the queue its
/// payloads land in.
///
/// The queue accepts payloads before the engine registration returns, and
/// the key is stored before any payload can be dequeued.
pub fn stream(
    engine: &Arc<dyn Engine>,
    request: RequestParams,
) -> Result<Arc<PayloadQueue<Response>>, ServiceError> {
    let queue = Arc::new(PayloadQueue::new());
    queue.activate();

    let target = Arc::downgrade(&queue);
    let params = SubscriptionParams {
        request,
        callback: Arc::new(move |response: Response| {
            if let Some(queue) = target.upgrade() {
                queue.enqueue(response);
            }
        }),
    };

    let key = engine.subscribe(params).map_err(ServiceError::Operation)?;
    queue.register(engine, key);
    Ok(queue)
}

/// Unsubscribes a queue when the draining worker lets go of it.
struct UnsubscribeGuard<'a>(&'a PayloadQueue<Response>);

impl Drop for UnsubscribeGuard<'_> {
    fn drop(&mut self) {
        if self.0.is_registered() {
            self.0.unsubscribe();
        }
    }
}

/// Runs one job to completion on a worker thread.
pub struct DispatchWorker {
    engine: Arc<dyn Engine>,
    bridge: HostBridge,
    state: WorkerState,
    job: Option<Job>,
}

impl fmt::Debug for DispatchWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchWorker")
            .field("state", &self.state)
            .field("job", &self.job)
            .finish_non_exhaustive()
    }
}

impl DispatchWorker {
    /// Creates a worker for a job.
    pub fn new(engine: Arc<dyn Engine>, bridge: HostBridge, job: Job) -> Self {
        let state = match job {
            Job::Execute { .. } => WorkerState::Preparing,
            Job::Once { .. } => WorkerState::Running,
            Job::Stream { .. } => WorkerState::Streaming,
        };
        Self {
            engine,
            bridge,
            state,
            job: Some(job),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Returns true if the worker drains a subscription.
    pub fn is_streaming(&self) -> bool {
        matches!(self.job, Some(Job::Stream { .. }))
    }

    /// Runs the job and returns the final state.
    pub fn run(mut self) -> WorkerState {
        let Some(job) = self.job.take() else {
            return self.state;
        };
        match job {
            Job::Execute {
                request,
                source,
                operation_name,
                variables,
            } => {
                let result = self.execute(source, &operation_name, &variables);
                self.transition(if result.is_ok() {
                    WorkerState::Completed
                } else {
                    WorkerState::Failed
                });
                self.bridge.post(HostMessage::Resolved { request, result });
            }
            Job::Once {
                subscription,
                params,
            } => {
                let payload = encode_outcome(self.resolve(params));
                self.bridge.post(HostMessage::Payloads {
                    subscription,
                    payloads: vec![payload],
                });
                self.bridge.post(HostMessage::Completed { subscription });
                self.transition(WorkerState::Completed);
            }
            Job::Stream {
                subscription,
                queue,
            } => {
                self.drain(subscription, &queue);
                drop(queue);
                self.transition(WorkerState::Terminated);
                self.bridge.post(HostMessage::Completed { subscription });
            }
        }
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(from = %self.state, to = %next, "worker transition");
        self.state = next;
    }

    fn execute(
        &mut self,
        source: DocumentSource,
        operation_name: &str,
        variables: &str,
    ) -> Result<String, ServiceError> {
        let (params, kind) = prepare(self.engine.as_ref(), source, operation_name, variables)?;
        if kind == OperationKind::Subscription {
            return Err(ServiceError::StreamingRequired);
        }
        self.transition(WorkerState::Running);
        Ok(encode_outcome(self.resolve(params)))
    }

    fn resolve(&self, params: RequestParams) -> Outcome {
        panic::catch_unwind(AssertUnwindSafe(|| self.engine.resolve(params))).unwrap_or_else(
            |payload| {
                let message = panic_message(&*payload);
                error!("Caught exception executing operation: {message}");
                Ok(Response::error(message))
            },
        )
    }

    fn drain(&mut self, subscription: SubscriptionHandle, queue: &PayloadQueue<Response>) {
        let _guard = UnsubscribeGuard(queue);
        self.transition(WorkerState::Draining);
        loop {
            let (batch, registered) = queue.wait_for_work();
            if batch.is_empty() {
                if registered {
                    continue;
                }
                break;
            }
            let payloads = batch.iter().map(encode).collect();
            if !self.bridge.post(HostMessage::Payloads {
                subscription,
                payloads,
            }) {
                queue.unsubscribe();
            }
        }
    }
}

/// The runtime dispatch workers run on.
pub struct WorkerPool {
    runtime: Option<Runtime>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("running", &self.runtime.is_some())
            .finish()
    }
}

impl WorkerPool {
    /// Creates a pool from configuration.
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Runs a worker on the pool.
    ///
    /// Streaming workers hold a blocking thread for the lifetime of their
    /// subscription. One-shot workers run as tasks that block in place, so
    /// live subscriptions never use up the capacity they need.
    pub fn dispatch(&self, worker: DispatchWorker) {
        let Some(runtime) = &self.runtime else {
            debug!("worker pool shut down, dropping job");
            return;
        };
        let streaming = worker.is_streaming();
        let run = move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| worker.run())) {
                error!("Caught exception in dispatch worker: {}", panic_message(&*payload));
            }
        };
        if streaming {
            runtime.spawn_blocking(run);
        } else {
            runtime.spawn(async move { task::block_in_place(run) });
        }
    }

    /// Stops the runtime without waiting for running workers.
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::HostLoop;
    use hgql_engine::{EngineError, ErrorKind, SubscriptionKey};
    use crate::bridge::Subscriber;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every operation with a fixed payload and counts cancellations.
    #[derive(Default)]
    struct EchoEngine {
        cancelled: AtomicUsize,
    }

    impl Engine for EchoEngine {
        fn parse(&self, query: &str) -> Result<Document, EngineError> {
            hgql_syntax::parse_document(query).map_err(EngineError::from)
        }

        fn resolve(&self, params: RequestParams) -> Result<Response, EngineError> {
            if params.variables.contains_key("explode") {
                panic!("resolver exploded");
            }
            if params.variables.contains_key("fail") {
                return Err(EngineError::message(ErrorKind::Execution, "failed"));
            }
            Ok(Response::data(serde_json::json!({ "ok": true })))
        }

        fn subscribe(&self, _params: SubscriptionParams) -> Result<SubscriptionKey, EngineError> {
            Ok(SubscriptionKey(7))
        }

        fn unsubscribe(&self, _key: SubscriptionKey) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn execute_job(query: &str, variables: &str) -> (WorkerState, Result<String, ServiceError>) {
        let mut host = HostLoop::new();
        let (request, pending) = host.pending_request();
        let worker = DispatchWorker::new(
            Arc::new(EchoEngine::default()),
            host.bridge(),
            Job::Execute {
                request,
                source: DocumentSource::Text(query.to_string()),
                operation_name: String::new(),
                variables: variables.to_string(),
            },
        );
        assert_eq!(worker.state(), WorkerState::Preparing);
        let state = worker.run();
        assert_eq!(host.run_pending(), 1);
        let result = block_on(pending);
        (state, result)
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn test_parse_variables() {
        assert!(parse_variables("").unwrap().is_empty());
        assert_eq!(parse_variables(r#"{"id": 1}"#).unwrap()["id"], 1);
        assert!(matches!(parse_variables("not json"), Err(ServiceError::InvalidVariables)));
        assert!(matches!(parse_variables("[1]"), Err(ServiceError::InvalidVariables)));
    }

    #[test]
    fn test_execute_completes() {
        let (state, result) = execute_job("{ ok }", "");
        assert_eq!(state, WorkerState::Completed);
        assert_eq!(result.unwrap(), r#"{"data":{"ok":true}}"#);
    }

    #[test]
    fn test_execute_normalizes_engine_errors() {
        let (state, result) = execute_job("{ ok }", r#"{"fail": true}"#);
        assert_eq!(state, WorkerState::Completed);
        assert_eq!(result.unwrap(), r#"{"data":null,"errors":[{"message":"failed"}]}"#);
    }

    #[test]
    fn test_execute_catches_panics() {
        let (state, result) = execute_job("{ ok }", r#"{"explode": true}"#);
        assert_eq!(state, WorkerState::Completed);
        assert_eq!(
            result.unwrap(),
            r#"{"data":null,"errors":[{"message":"resolver exploded"}]}"#
        );
    }

    #[test]
    fn test_execute_preparation_failures() {
        let (state, result) = execute_job("{ ok }", "not json");
        assert_eq!(state, WorkerState::Failed);
        assert_eq!(result.unwrap_err().to_string(), "invalid variables object");

        let (state, result) = execute_job("subscription { ok }", "");
        assert_eq!(state, WorkerState::Failed);
        assert!(matches!(result, Err(ServiceError::StreamingRequired)));

        let (state, result) = execute_job("{ ok", "");
        assert_eq!(state, WorkerState::Failed);
        assert!(matches!(result, Err(ServiceError::Parse(_))));
    }

    #[test]
    fn test_once_posts_single_payload_then_completion() {
        let mut host = HostLoop::new();
        let document = Arc::new(hgql_syntax::parse_document("{ ok }").unwrap());
        let worker = DispatchWorker::new(
            Arc::new(EchoEngine::default()),
            host.bridge(),
            Job::Once {
                subscription: SubscriptionHandle(3),
                params: RequestParams::new(document),
            },
        );
        assert_eq!(worker.run(), WorkerState::Completed);

        let received = Rc::new(RefCell::new(Vec::new()));
        let completed = Rc::new(Cell::new(false));
        host.attach(SubscriptionHandle(3), {
            let received = received.clone();
            let completed = completed.clone();
            Subscriber::new(move |p| received.borrow_mut().push(p.to_string()))
                .on_complete(move || completed.set(true))
        });
        host.run_pending();
        assert_eq!(*received.borrow(), [r#"{"data":{"ok":true}}"#]);
        assert!(completed.get());
    }

    #[test]
    fn test_stream_drains_until_unsubscribed() {
        let engine = Arc::new(EchoEngine::default());
        let shared: Arc<dyn Engine> = engine.clone();
        let document = Arc::new(hgql_syntax::parse_document("subscription { ok }").unwrap());
        let queue = stream(&shared, RequestParams::new(document)).unwrap();
        assert!(queue.is_registered());

        queue.enqueue(Response::data(serde_json::json!(1)));
        queue.enqueue(Response::data(serde_json::json!(2)));
        queue.unsubscribe();

        let mut host = HostLoop::new();
        let worker = DispatchWorker::new(
            shared,
            host.bridge(),
            Job::Stream {
                subscription: SubscriptionHandle(1),
                queue,
            },
        );
        assert_eq!(worker.run(), WorkerState::Terminated);
        assert_eq!(engine.cancelled.load(Ordering::SeqCst), 1);

        let received = Rc::new(RefCell::new(Vec::new()));
        host.attach(SubscriptionHandle(1), {
            let received = received.clone();
            Subscriber::new(move |p| received.borrow_mut().push(p.to_string()))
        });
        assert_eq!(host.run_pending(), 2);
        assert_eq!(*received.borrow(), [r#"{"data":1}"#, r#"{"data":2}"#]);
        assert_eq!(host.subscriber_count(), 0);
    }
}
