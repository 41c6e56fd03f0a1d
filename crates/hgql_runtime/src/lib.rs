//! Host-bridged execution service for hgql.
//!
//! The service runs GraphQL operations on a worker pool and hands results
//! back to a single-threaded host loop:
//! - `cache`: Parsed documents behind numeric handles
//! - `queue`: Condition-variable gated subscription payload queue
//! - `registry`: Host-visible subscription handles
//! - `encoder`: Result normalization and JSON encoding
//! - `bridge`: Message passing from workers to the host loop
//! - `worker`: Dispatch workers and the worker pool
//! - `service`: The host-facing service handle

pub mod bridge;
pub mod cache;
pub mod config;
pub mod encoder;
pub mod error;
pub mod queue;
pub mod registry;
pub mod service;
pub mod worker;

pub use bridge::{HostBridge, HostLoop, HostMessage, PendingResult, RequestId, Subscriber};
pub use cache::{OperationCache, OperationHandle};
pub use config::ServiceConfig;
pub use error::ServiceError;
pub use queue::PayloadQueue;
pub use registry::{SubscriptionHandle, SubscriptionRegistry};
pub use service::{OperationSource, Service};
pub use worker::{DispatchWorker, WorkerPool, WorkerState};
