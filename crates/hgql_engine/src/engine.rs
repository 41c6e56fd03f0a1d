//! The engine interface the runtime dispatches work to.

use crate::error::{EngineError, ErrorKind};
use crate::response::Response;
use hgql_syntax::{Document, OperationDefinition, OperationKind};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Key of a subscription registered with an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey(pub u64);

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback receiving subscription payloads. May be invoked from any thread.
pub type DeliveryCallback = Arc<dyn Fn(Response) + Send + Sync>;

/// A request to run one operation of a document.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub document: Arc<Document>,
    pub operation_name: Option<String>,
    pub variables: Map<String, Value>,
}

impl RequestParams {
    /// Creates request parameters.
    pub fn new(document: Arc<Document>) -> Self {
        Self {
            document,
            operation_name: None,
            variables: Map::new(),
        }
    }

    /// Selects an operation by name. An empty name selects the only one.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.operation_name = (!name.is_empty()).then_some(name);
        self
    }

    /// Sets the variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }
}

/// A request to register a subscription.
#[derive(Clone)]
pub struct SubscriptionParams {
    pub request: RequestParams,
    pub callback: DeliveryCallback,
}

impl fmt::Debug for SubscriptionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionParams")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// A GraphQL engine: parses, validates and executes operations.
///
/// All methods may be called from worker threads.
pub trait Engine: Send + Sync {
    /// Parses and validates a document.
    fn parse(&self, query: &str) -> Result<Document, EngineError>;

    /// Determines the kind of the operation a request would run.
    fn find_operation(
        &self,
        document: &Document,
        operation_name: Option<&str>,
    ) -> Result<OperationKind, EngineError> {
        select_operation(document, operation_name).map(|op| op.kind)
    }

    /// Runs a query or mutation to completion.
    fn resolve(&self, params: RequestParams) -> Result<Response, EngineError>;

    /// Registers a subscription. Payloads are handed to the callback until
    /// the returned key is unsubscribed.
    fn subscribe(&self, params: SubscriptionParams) -> Result<SubscriptionKey, EngineError>;

    /// Removes a subscription. Unknown keys are ignored.
    fn unsubscribe(&self, key: SubscriptionKey);
}

/// Selects the operation of a document by name.
pub fn select_operation<'d>(
    document: &'d Document,
    operation_name: Option<&str>,
) -> Result<&'d OperationDefinition, EngineError> {
    document.operation(operation_name).ok_or_else(|| {
        let message = match operation_name.filter(|n| !n.is_empty()) {
            Some(name) => format!("Unknown operation named \"{name}\"."),
            None if document.operations().next().is_none() => {
                "Must provide an operation.".to_string()
            }
            None => "Must provide operation name if query contains multiple operations."
                .to_string(),
        };
        EngineError::message(ErrorKind::Operation, message)
    })
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
