//! Reference [`Engine`] implementation.
//!
//! Subscriptions are event driven: [`Executor::deliver`] runs every
//! registered subscription whose root field and arguments match the event
//! against the supplied root object, and hands each result to the
//! subscription's callback.

use crate::coerce::{coerce_argument_values, coerce_variable_values};
use crate::engine::{
    panic_message, select_operation, DeliveryCallback, Engine, RequestParams, SubscriptionKey,
    SubscriptionParams,
};
use crate::error::{EngineError, ErrorKind, GraphQLError};
use crate::execute::Execution;
use crate::resolver::{ObjectValue, ResolverMap};
use crate::response::Response;
use crate::schema::{Schema, TypeDefinition};
use crate::validation;
use hgql_syntax::{Document, OperationDefinition, OperationKind};
use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum selection depth accepted by validation.
    pub max_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_depth: 15 }
    }
}

impl ExecutorConfig {
    /// Creates a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum selection depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// An event to deliver to matching subscriptions.
#[derive(Debug, Clone)]
pub struct DeliveryParams {
    /// Root subscription field the event belongs to.
    pub field: String,
    /// Argument values a subscription must have been registered with.
    pub filter: Map<String, Value>,
    /// Root object the subscription selection is executed against.
    pub root: ObjectValue,
}

impl DeliveryParams {
    /// Creates an event for a root field.
    pub fn new(field: impl Into<String>, root: ObjectValue) -> Self {
        Self {
            field: field.into(),
            filter: Map::new(),
            root,
        }
    }

    /// Restricts delivery to subscriptions with a matching argument.
    #[must_use]
    pub fn with_filter(mut self, argument: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(argument.into(), value.into());
        self
    }

    fn matches(&self, registration: &Registration) -> bool {
        registration.field == self.field
            && self
                .filter
                .iter()
                .all(|(name, value)| registration.arguments.get(name) == Some(value))
    }
}

/// A registered subscription.
struct Registration {
    document: Arc<Document>,
    operation_name: Option<String>,
    variables: Map<String, Value>,
    field: String,
    arguments: Map<String, Value>,
    callback: DeliveryCallback,
}

/// The query executor.
pub struct Executor {
    schema: Arc<Schema>,
    resolvers: ResolverMap,
    config: ExecutorConfig,
    subscriptions: Mutex<FxHashMap<SubscriptionKey, Arc<Registration>>>,
    next_key: AtomicU64,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("resolvers", &self.resolvers)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl Executor {
    /// Creates an executor.
    pub fn new(schema: Schema, resolvers: ResolverMap) -> Self {
        Self::with_config(schema, resolvers, ExecutorConfig::default())
    }

    /// Creates an executor with configuration.
    pub fn with_config(schema: Schema, resolvers: ResolverMap, config: ExecutorConfig) -> Self {
        Self {
            schema: Arc::new(schema),
            resolvers,
            config,
            subscriptions: Mutex::new(FxHashMap::default()),
            next_key: AtomicU64::new(1),
        }
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the resolvers.
    pub fn resolvers(&self) -> &ResolverMap {
        &self.resolvers
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Validates a document against the schema.
    pub fn validate(&self, document: &Document) -> Vec<GraphQLError> {
        validation::validate(&self.schema, document, self.config.max_depth)
    }

    /// Returns the number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    fn root_type(&self, operation: &OperationDefinition) -> Result<&TypeDefinition, EngineError> {
        self.schema.root_type(operation.kind).ok_or_else(|| {
            EngineError::message(
                ErrorKind::Operation,
                format!("Schema is not configured to execute {} operation.", operation.kind),
            )
        })
    }

    /// Executes one operation of a document.
    ///
    /// `root` defaults to an empty object of the operation's root type.
    pub fn execute(
        &self,
        document: &Document,
        operation_name: Option<&str>,
        variables: &Map<String, Value>,
        root: Option<&ObjectValue>,
    ) -> Result<Response, EngineError> {
        let operation = select_operation(document, operation_name)?;
        let root_type = self.root_type(operation)?;
        let variables = coerce_variable_values(&self.schema, document, operation, variables)
            .map_err(|errors| EngineError::new(ErrorKind::Variables, errors))?;

        let default_root;
        let root = match root {
            Some(root) => root,
            None => {
                default_root = ObjectValue::new(root_type.name.clone(), Value::Object(Map::new()));
                &default_root
            }
        };

        Ok(Execution::new(self, document, &variables).execute_operation(operation, root_type, root))
    }

    /// Delivers an event to every matching subscription and returns how many
    /// were notified.
    ///
    /// Callbacks run outside the subscription lock, so they may subscribe or
    /// unsubscribe. A panic while producing one payload is logged and handed
    /// to that subscription as an error response. A panicking callback is
    /// logged and does not affect the other subscriptions.
    pub fn deliver(&self, params: DeliveryParams) -> usize {
        let matching: Vec<(SubscriptionKey, Arc<Registration>)> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|(_, registration)| params.matches(registration))
            .map(|(key, registration)| (*key, Arc::clone(registration)))
            .collect();

        debug!(field = %params.field, count = matching.len(), "delivering subscription event");

        matching.par_iter().for_each(|(key, registration)| {
            let response = panic::catch_unwind(AssertUnwindSafe(|| {
                self.execute(
                    &registration.document,
                    registration.operation_name.as_deref(),
                    &registration.variables,
                    Some(&params.root),
                )
                .unwrap_or_else(Response::from)
            }))
            .unwrap_or_else(|payload| {
                let message = format!(
                    "Caught exception delivering subscription payload: {}",
                    panic_message(&*payload)
                );
                error!(key = %key, "{message}");
                Response::error(message)
            });

            let handed = panic::catch_unwind(AssertUnwindSafe(|| (registration.callback)(response)));
            if let Err(payload) = handed {
                error!(
                    key = %key,
                    "Caught exception in subscription callback: {}",
                    panic_message(&*payload)
                );
            }
        });

        matching.len()
    }
}

impl Engine for Executor {
    fn parse(&self, query: &str) -> Result<Document, EngineError> {
        let document = hgql_syntax::parse_document(query)?;
        let errors = self.validate(&document);
        if errors.is_empty() {
            Ok(document)
        } else {
            Err(EngineError::new(ErrorKind::Validation, errors))
        }
    }

    fn resolve(&self, params: RequestParams) -> Result<Response, EngineError> {
        let operation = select_operation(&params.document, params.operation_name.as_deref())?;
        if operation.kind == OperationKind::Subscription {
            return Err(EngineError::message(
                ErrorKind::Operation,
                "Subscription operations must be subscribed to, not resolved.",
            ));
        }
        self.execute(
            &params.document,
            params.operation_name.as_deref(),
            &params.variables,
            None,
        )
    }

    fn subscribe(&self, params: SubscriptionParams) -> Result<SubscriptionKey, EngineError> {
        let SubscriptionParams { request, callback } = params;
        let document = &request.document;
        let operation = select_operation(document, request.operation_name.as_deref())?;
        if operation.kind != OperationKind::Subscription {
            return Err(EngineError::message(
                ErrorKind::Subscription,
                format!("Cannot subscribe to a {} operation.", operation.kind),
            ));
        }

        let root_type = self.root_type(operation)?;
        let variables = coerce_variable_values(&self.schema, document, operation, &request.variables)
            .map_err(|errors| EngineError::new(ErrorKind::Variables, errors))?;

        let (field, arguments) = {
            let execution = Execution::new(self, document, &variables);
            let root_fields = execution.root_fields(root_type, operation);
            let mut fields = root_fields.values().filter_map(|group| group.first());
            let (Some(field), None) = (fields.next(), fields.next()) else {
                return Err(EngineError::message(
                    ErrorKind::Subscription,
                    "Subscription must select exactly one top level field.",
                ));
            };
            let definition = root_type.field(field.name.as_str()).ok_or_else(|| {
                EngineError::message(
                    ErrorKind::Subscription,
                    format!("Unknown subscription field \"{}\".", field.name),
                )
            })?;
            let arguments = coerce_argument_values(
                &self.schema,
                &definition.arguments,
                &field.arguments,
                &variables,
            )
            .map_err(|message| {
                EngineError::new(
                    ErrorKind::Subscription,
                    vec![GraphQLError::new(message).at(document, field.span)],
                )
            })?;
            (field.name.value.clone(), arguments)
        };

        let key = SubscriptionKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        debug!(key = %key, field = %field, "registered subscription");

        let registration = Registration {
            document: Arc::clone(document),
            operation_name: request.operation_name.clone(),
            variables,
            field,
            arguments,
            callback,
        };
        self.subscriptions.lock().insert(key, Arc::new(registration));
        Ok(key)
    }

    fn unsubscribe(&self, key: SubscriptionKey) {
        if self.subscriptions.lock().remove(&key).is_some() {
            debug!(key = %key, "removed subscription");
        }
    }
}
