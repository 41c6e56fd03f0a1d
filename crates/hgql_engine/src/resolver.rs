//! Field resolvers.
//!
//! A resolver is registered per `(type, field)` pair and returns a
//! [`Resolved`] value: a JSON leaf, a typed object, a list or null. Typed
//! objects carry their runtime type name so interface fields dispatch to the
//! right object type.

use crate::executor::Executor;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An object value with its runtime GraphQL type.
#[derive(Clone)]
pub struct ObjectValue {
    type_name: String,
    source: Arc<dyn Any + Send + Sync>,
}

impl ObjectValue {
    /// Wraps a value as an object of the given type.
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, source: T) -> Self {
        Self::from_arc(type_name, Arc::new(source))
    }

    /// Wraps a shared value as an object of the given type.
    pub fn from_arc<T: Any + Send + Sync>(type_name: impl Into<String>, source: Arc<T>) -> Self {
        Self {
            type_name: type_name.into(),
            source,
        }
    }

    /// Returns the runtime type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the wrapped value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.source.downcast_ref::<T>()
    }

    /// Reads a property when the object is backed by a JSON value.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.downcast_ref::<Value>().and_then(|v| v.get(name))
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// The value produced by a resolver.
#[derive(Debug, Clone, Default)]
pub enum Resolved {
    #[default]
    Null,
    /// A JSON value: a leaf, or an object read through properties.
    Value(Value),
    /// A typed object.
    Object(ObjectValue),
    /// A list of values.
    List(Vec<Resolved>),
}

impl Resolved {
    /// Creates a JSON value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Creates a typed object.
    pub fn object<T: Any + Send + Sync>(type_name: impl Into<String>, source: T) -> Self {
        Self::Object(ObjectValue::new(type_name, source))
    }

    /// Creates a list.
    pub fn list(items: impl IntoIterator<Item = Resolved>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Returns true for null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Value(Value::Null))
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<ObjectValue> for Resolved {
    fn from(object: ObjectValue) -> Self {
        Self::Object(object)
    }
}

impl<T: Into<Resolved>> From<Option<T>> for Resolved {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Error from a resolver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Failed to parse argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },

    #[error("Unexpected parent value for {0}")]
    UnexpectedParent(String),

    #[error("{0}")]
    Custom(String),
}

impl ResolverError {
    /// Creates a custom error.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<Resolved, ResolverError>;

/// Inputs available to a resolver.
pub struct FieldContext<'a> {
    pub parent: &'a ObjectValue,
    pub field_name: &'a str,
    pub args: &'a Map<String, Value>,
    pub executor: &'a Executor,
}

impl<'a> FieldContext<'a> {
    /// Gets an argument by name.
    pub fn arg(&self, name: &str) -> Option<&'a Value> {
        self.args.get(name)
    }

    /// Gets a required argument as a specific type.
    pub fn arg_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        let value = self
            .args
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| ResolverError::InvalidArgument {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Gets the parent value as `T`.
    pub fn parent_as<T: Any>(&self) -> Result<&'a T, ResolverError> {
        self.parent.downcast_ref::<T>().ok_or_else(|| {
            let field = format!("{}.{}", self.parent.type_name(), self.field_name);
            ResolverError::UnexpectedParent(field)
        })
    }
}

/// A field resolver.
pub type ResolverFn = Arc<dyn Fn(&FieldContext<'_>) -> ResolverResult + Send + Sync>;

/// Resolvers keyed by `(type, field)`.
#[derive(Clone, Default)]
pub struct ResolverMap {
    resolvers: FxHashMap<String, FxHashMap<String, ResolverFn>>,
}

impl ResolverMap {
    /// Creates an empty resolver map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resolver for a field.
    pub fn register<F>(&mut self, type_name: &str, field_name: &str, resolver: F)
    where
        F: Fn(&FieldContext<'_>) -> ResolverResult + Send + Sync + 'static,
    {
        self.resolvers
            .entry(type_name.to_string())
            .or_default()
            .insert(field_name.to_string(), Arc::new(resolver));
    }

    /// Registers a resolver, builder style.
    #[must_use]
    pub fn with<F>(mut self, type_name: &str, field_name: &str, resolver: F) -> Self
    where
        F: Fn(&FieldContext<'_>) -> ResolverResult + Send + Sync + 'static,
    {
        self.register(type_name, field_name, resolver);
        self
    }

    /// Finds the resolver for a field.
    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&ResolverFn> {
        self.resolvers.get(type_name)?.get(field_name)
    }

    /// Returns the number of registered resolvers.
    pub fn len(&self) -> usize {
        self.resolvers.values().map(|fields| fields.len()).sum()
    }

    /// Returns true if no resolvers are registered.
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolverMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverMap")
            .field("count", &self.len())
            .finish()
    }
}
