//! GraphQL execution engine for hgql.
//!
//! This crate provides the execution side of the service:
//! - `engine`: The `Engine` trait consumed by the runtime
//! - `schema`: Type system and schema builder
//! - `resolver`: Field resolvers and resolved values
//! - `validation`: Document validation against a schema
//! - `coerce`: Variable and argument coercion
//! - `execute`: Selection set execution
//! - `executor`: Reference `Engine` implementation with subscriptions
//! - `id`: Base64 encoded `ID` values

pub mod coerce;
pub mod engine;
pub mod error;
pub mod execute;
pub mod executor;
pub mod id;
pub mod resolver;
pub mod response;
pub mod schema;
pub mod validation;

pub use engine::{
    DeliveryCallback, Engine, RequestParams, SubscriptionKey, SubscriptionParams,
};
pub use error::{EngineError, ErrorKind, GraphQLError, Location, PathSegment};
pub use executor::{DeliveryParams, Executor, ExecutorConfig};
pub use hgql_syntax::{Document, OperationKind};
pub use resolver::{FieldContext, ObjectValue, Resolved, ResolverError, ResolverMap};
pub use response::Response;
pub use schema::{Schema, SchemaBuilder, SchemaError, TypeKind, TypeRef};
