//! GraphQL response values.

use crate::error::{EngineError, GraphQLError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A GraphQL response: `data` plus any errors raised while producing it.
///
/// Both may be present for a partial success. `errors` is omitted from the
/// serialized form when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Creates a response that only carries errors.
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self { data: None, errors }
    }

    /// Creates a response with a single error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::errors(vec![GraphQLError::new(message)])
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl From<EngineError> for Response {
    fn from(error: EngineError) -> Self {
        Self::errors(error.errors)
    }
}
