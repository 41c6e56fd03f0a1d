//! Structured GraphQL errors.

use hgql_core::{Position, Span};
use hgql_syntax::{Document, SyntaxError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A location in the request document, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl From<Position> for Location {
    fn from(position: Position) -> Self {
        Self {
            line: position.line,
            column: position.column,
        }
    }
}

/// A segment of a response path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field response key.
    Field(String),
    /// A list index.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Field(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A GraphQL error as it appears in the `errors` list of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
}

impl GraphQLError {
    /// Creates an error without location or path.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
        }
    }

    /// Adds a location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    /// Adds the location of a span within a document.
    #[must_use]
    pub fn at(self, document: &Document, span: Span) -> Self {
        self.with_location(document.position(span).into())
    }

    /// Sets the response path.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }
}

impl From<SyntaxError> for GraphQLError {
    fn from(error: SyntaxError) -> Self {
        Self::new(format!("Syntax Error: {}", error.message))
            .with_location(error.position.into())
    }
}

/// The stage at which a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Validation,
    Variables,
    Operation,
    Execution,
    Subscription,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Syntax => "syntax error",
            Self::Validation => "validation error",
            Self::Variables => "variables error",
            Self::Operation => "operation error",
            Self::Execution => "execution error",
            Self::Subscription => "subscription error",
        };
        f.write_str(s)
    }
}

/// A request-level failure carrying one or more structured errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_messages(.errors))]
pub struct EngineError {
    pub kind: ErrorKind,
    pub errors: Vec<GraphQLError>,
}

impl EngineError {
    /// Creates an error of the given kind from a list of errors.
    pub fn new(kind: ErrorKind, errors: Vec<GraphQLError>) -> Self {
        Self { kind, errors }
    }

    /// Creates an error of the given kind with a single message.
    pub fn message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, vec![GraphQLError::new(message)])
    }
}

impl From<SyntaxError> for EngineError {
    fn from(error: SyntaxError) -> Self {
        Self::new(ErrorKind::Syntax, vec![error.into()])
    }
}

fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization_skips_empty_fields() {
        let error = GraphQLError::new("boom");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({"message": "boom"})
        );

        let error = GraphQLError::new("boom")
            .with_location(Location { line: 1, column: 3 })
            .with_path(vec!["tasks".into(), 0.into(), "title".into()]);
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({
                "message": "boom",
                "locations": [{"line": 1, "column": 3}],
                "path": ["tasks", 0, "title"]
            })
        );
    }

    #[test]
    fn test_engine_error_display_joins_messages() {
        let error = EngineError::new(
            ErrorKind::Validation,
            vec![GraphQLError::new("first"), GraphQLError::new("second")],
        );
        assert_eq!(error.to_string(), "first; second");
    }
}
