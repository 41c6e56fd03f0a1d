//! Result normalization and JSON encoding.

use hgql_engine::{EngineError, Response};
use serde_json::Value;
use tracing::warn;

/// What an engine call produced: a response or a request-level error.
pub type Outcome = Result<Response, EngineError>;

/// Turns an engine outcome into a response. Request errors become a
/// response with `data: null` and the engine's errors.
pub fn normalize(outcome: Outcome) -> Response {
    outcome.unwrap_or_else(Response::from)
}

/// Serializes a response to JSON text.
pub fn encode(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|error| {
        warn!(%error, "failed to encode response");
        let message = Value::String(format!("Failed to encode response: {error}"));
        format!(r#"{{"data":null,"errors":[{{"message":{message}}}]}}"#)
    })
}

/// Normalizes and serializes an engine outcome.
pub fn encode_outcome(outcome: Outcome) -> String {
    encode(&normalize(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgql_engine::{ErrorKind, GraphQLError, Location, PathSegment};
    use serde_json::json;

    #[test]
    fn test_encode_data_only() {
        let response = Response::data(json!({"appointments": [{"id": "ZmFrZUFwcG9pbnRtZW50SWQ="}]}));
        insta::assert_snapshot!(encode(&response), @r#"{"data":{"appointments":[{"id":"ZmFrZUFwcG9pbnRtZW50SWQ="}]}}"#);
    }

    #[test]
    fn test_encode_partial_success() {
        let response = Response {
            data: Some(json!({"task": null})),
            errors: vec![GraphQLError::new("boom")
                .with_location(Location { line: 1, column: 3 })
                .with_path(vec![PathSegment::Field("task".into())])],
        };
        insta::assert_snapshot!(encode(&response), @r#"{"data":{"task":null},"errors":[{"message":"boom","locations":[{"line":1,"column":3}],"path":["task"]}]}"#);
    }

    #[test]
    fn test_normalize_engine_error() {
        let outcome: Outcome = Err(EngineError::message(ErrorKind::Variables, "bad variable"));
        insta::assert_snapshot!(encode_outcome(outcome), @r#"{"data":null,"errors":[{"message":"bad variable"}]}"#);
    }
}
