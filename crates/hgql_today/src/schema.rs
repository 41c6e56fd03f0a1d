//! Type definitions of the today schema.

use hgql_engine::{Schema, SchemaError};
use serde_json::json;

/// Builds the today schema.
pub fn schema() -> Result<Schema, SchemaError> {
    Schema::builder()
        .interface("Node", |t| t.field("id", "ID!"))
        .object("Appointment", |t| {
            t.implements("Node")
                .field("id", "ID!")
                .field("when", "String")
                .field("subject", "String")
                .field("isNow", "Boolean!")
        })
        .object("Task", |t| {
            t.implements("Node")
                .field("id", "ID!")
                .field("title", "String")
                .field("isComplete", "Boolean!")
        })
        .object("Folder", |t| {
            t.implements("Node")
                .field("id", "ID!")
                .field("name", "String")
                .field("unreadCount", "Int!")
        })
        .object("Query", |t| {
            t.field("appointments", "[Appointment!]!")
                .field("tasks", "[Task!]!")
                .field("unreadCounts", "[Folder!]!")
                .field_with("node", "Node", |f| f.argument("id", "ID!"))
        })
        .input_object("CompleteTaskInput", |t| {
            t.input_field("id", "ID!")
                .input_field_with_default("isComplete", "Boolean", json!(true))
                .input_field("clientMutationId", "String")
        })
        .object("CompleteTaskPayload", |t| {
            t.field("task", "Task").field("clientMutationId", "String")
        })
        .object("Mutation", |t| {
            t.field_with("completeTask", "CompleteTaskPayload!", |f| {
                f.argument("input", "CompleteTaskInput!")
            })
        })
        .object("Subscription", |t| {
            t.field_with("nodeChange", "Node!", |f| f.argument("id", "ID!"))
                .field("nextAppointmentChange", "Appointment")
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgql_engine::{OperationKind, TypeKind};

    #[test]
    fn test_schema_roots() {
        let schema = schema().unwrap();
        assert_eq!(schema.root_type(OperationKind::Query).unwrap().name, "Query");
        assert_eq!(schema.root_type(OperationKind::Mutation).unwrap().name, "Mutation");
        assert_eq!(
            schema.root_type(OperationKind::Subscription).unwrap().name,
            "Subscription"
        );
    }

    #[test]
    fn test_node_implementations() {
        let schema = schema().unwrap();
        let node = schema.get_type("Node").unwrap();
        assert_eq!(node.kind, TypeKind::Interface);
        for name in ["Appointment", "Task", "Folder"] {
            assert!(schema.is_possible_type(node, name), "{name} should implement Node");
        }
    }
}
