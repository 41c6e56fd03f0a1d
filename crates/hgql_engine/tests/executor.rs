use hgql_engine::{
    DeliveryParams, Engine, ErrorKind, Executor, ObjectValue, RequestParams, Resolved,
    ResolverError, ResolverMap, Response, Schema, SubscriptionParams,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Debug)]
struct Task {
    id: &'static str,
    title: &'static str,
}

static TASKS: [Task; 2] = [
    Task {
        id: "t1",
        title: "Write tests",
    },
    Task {
        id: "t2",
        title: "Ship",
    },
];

fn executor() -> Executor {
    let schema = Schema::builder()
        .interface("Node", |t| t.field("id", "ID!"))
        .object("Task", |t| {
            t.implements("Node")
                .field("id", "ID!")
                .field("title", "String")
                .field("broken", "String!")
        })
        .object("Query", |t| {
            t.field("tasks", "[Task]")
                .field("required", "Task!")
                .field("folder", "Node")
                .field_with("node", "Node", |f| f.argument("id", "ID!"))
                .field_with("echo", "Int", |f| f.argument_with_default("value", "Int", json!(7)))
        })
        .object("Folder", |t| t.implements("Node").field("id", "ID!").field("name", "String"))
        .object("Subscription", |t| {
            t.field_with("taskChange", "Task!", |f| f.argument("id", "ID!"))
        })
        .build()
        .unwrap();

    let resolvers = ResolverMap::new()
        .with("Query", "tasks", |_| {
            Ok(Resolved::list(
                TASKS.iter().map(|task| Resolved::object("Task", task)),
            ))
        })
        .with("Query", "required", |_| Ok(Resolved::Null))
        .with("Query", "folder", |_| {
            Ok(Resolved::value(json!({"__typename": "Folder", "id": "f1", "name": "Inbox"})))
        })
        .with("Query", "node", |ctx| {
            let id: String = ctx.arg_as("id")?;
            Ok(TASKS
                .iter()
                .find(|task| task.id == id)
                .map(|task| Resolved::object("Task", task))
                .into())
        })
        .with("Query", "echo", |ctx| Ok(ctx.arg("value").cloned().into()))
        .with("Task", "id", |ctx| {
            let task = ctx.parent_as::<&Task>()?;
            Ok(Resolved::value(task.id))
        })
        .with("Task", "title", |ctx| {
            let task = ctx.parent_as::<&Task>()?;
            Ok(Resolved::value(task.title))
        })
        .with("Task", "broken", |_| Err(ResolverError::custom("broken resolver")))
        .with("Subscription", "taskChange", |ctx| {
            let id: String = ctx.arg_as("id")?;
            Ok(TASKS
                .iter()
                .find(|task| task.id == id)
                .map(|task| Resolved::object("Task", task))
                .into())
        });

    Executor::new(schema, resolvers)
}

fn run(executor: &Executor, query: &str, variables: Value) -> Response {
    let document = Arc::new(executor.parse(query).unwrap());
    let variables = variables.as_object().cloned().unwrap_or_default();
    executor
        .resolve(RequestParams::new(document).with_variables(variables))
        .unwrap()
}

#[test]
fn test_query_with_interface_dispatch() {
    let executor = executor();
    let response = run(
        &executor,
        r#"{ node(id: "t2") { __typename id ...on Task { title } } }"#,
        json!({}),
    );
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"data": {"node": {"__typename": "Task", "id": "t2", "title": "Ship"}}})
    );
}

#[test]
fn test_json_object_with_typename_dispatches() {
    let executor = executor();
    let response = run(&executor, "{ folder { id ...on Folder { name } } }", json!({}));
    assert_eq!(
        response.data,
        Some(json!({"folder": {"id": "f1", "name": "Inbox"}}))
    );
    assert!(response.errors.is_empty());
}

#[test]
fn test_field_error_nulls_nearest_nullable_position() {
    let executor = executor();
    let response = run(&executor, "{ tasks { id broken } }", json!({}));
    assert_eq!(response.data, Some(json!({"tasks": [null, null]})));
    assert_eq!(response.errors.len(), 2);
    assert_eq!(
        serde_json::to_value(&response.errors[0]).unwrap(),
        json!({
            "message": "broken resolver",
            "locations": [{"line": 1, "column": 14}],
            "path": ["tasks", 0, "broken"]
        })
    );
}

#[test]
fn test_null_in_non_null_root_field_nulls_data() {
    let executor = executor();
    let response = run(&executor, "{ required { id } }", json!({}));
    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(
        response.errors[0].message,
        "Cannot return null for non-nullable field Query.required."
    );
}

#[test]
fn test_variables_and_defaults() {
    let executor = executor();
    let response = run(&executor, "query ($v: Int) { echo(value: $v) }", json!({"v": 3}));
    assert_eq!(response.data, Some(json!({"echo": 3})));

    let response = run(&executor, "query ($v: Int) { echo(value: $v) }", json!({}));
    assert_eq!(response.data, Some(json!({"echo": 7})));

    let response = run(&executor, "{ a: echo b: echo(value: 1) @skip(if: true) }", json!({}));
    assert_eq!(response.data, Some(json!({"a": 7})));
}

#[test]
fn test_missing_required_variable_is_a_request_error() {
    let executor = executor();
    let document = Arc::new(executor.parse("query ($id: ID!) { node(id: $id) { id } }").unwrap());
    let error = executor.resolve(RequestParams::new(document)).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Variables);
    assert_eq!(
        error.to_string(),
        "Variable \"$id\" of required type \"ID!\" was not provided."
    );
}

#[test]
fn test_parse_reports_syntax_and_validation_errors() {
    let executor = executor();

    let error = executor.parse("{ tasks {").unwrap_err();
    assert_eq!(error.kind, ErrorKind::Syntax);
    assert_eq!(error.errors[0].locations.len(), 1);

    let error = executor.parse("{ nope }").unwrap_err();
    assert_eq!(error.kind, ErrorKind::Validation);
    assert_eq!(error.to_string(), "Cannot query field \"nope\" on type \"Query\".");
}

#[test]
fn test_find_operation() {
    let executor = executor();
    let document = executor
        .parse("query Q { tasks { id } } subscription S { taskChange(id: \"t1\") { id } }")
        .unwrap();
    assert_eq!(
        executor.find_operation(&document, Some("S")).unwrap(),
        hgql_engine::OperationKind::Subscription
    );
    assert!(executor.find_operation(&document, None).is_err());
}

fn subscribe(
    executor: &Executor,
    query: &str,
    sink: &Arc<Mutex<Vec<Response>>>,
) -> hgql_engine::SubscriptionKey {
    let document = Arc::new(executor.parse(query).unwrap());
    let sink = Arc::clone(sink);
    executor
        .subscribe(SubscriptionParams {
            request: RequestParams::new(document),
            callback: Arc::new(move |response: Response| sink.lock().push(response)),
        })
        .unwrap()
}

fn root() -> ObjectValue {
    ObjectValue::new("Subscription", Map::new())
}

#[test]
fn test_deliver_matches_field_and_filter() {
    let executor = executor();
    let sink = Arc::new(Mutex::new(Vec::new()));
    let key = subscribe(&executor, r#"subscription { taskChange(id: "t1") { title } }"#, &sink);
    subscribe(&executor, r#"subscription { taskChange(id: "t2") { title } }"#, &sink);
    assert_eq!(executor.subscription_count(), 2);

    let delivered = executor.deliver(DeliveryParams::new("taskChange", root()).with_filter("id", "t1"));
    assert_eq!(delivered, 1);
    assert_eq!(
        sink.lock().as_slice(),
        &[Response::data(json!({"taskChange": {"title": "Write tests"}}))]
    );

    executor.unsubscribe(key);
    executor.unsubscribe(key);
    assert_eq!(executor.subscription_count(), 1);
    assert_eq!(
        executor.deliver(DeliveryParams::new("taskChange", root()).with_filter("id", "t1")),
        0
    );

    // Without a filter every subscription on the field matches.
    assert_eq!(executor.deliver(DeliveryParams::new("taskChange", root())), 1);
    assert_eq!(sink.lock().len(), 2);
}

#[test]
fn test_panicking_callback_does_not_stop_delivery() {
    let executor = executor();
    let document = Arc::new(
        executor
            .parse(r#"subscription { taskChange(id: "t1") { id } }"#)
            .unwrap(),
    );
    executor
        .subscribe(SubscriptionParams {
            request: RequestParams::new(Arc::clone(&document)),
            callback: Arc::new(|_: Response| panic!("callback failed")),
        })
        .unwrap();

    let sink = Arc::new(Mutex::new(Vec::new()));
    subscribe(&executor, r#"subscription { taskChange(id: "t1") { id } }"#, &sink);

    assert_eq!(executor.deliver(DeliveryParams::new("taskChange", root())), 2);
    assert_eq!(sink.lock().len(), 1);
}

#[test]
fn test_panicking_resolver_delivers_error_payload() {
    let schema = Schema::builder()
        .object("Query", |t| t.field("ping", "String"))
        .object("Subscription", |t| t.field("tick", "Int"))
        .build()
        .unwrap();
    let resolvers = ResolverMap::new().with("Subscription", "tick", |_| panic!("tick failed"));
    let executor = Executor::new(schema, resolvers);

    let sink = Arc::new(Mutex::new(Vec::new()));
    subscribe(&executor, "subscription { tick }", &sink);

    assert_eq!(executor.deliver(DeliveryParams::new("tick", root())), 1);
    assert_eq!(
        sink.lock().as_slice(),
        &[Response::error(
            "Caught exception delivering subscription payload: tick failed"
        )]
    );
}

#[test]
fn test_subscribe_rejects_queries() {
    let executor = executor();
    let document = Arc::new(executor.parse("{ tasks { id } }").unwrap());
    let error = executor
        .subscribe(SubscriptionParams {
            request: RequestParams::new(document),
            callback: Arc::new(|_: Response| {}),
        })
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::Subscription);
}

#[test]
fn test_resolve_rejects_subscriptions() {
    let executor = executor();
    let document = Arc::new(
        executor
            .parse(r#"subscription { taskChange(id: "t1") { id } }"#)
            .unwrap(),
    );
    let error = executor.resolve(RequestParams::new(document)).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Operation);
}
