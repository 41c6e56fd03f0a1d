use hgql_engine::Executor;
use hgql_runtime::{
    OperationHandle, Service, ServiceConfig, ServiceError, Subscriber, SubscriptionHandle,
};
use hgql_today::TodayStore;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const APPOINTMENTS: &str = "{ appointments { id } }";

const NODE_CHANGE: &str = r#"subscription {
    nodeChange(id: "ZmFrZVRhc2tJZA==") {
        id
        ... on Task { isComplete }
    }
}"#;

const COMPLETE_TASK: &str = r#"mutation Complete($complete: Boolean) {
    completeTask(input: {id: "ZmFrZVRhc2tJZA==", isComplete: $complete}) {
        task { isComplete }
    }
}"#;

fn started() -> Service {
    let mut service = Service::default();
    service.start(hgql_today::engine().unwrap()).unwrap();
    service
}

/// Subscriber forwarding payloads to a channel and flagging completion.
fn channel_subscriber() -> (Subscriber, mpsc::UnboundedReceiver<String>, Rc<Cell<bool>>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let completed = Rc::new(Cell::new(false));
    let flag = Rc::clone(&completed);
    let subscriber = Subscriber::new(move |payload| {
        let _ = sender.send(payload.to_string());
    })
    .on_complete(move || flag.set(true));
    (subscriber, receiver, completed)
}

async fn execute(service: &mut Service, source: OperationHandle, variables: &str) -> String {
    let pending = service.execute(source, "", variables).unwrap();
    service.run_until(pending).await.unwrap()
}

async fn run_until_completed(service: &mut Service, completed: &Cell<bool>) {
    while !completed.get() {
        service.turn().await;
    }
}

#[tokio::test]
async fn test_parse_and_execute() {
    let mut service = started();
    let handle = service.parse(APPOINTMENTS).unwrap();
    assert_eq!(handle, OperationHandle(1));

    assert_eq!(
        execute(&mut service, handle, "{}").await,
        r#"{"data":{"appointments":[{"id":"ZmFrZUFwcG9pbnRtZW50SWQ="}]}}"#
    );
}

#[tokio::test]
async fn test_cached_and_text_operations_agree() {
    let mut service = started();
    let handle = service.parse(APPOINTMENTS).unwrap();
    let cached = execute(&mut service, handle, "").await;

    let pending = service.execute(APPOINTMENTS, "", "").unwrap();
    let text = service.run_until(pending).await.unwrap();
    assert_eq!(cached, text);
}

#[tokio::test]
async fn test_execute_with_variables() {
    let mut service = started();
    let handle = service
        .parse("query Node($id: ID!) { node(id: $id) { __typename id } }")
        .unwrap();
    assert_eq!(
        execute(&mut service, handle, r#"{"id": "ZmFrZUZvbGRlcklk"}"#).await,
        r#"{"data":{"node":{"__typename":"Folder","id":"ZmFrZUZvbGRlcklk"}}}"#
    );
}

#[tokio::test]
async fn test_execute_rejections() {
    let mut service = started();

    let pending = service.execute(OperationHandle(999), "", "").unwrap();
    let error = service.run_until(pending).await.unwrap_err();
    assert!(error.to_string().starts_with("unknown operation"));

    let handle = service.parse(APPOINTMENTS).unwrap();
    let pending = service.execute(handle, "", "not json").unwrap();
    let error = service.run_until(pending).await.unwrap_err();
    assert_eq!(error.to_string(), "invalid variables object");

    let pending = service.execute(NODE_CHANGE, "", "").unwrap();
    let error = service.run_until(pending).await.unwrap_err();
    assert!(matches!(error, ServiceError::StreamingRequired));

    let pending = service.execute("{ appointments { missing } }", "", "").unwrap();
    let error = service.run_until(pending).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        "Cannot query field \"missing\" on type \"Appointment\"."
    );
}

#[tokio::test]
async fn test_discarded_handle_is_unknown() {
    let mut service = started();
    let handle = service.parse(APPOINTMENTS).unwrap();
    service.discard(handle);
    service.discard(handle);

    let pending = service.execute(handle, "", "").unwrap();
    assert!(matches!(
        service.run_until(pending).await,
        Err(ServiceError::UnknownOperation(1))
    ));
}

#[tokio::test]
async fn test_not_started() {
    let mut service = Service::default();
    assert!(!service.is_started());
    assert!(matches!(service.parse(APPOINTMENTS), Err(ServiceError::NotStarted)));
    assert!(matches!(
        service.execute(APPOINTMENTS, "", ""),
        Err(ServiceError::NotStarted)
    ));
    let (subscriber, _, _) = channel_subscriber();
    assert!(matches!(
        service.subscribe(NODE_CHANGE, "", "", subscriber),
        Err(ServiceError::NotStarted)
    ));
}

#[tokio::test]
async fn test_node_change_subscription() {
    let mut service = started();
    let (subscriber, mut payloads, completed) = channel_subscriber();
    let subscription = service.subscribe(NODE_CHANGE, "", "", subscriber).unwrap();
    let mutation = service.parse(COMPLETE_TASK).unwrap();

    assert_eq!(
        execute(&mut service, mutation, "").await,
        r#"{"data":{"completeTask":{"task":{"isComplete":true}}}}"#
    );
    assert_eq!(
        service.run_until(payloads.recv()).await.unwrap(),
        r#"{"data":{"nodeChange":{"id":"ZmFrZVRhc2tJZA==","isComplete":true}}}"#
    );

    execute(&mut service, mutation, r#"{"complete": false}"#).await;
    assert_eq!(
        service.run_until(payloads.recv()).await.unwrap(),
        r#"{"data":{"nodeChange":{"id":"ZmFrZVRhc2tJZA==","isComplete":false}}}"#
    );

    service.unsubscribe(subscription);
    service.unsubscribe(subscription);
    execute(&mut service, mutation, "").await;
    run_until_completed(&mut service, &completed).await;
    service.run_pending();
    assert!(payloads.try_recv().is_err());
}

#[tokio::test]
async fn test_no_payload_after_unsubscribe() {
    let mut service = started();
    let (subscriber, mut payloads, completed) = channel_subscriber();
    let subscription = service.subscribe(NODE_CHANGE, "", "", subscriber).unwrap();

    let mutation = service.parse(COMPLETE_TASK).unwrap();
    execute(&mut service, mutation, "").await;
    service.unsubscribe(subscription);
    let mut delivered = 0;
    while payloads.try_recv().is_ok() {
        delivered += 1;
    }
    assert!(delivered <= 1);

    run_until_completed(&mut service, &completed).await;
    assert!(payloads.try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribe_while_mutation_in_flight() {
    let mut service = started();
    let (subscriber, mut payloads, completed) = channel_subscriber();
    let subscription = service.subscribe(NODE_CHANGE, "", "", subscriber).unwrap();
    let mutation = service.parse(COMPLETE_TASK).unwrap();

    let pending = service.execute(mutation, "", "").unwrap();
    service.unsubscribe(subscription);
    assert_eq!(service.subscription_count(), 0);

    assert_eq!(
        service.run_until(pending).await.unwrap(),
        r#"{"data":{"completeTask":{"task":{"isComplete":true}}}}"#
    );
    run_until_completed(&mut service, &completed).await;
    service.run_pending();
    assert!(payloads.try_recv().is_err());
}

#[tokio::test]
async fn test_delivery_failure_reaches_subscriber() {
    let resolvers = hgql_today::resolvers::resolvers(Arc::new(TodayStore::new()))
        .with("Subscription", "nodeChange", |_| panic!("nodeChange failed"));
    let executor = Executor::new(hgql_today::schema::schema().unwrap(), resolvers);
    let mut service = Service::default();
    service.start(Arc::new(executor)).unwrap();

    let (subscriber, mut payloads, _) = channel_subscriber();
    service.subscribe(NODE_CHANGE, "", "", subscriber).unwrap();
    let mutation = service.parse(COMPLETE_TASK).unwrap();
    assert_eq!(
        execute(&mut service, mutation, "").await,
        r#"{"data":{"completeTask":{"task":{"isComplete":true}}}}"#
    );
    assert_eq!(
        service.run_until(payloads.recv()).await.unwrap(),
        r#"{"data":null,"errors":[{"message":"Caught exception delivering subscription payload: nodeChange failed"}]}"#
    );
}

#[tokio::test]
async fn test_execute_while_subscriptions_hold_blocking_threads() {
    let mut service = Service::new(ServiceConfig::new().max_blocking_threads(1));
    service.start(hgql_today::engine().unwrap()).unwrap();
    let (subscriber, _payloads, _) = channel_subscriber();
    service.subscribe(NODE_CHANGE, "", "", subscriber).unwrap();
    let (subscriber, _more, _) = channel_subscriber();
    service.subscribe(NODE_CHANGE, "", "", subscriber).unwrap();

    let pending = service.execute(APPOINTMENTS, "", "").unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), service.run_until(pending))
        .await
        .expect("execute starved by live subscriptions");
    assert_eq!(
        result.unwrap(),
        r#"{"data":{"appointments":[{"id":"ZmFrZUFwcG9pbnRtZW50SWQ="}]}}"#
    );
}

#[tokio::test]
async fn test_subscribe_to_query_runs_once() {
    let mut service = started();
    let (subscriber, mut payloads, completed) = channel_subscriber();
    service.subscribe(APPOINTMENTS, "", "", subscriber).unwrap();

    assert_eq!(
        service.run_until(payloads.recv()).await.unwrap(),
        r#"{"data":{"appointments":[{"id":"ZmFrZUFwcG9pbnRtZW50SWQ="}]}}"#
    );
    run_until_completed(&mut service, &completed).await;
}

#[tokio::test]
async fn test_subscribe_preparation_errors() {
    let mut service = started();
    let (subscriber, _, completed) = channel_subscriber();
    let error = service
        .subscribe("subscription { nodeChange { id } }", "", "", subscriber)
        .unwrap_err();
    assert!(matches!(error, ServiceError::Parse(_)));

    let (subscriber, _, _) = channel_subscriber();
    assert!(matches!(
        service.subscribe(OperationHandle(7), "", "", subscriber),
        Err(ServiceError::UnknownOperation(7))
    ));

    let (subscriber, _, _) = channel_subscriber();
    assert!(matches!(
        service.subscribe(NODE_CHANGE, "", "[]", subscriber),
        Err(ServiceError::InvalidVariables)
    ));
    assert!(!completed.get());
}

#[tokio::test]
async fn test_stop_cancels_everything() {
    let mut service = started();
    let (subscriber, _, completed) = channel_subscriber();
    let first = service.subscribe(NODE_CHANGE, "", "", subscriber).unwrap();
    let handle = service.parse(APPOINTMENTS).unwrap();
    let pending = service.execute(handle, "", "").unwrap();

    service.stop();
    assert!(!service.is_started());
    assert!(completed.get());
    assert!(matches!(pending.await, Err(ServiceError::Cancelled)));

    service.start(hgql_today::engine().unwrap()).unwrap();
    let pending = service.execute(handle, "", "").unwrap();
    assert!(matches!(
        service.run_until(pending).await,
        Err(ServiceError::UnknownOperation(_))
    ));

    let (subscriber, _, _) = channel_subscriber();
    let second = service.subscribe(NODE_CHANGE, "", "", subscriber).unwrap();
    assert!(second > first);
    assert_eq!(first, SubscriptionHandle(1));
}
