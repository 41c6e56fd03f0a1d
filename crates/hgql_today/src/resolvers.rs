//! Field resolvers of the today schema.

use crate::store::{Appointment, Folder, Node, Task, TodayStore};
use hgql_engine::id::{decode_id, encode_id};
use hgql_engine::{DeliveryParams, ObjectValue, Resolved, ResolverError, ResolverMap};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Argument of `Mutation.completeTask`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteTaskInput {
    id: String,
    is_complete: Option<bool>,
    client_mutation_id: Option<String>,
}

/// Result of `Mutation.completeTask`.
#[derive(Debug)]
struct CompleteTaskPayload {
    task: Arc<Task>,
    client_mutation_id: Option<String>,
}

fn node_object(node: Node) -> ObjectValue {
    match node {
        Node::Appointment(appointment) => ObjectValue::from_arc("Appointment", appointment),
        Node::Task(task) => ObjectValue::from_arc("Task", task),
        Node::Folder(folder) => ObjectValue::from_arc("Folder", folder),
    }
}

fn find_node(store: &TodayStore, id: &str) -> Result<Option<ObjectValue>, ResolverError> {
    Ok(store.node(&decode_id(id)?).map(node_object))
}

/// Builds the resolvers over a store.
pub fn resolvers(store: Arc<TodayStore>) -> ResolverMap {
    let mut resolvers = ResolverMap::new();
    query(&mut resolvers, &store);
    objects(&mut resolvers);
    mutation(&mut resolvers, store);
    subscription(&mut resolvers);
    resolvers
}

fn query(resolvers: &mut ResolverMap, store: &Arc<TodayStore>) {
    let appointments = Arc::clone(store);
    resolvers.register("Query", "appointments", move |_| {
        Ok(Resolved::list(appointments.appointments().iter().map(|a| {
            Resolved::Object(ObjectValue::from_arc("Appointment", Arc::clone(a)))
        })))
    });

    let tasks = Arc::clone(store);
    resolvers.register("Query", "tasks", move |_| {
        Ok(Resolved::list(
            tasks
                .tasks()
                .iter()
                .map(|t| Resolved::Object(ObjectValue::from_arc("Task", Arc::clone(t)))),
        ))
    });

    let folders = Arc::clone(store);
    resolvers.register("Query", "unreadCounts", move |_| {
        Ok(Resolved::list(
            folders
                .folders()
                .iter()
                .map(|f| Resolved::Object(ObjectValue::from_arc("Folder", Arc::clone(f)))),
        ))
    });

    let nodes = Arc::clone(store);
    resolvers.register("Query", "node", move |ctx| {
        let id: String = ctx.arg_as("id")?;
        Ok(find_node(&nodes, &id)?.into())
    });
}

fn objects(resolvers: &mut ResolverMap) {
    resolvers.register("Appointment", "id", |ctx| {
        Ok(Resolved::value(encode_id(ctx.parent_as::<Appointment>()?.id)))
    });
    resolvers.register("Appointment", "when", |ctx| {
        Ok(Resolved::value(ctx.parent_as::<Appointment>()?.when.as_str()))
    });
    resolvers.register("Appointment", "subject", |ctx| {
        Ok(Resolved::value(ctx.parent_as::<Appointment>()?.subject.as_str()))
    });
    resolvers.register("Appointment", "isNow", |ctx| {
        Ok(Resolved::value(ctx.parent_as::<Appointment>()?.is_now))
    });

    resolvers.register("Task", "id", |ctx| {
        Ok(Resolved::value(encode_id(ctx.parent_as::<Task>()?.id)))
    });
    resolvers.register("Task", "title", |ctx| {
        Ok(Resolved::value(ctx.parent_as::<Task>()?.title.as_str()))
    });
    resolvers.register("Task", "isComplete", |ctx| {
        Ok(Resolved::value(ctx.parent_as::<Task>()?.is_complete()))
    });

    resolvers.register("Folder", "id", |ctx| {
        Ok(Resolved::value(encode_id(ctx.parent_as::<Folder>()?.id)))
    });
    resolvers.register("Folder", "name", |ctx| {
        Ok(Resolved::value(ctx.parent_as::<Folder>()?.name.as_str()))
    });
    resolvers.register("Folder", "unreadCount", |ctx| {
        Ok(Resolved::value(ctx.parent_as::<Folder>()?.unread_count))
    });

    resolvers.register("CompleteTaskPayload", "task", |ctx| {
        let payload = ctx.parent_as::<CompleteTaskPayload>()?;
        Ok(Resolved::Object(ObjectValue::from_arc(
            "Task",
            Arc::clone(&payload.task),
        )))
    });
    resolvers.register("CompleteTaskPayload", "clientMutationId", |ctx| {
        let payload = ctx.parent_as::<CompleteTaskPayload>()?;
        Ok(payload.client_mutation_id.clone().map(Resolved::value).into())
    });
}

fn mutation(resolvers: &mut ResolverMap, store: Arc<TodayStore>) {
    resolvers.register("Mutation", "completeTask", move |ctx| {
        let input: CompleteTaskInput = ctx.arg_as("input")?;
        let raw = decode_id(&input.id)?;
        let task = store
            .task(&raw)
            .ok_or_else(|| ResolverError::custom(format!("Unknown task \"{}\".", input.id)))?;
        task.set_complete(input.is_complete.unwrap_or(true));

        let id = encode_id(&raw);
        let root = ObjectValue::from_arc("Subscription", Arc::clone(&store));
        let delivered = ctx
            .executor
            .deliver(DeliveryParams::new("nodeChange", root).with_filter("id", id.as_str()));
        debug!(task = %id, delivered, "completed task");

        Ok(Resolved::object(
            "CompleteTaskPayload",
            CompleteTaskPayload {
                task: Arc::clone(task),
                client_mutation_id: input.client_mutation_id,
            },
        ))
    });
}

fn subscription(resolvers: &mut ResolverMap) {
    resolvers.register("Subscription", "nodeChange", |ctx| {
        let store = ctx.parent_as::<TodayStore>()?;
        let id: String = ctx.arg_as("id")?;
        find_node(store, &id)?
            .map(Resolved::Object)
            .ok_or_else(|| ResolverError::custom(format!("Unknown node \"{id}\".")))
    });
    resolvers.register("Subscription", "nextAppointmentChange", |_| {
        Err(ResolverError::custom(
            "Unexpected call to getNextAppointmentChange",
        ))
    });
}
