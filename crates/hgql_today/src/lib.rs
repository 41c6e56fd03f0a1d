//! The "today" mock schema.
//!
//! A small personal information schema used by the runtime tests and the
//! CLI: appointments, tasks and folders behind a `Node` interface, a
//! `completeTask` mutation and a `nodeChange` subscription fed by it.

pub mod resolvers;
pub mod schema;
pub mod store;

pub use store::{Appointment, Folder, Task, TodayStore};

use hgql_engine::{Engine, Executor, SchemaError};
use std::sync::Arc;

/// Fixture id of the only appointment.
pub const APPOINTMENT_ID: &str = "fakeAppointmentId";
/// Fixture id of the only task.
pub const TASK_ID: &str = "fakeTaskId";
/// Fixture id of the only folder.
pub const FOLDER_ID: &str = "fakeFolderId";

/// Creates an executor over a fresh store.
pub fn executor() -> Result<Executor, SchemaError> {
    executor_with_store(Arc::new(TodayStore::new()))
}

/// Creates an executor over the given store.
pub fn executor_with_store(store: Arc<TodayStore>) -> Result<Executor, SchemaError> {
    Ok(Executor::new(schema::schema()?, resolvers::resolvers(store)))
}

/// Creates a shared engine over a fresh store.
pub fn engine() -> Result<Arc<dyn Engine>, SchemaError> {
    Ok(Arc::new(executor()?))
}
