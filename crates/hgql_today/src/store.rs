//! In-memory fixture data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{APPOINTMENT_ID, FOLDER_ID, TASK_ID};

#[derive(Debug)]
pub struct Appointment {
    pub id: &'static str,
    pub when: String,
    pub subject: String,
    pub is_now: bool,
}

#[derive(Debug)]
pub struct Task {
    pub id: &'static str,
    pub title: String,
    is_complete: AtomicBool,
}

impl Task {
    /// Returns whether the task is complete.
    pub fn is_complete(&self) -> bool {
        self.is_complete.load(Ordering::Acquire)
    }

    /// Marks the task complete or not.
    pub fn set_complete(&self, complete: bool) {
        self.is_complete.store(complete, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct Folder {
    pub id: &'static str,
    pub name: String,
    pub unread_count: i32,
}

/// Any object reachable through `Query.node`.
#[derive(Debug, Clone)]
pub enum Node {
    Appointment(Arc<Appointment>),
    Task(Arc<Task>),
    Folder(Arc<Folder>),
}

/// The data behind the schema. Shared by every resolver.
#[derive(Debug)]
pub struct TodayStore {
    appointments: Vec<Arc<Appointment>>,
    tasks: Vec<Arc<Task>>,
    folders: Vec<Arc<Folder>>,
}

impl Default for TodayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TodayStore {
    /// Creates a store holding one appointment, one task and one folder.
    pub fn new() -> Self {
        Self {
            appointments: vec![Arc::new(Appointment {
                id: APPOINTMENT_ID,
                when: "tomorrow".to_string(),
                subject: "Lunch?".to_string(),
                is_now: false,
            })],
            tasks: vec![Arc::new(Task {
                id: TASK_ID,
                title: "Don't forget".to_string(),
                is_complete: AtomicBool::new(false),
            })],
            folders: vec![Arc::new(Folder {
                id: FOLDER_ID,
                name: "\"Fake\" Inbox".to_string(),
                unread_count: 3,
            })],
        }
    }

    pub fn appointments(&self) -> &[Arc<Appointment>] {
        &self.appointments
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn folders(&self) -> &[Arc<Folder>] {
        &self.folders
    }

    /// Finds a task by its raw id.
    pub fn task(&self, id: &[u8]) -> Option<&Arc<Task>> {
        self.tasks.iter().find(|task| task.id.as_bytes() == id)
    }

    /// Finds any node by its raw id.
    pub fn node(&self, id: &[u8]) -> Option<Node> {
        if let Some(appointment) = self.appointments.iter().find(|a| a.id.as_bytes() == id) {
            return Some(Node::Appointment(Arc::clone(appointment)));
        }
        if let Some(task) = self.task(id) {
            return Some(Node::Task(Arc::clone(task)));
        }
        self.folders
            .iter()
            .find(|f| f.id.as_bytes() == id)
            .map(|folder| Node::Folder(Arc::clone(folder)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_lookup() {
        let store = TodayStore::new();
        assert!(matches!(store.node(b"fakeAppointmentId"), Some(Node::Appointment(_))));
        assert!(matches!(store.node(b"fakeTaskId"), Some(Node::Task(_))));
        assert!(matches!(store.node(b"fakeFolderId"), Some(Node::Folder(_))));
        assert!(store.node(b"missing").is_none());
    }

    #[test]
    fn test_task_completion() {
        let store = TodayStore::new();
        let task = store.task(b"fakeTaskId").unwrap();
        assert!(!task.is_complete());
        task.set_complete(true);
        assert!(store.tasks()[0].is_complete());
    }
}
