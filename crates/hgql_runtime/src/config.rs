//! Service configuration.

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Number of async worker threads of the pool runtime.
    pub worker_threads: usize,
    /// Upper bound on blocking threads. Every live subscription holds one
    /// while it drains its queue. Subscriptions past the limit wait for a
    /// thread; queries and mutations run on the async workers instead.
    pub max_blocking_threads: usize,
    /// Name given to pool threads.
    pub thread_name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self {
            worker_threads: 1,
            max_blocking_threads: 64,
            thread_name: "hgql-worker".to_string(),
        }
    }

    /// Sets the number of async worker threads.
    #[must_use]
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count.max(1);
        self
    }

    /// Sets the blocking thread limit.
    #[must_use]
    pub fn max_blocking_threads(mut self, count: usize) -> Self {
        self.max_blocking_threads = count.max(1);
        self
    }

    /// Sets the pool thread name.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
