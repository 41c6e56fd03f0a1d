//! Parsed operation cache.

use crate::error::ServiceError;
use hgql_engine::Document;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Handle of a cached document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationHandle(pub i32);

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parsed and validated documents behind numeric handles.
///
/// A new handle is one past the current maximum, so a live handle is never
/// reused.
#[derive(Debug, Default)]
pub struct OperationCache {
    documents: BTreeMap<OperationHandle, Arc<Document>>,
}

impl OperationCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document and returns its handle.
    pub fn store(&mut self, document: Arc<Document>) -> OperationHandle {
        let handle = self.next_handle();
        self.documents.insert(handle, document);
        handle
    }

    fn next_handle(&self) -> OperationHandle {
        match self.documents.last_key_value() {
            None => OperationHandle(1),
            Some((last, _)) if last.0 < i32::MAX => OperationHandle(last.0 + 1),
            // The maximum is taken; fall back to the first gap.
            Some(_) => (1..)
                .map(OperationHandle)
                .find(|candidate| !self.documents.contains_key(candidate))
                .unwrap_or(OperationHandle(1)),
        }
    }

    /// Looks up a document.
    pub fn lookup(&self, handle: OperationHandle) -> Result<Arc<Document>, ServiceError> {
        self.documents
            .get(&handle)
            .cloned()
            .ok_or(ServiceError::UnknownOperation(handle.0))
    }

    /// Removes a document. Unknown handles are ignored.
    pub fn discard(&mut self, handle: OperationHandle) -> bool {
        self.documents.remove(&handle).is_some()
    }

    /// Removes every document.
    pub fn clear(&mut self) {
        self.documents.clear();
    }

    /// Returns the number of cached documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Arc<Document> {
        Arc::new(hgql_engine::Document {
            definitions: Vec::new(),
            span: Default::default(),
            line_index: Default::default(),
        })
    }

    #[test]
    fn test_handles_count_from_max() {
        let mut cache = OperationCache::new();
        assert_eq!(cache.store(document()), OperationHandle(1));
        assert_eq!(cache.store(document()), OperationHandle(2));
        assert_eq!(cache.store(document()), OperationHandle(3));

        // A gap below the maximum is not reused.
        assert!(cache.discard(OperationHandle(2)));
        assert_eq!(cache.store(document()), OperationHandle(4));

        // Discarding the maximum frees its handle.
        assert!(cache.discard(OperationHandle(4)));
        assert_eq!(cache.store(document()), OperationHandle(4));
    }

    #[test]
    fn test_unknown_handles() {
        let mut cache = OperationCache::new();
        assert!(!cache.discard(OperationHandle(7)));
        let error = cache.lookup(OperationHandle(999)).unwrap_err();
        assert_eq!(error.to_string(), "unknown operation 999");
    }

    #[test]
    fn test_clear() {
        let mut cache = OperationCache::new();
        let handle = cache.store(document());
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.lookup(handle).is_err());
        assert_eq!(cache.store(document()), OperationHandle(1));
    }
}
