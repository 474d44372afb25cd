//! In-memory storage backend.
//!
//! Thread-safe in-memory implementation of [`ExpressionStore`], intended for
//! embedded usage, tests, and as a reference implementation.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::expression::ExpressionId;
use crate::listen::ListenRecord;
use crate::storage::traits::{ExpressionStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory listener store.
#[derive(Debug, Default)]
pub struct InMemoryExpressionStore {
    records: RwLock<BTreeMap<ExpressionId, ListenRecord>>,
}

impl InMemoryExpressionStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.records.read().map_err(|_| lock_err("len"))?.len())
    }
}

impl ExpressionStore for InMemoryExpressionStore {
    fn put(&self, record: &ListenRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(|_| lock_err("put"))?;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, id: &ExpressionId) -> Result<Option<ListenRecord>, StorageError> {
        let records = self.records.read().map_err(|_| lock_err("get"))?;
        Ok(records.get(id).cloned())
    }

    fn delete(&self, id: &ExpressionId) -> Result<bool, StorageError> {
        let mut records = self.records.write().map_err(|_| lock_err("delete"))?;
        Ok(records.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<ListenRecord>, StorageError> {
        let records = self.records.read().map_err(|_| lock_err("list"))?;
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ProcessId;
    use crate::listen::{ListenAttributes, ListenSpec};
    use crate::resolver::FieldResolver;
    use crate::workitem::Workitem;

    fn record(expid: &str) -> ListenRecord {
        let spec = ListenSpec::resolve(
            &ListenAttributes::new().to("bob"),
            &FieldResolver::new(),
            &Workitem::new(),
        )
        .unwrap();
        ListenRecord::new(
            ExpressionId::new(ProcessId::new("wf"), expid),
            spec,
            Workitem::new().with_field("a", 1),
            0,
        )
    }

    #[test]
    fn put_is_an_upsert() {
        let store = InMemoryExpressionStore::new();
        let r = record("0_1");
        store.put(&r).unwrap();
        store.put(&r).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get(&r.id).unwrap(), Some(r));
    }

    #[test]
    fn delete_is_idempotent() {
        let store = InMemoryExpressionStore::new();
        let r = record("0_2");
        store.put(&r).unwrap();
        assert!(store.delete(&r.id).unwrap());
        assert!(!store.delete(&r.id).unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
