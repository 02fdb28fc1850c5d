//! In-memory [`RecordIndex`] for tests and dry runs.
//!
//! Records live in insertion order behind a `std::sync::RwLock`. Searches
//! evaluate the [`Query`] tree directly with [`Query::matches`].

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{IndexError, IndexRecord, Query, RecordIndex};

#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<Vec<IndexRecord>>,
    updates: AtomicUsize,
    reject_updates: AtomicBool,
    reject_searches: AtomicBool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<IndexRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            ..Self::default()
        }
    }

    pub fn insert(&self, record: IndexRecord) {
        self.records.write().unwrap().push(record);
    }

    pub fn record(&self, id: &str) -> Option<IndexRecord> {
        self.records
            .read()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn records(&self) -> Vec<IndexRecord> {
        self.records.read().unwrap().clone()
    }

    /// Number of successful `set_fields` calls so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Make every later `set_fields` fail, as a flaky server would.
    pub fn reject_updates(&self, reject: bool) {
        self.reject_updates.store(reject, Ordering::SeqCst);
    }

    /// Make every later `search` fail.
    pub fn reject_searches(&self, reject: bool) {
        self.reject_searches.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordIndex for MemoryIndex {
    async fn ping(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn search(&self, query: &Query, rows: usize) -> Result<Vec<IndexRecord>, IndexError> {
        if self.reject_searches.load(Ordering::SeqCst) {
            return Err(IndexError::Rejected(query.to_lucene()));
        }
        let records = self.records.read().unwrap();
        Ok(records
            .iter()
            .filter(|r| query.matches(&r.fields))
            .take(rows)
            .cloned()
            .collect())
    }

    async fn set_fields(&self, id: &str, fields: &Map<String, Value>) -> Result<(), IndexError> {
        if self.reject_updates.load(Ordering::SeqCst) {
            return Err(IndexError::Rejected(id.to_string()));
        }
        let mut records = self.records.write().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| IndexError::NotFound(id.to_string()))?;
        for (name, value) in fields {
            record.fields.insert(name.clone(), value.clone());
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
