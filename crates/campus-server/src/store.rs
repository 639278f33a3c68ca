//! Record storage
//!
//! Records are JSON objects keyed by their `id` field. Each service owns one
//! collection; [`InMemoryRecordStore`] keeps it in process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

/// A stored JSON object
pub type Record = Map<String, Value>;

/// Field holding a record's id
pub const ID_FIELD: &str = "id";

/// Record store failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A record with this id already exists
    #[error("record {0} already exists")]
    Conflict(String),

    /// The backing store cannot be reached
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Id of a record, if it has a string id
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// One collection of records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a new record, assigning an id when it has none
    async fn insert(&self, record: Record) -> StoreResult<Record>;

    /// Every record, ordered by id
    async fn list(&self) -> StoreResult<Vec<Record>>;

    /// The record with `id`
    async fn get(&self, id: &str) -> StoreResult<Option<Record>>;

    /// Overwrite the fields present in `fields`; the id never changes
    async fn update(&self, id: &str, fields: Record) -> StoreResult<Option<Record>>;

    /// Remove and return the record with `id`
    async fn delete(&self, id: &str) -> StoreResult<Option<Record>>;

    /// Records whose `field` is the string `value`
    async fn find_by(&self, field: &str, value: &str) -> StoreResult<Vec<Record>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|record| record.get(field).and_then(Value::as_str) == Some(value))
            .collect())
    }
}

/// Process-local record store
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<String, Record>>,
}

impl InMemoryRecordStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, mut record: Record) -> StoreResult<Record> {
        let id = match record_id(&record) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut records = self.records.write();
        if records.contains_key(&id) {
            return Err(StoreError::Conflict(id));
        }
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn list(&self) -> StoreResult<Vec<Record>> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Record>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn update(&self, id: &str, fields: Record) -> StoreResult<Option<Record>> {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(id) else {
            return Ok(None);
        };
        for (key, value) in fields {
            if key != ID_FIELD {
                record.insert(key, value);
            }
        }
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: &str) -> StoreResult<Option<Record>> {
        Ok(self.records.write().remove(id))
    }
}
