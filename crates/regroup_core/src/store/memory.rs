//! In-memory record table.

use super::{RecordStore, StoreResult};
use crate::model::record::{Link, Record, RecordId};
use serde_json::Value;
use std::collections::HashMap;

/// Record table held in process memory.
///
/// Records reference each other by id only, so the table is the sole owner of
/// every snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryRecordStore {
    records: HashMap<RecordId, Record>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, id: &RecordId) -> StoreResult<Option<Record>> {
        Ok(self.records.get(id).cloned())
    }

    fn insert(&mut self, record: Record) -> StoreResult<Option<Record>> {
        Ok(self.records.insert(record.id.clone(), record))
    }

    fn delete(&mut self, id: &RecordId) -> StoreResult<Option<Record>> {
        Ok(self.records.remove(id))
    }

    fn set_field(&mut self, id: &RecordId, name: &str, value: Value) -> StoreResult<bool> {
        match self.records.get_mut(id) {
            Some(record) => {
                record.set_field(name, value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_link(&mut self, id: &RecordId, name: &str, link: Link) -> StoreResult<bool> {
        match self.records.get_mut(id) {
            Some(record) => {
                record.set_link(name, link);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn unset(&mut self, id: &RecordId, name: &str) -> StoreResult<bool> {
        Ok(self
            .records
            .get_mut(id)
            .map(|record| record.unset(name))
            .unwrap_or(false))
    }

    fn ids(&self) -> StoreResult<Vec<RecordId>> {
        let mut ids: Vec<RecordId> = self.records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn contains(&self, id: &RecordId) -> StoreResult<bool> {
        Ok(self.records.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryRecordStore;
    use crate::model::record::{Record, RecordId};
    use crate::store::RecordStore;

    #[test]
    fn writes_to_absent_records_are_noops() {
        let mut store = MemoryRecordStore::new();
        let missing = RecordId::from("missing");
        assert!(!store.set_field(&missing, "sortOrder", 1.0.into()).unwrap());
        assert!(!store
            .set_linked_records(&missing, "reflections", vec![])
            .unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn linked_helpers_read_through_links() {
        let mut store = MemoryRecordStore::new();
        let id = RecordId::from("g1");
        store
            .insert(Record::new(id.clone(), "RetroReflectionGroup"))
            .unwrap();
        store
            .set_linked_records(&id, "reflections", vec![RecordId::from("r1")])
            .unwrap();
        store
            .set_linked_record(&id, "meeting", Some(RecordId::from("m1")))
            .unwrap();

        assert_eq!(
            store.linked_records(&id, "reflections").unwrap(),
            vec![RecordId::from("r1")]
        );
        assert_eq!(
            store.linked_record(&id, "meeting").unwrap(),
            Some(RecordId::from("m1"))
        );
        assert!(store.linked_records(&id, "meeting").unwrap().is_empty());
    }
}
