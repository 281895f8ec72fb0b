//! Normalized record store contract and implementations.
//!
//! # Responsibility
//! - Define the accessor contract the relocation engine mutates through.
//! - Provide in-memory and SQLite-backed stores plus an undo-recording layer.
//!
//! # Invariants
//! - Absent records are reported as `None`/`false`, never as errors.
//! - Errors are reserved for storage transport and corrupt persisted data.
//! - Write primitives on absent records are no-ops returning `false`.

use crate::db::DbError;
use crate::model::record::{Link, Record, RecordId};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod layer;
pub mod memory;
pub mod ordered;
pub mod sqlite;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from record store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Persisted data cannot be decoded into a record.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid record data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Accessor contract over a normalized record table.
///
/// Implementors provide whole-record and single-slot primitives; linked-record
/// helpers are derived from them.
pub trait RecordStore {
    /// Loads one record by id.
    fn get(&self, id: &RecordId) -> StoreResult<Option<Record>>;
    /// Creates or replaces one record, returning the replaced snapshot.
    fn insert(&mut self, record: Record) -> StoreResult<Option<Record>>;
    /// Removes one record, returning its last snapshot.
    fn delete(&mut self, id: &RecordId) -> StoreResult<Option<Record>>;
    /// Sets one scalar field on an existing record.
    fn set_field(&mut self, id: &RecordId, name: &str, value: Value) -> StoreResult<bool>;
    /// Sets one link on an existing record.
    fn set_link(&mut self, id: &RecordId, name: &str, link: Link) -> StoreResult<bool>;
    /// Removes the field or link stored under `name`.
    fn unset(&mut self, id: &RecordId, name: &str) -> StoreResult<bool>;
    /// Lists every record id in ascending order.
    fn ids(&self) -> StoreResult<Vec<RecordId>>;

    fn contains(&self, id: &RecordId) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    fn field(&self, id: &RecordId, name: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .get(id)?
            .and_then(|record| record.field(name).cloned()))
    }

    fn linked_record(&self, id: &RecordId, name: &str) -> StoreResult<Option<RecordId>> {
        Ok(match self.get(id)?.and_then(|record| record.link(name).cloned()) {
            Some(Link::One(target)) => target,
            _ => None,
        })
    }

    /// Returns the ordered ids of a list link; empty when absent.
    fn linked_records(&self, id: &RecordId, name: &str) -> StoreResult<Vec<RecordId>> {
        Ok(self
            .get(id)?
            .map(|record| record.linked_ids(name))
            .unwrap_or_default())
    }

    fn set_linked_record(
        &mut self,
        id: &RecordId,
        name: &str,
        target: Option<RecordId>,
    ) -> StoreResult<bool> {
        self.set_link(id, name, Link::One(target))
    }

    fn set_linked_records(
        &mut self,
        id: &RecordId,
        name: &str,
        targets: Vec<RecordId>,
    ) -> StoreResult<bool> {
        self.set_link(id, name, Link::Many(targets))
    }
}

/// Materializes every record of `store`, keyed by id.
pub fn snapshot<S: RecordStore + ?Sized>(store: &S) -> StoreResult<BTreeMap<RecordId, Record>> {
    let mut records = BTreeMap::new();
    for id in store.ids()? {
        if let Some(record) = store.get(&id)? {
            records.insert(id, record);
        }
    }
    Ok(records)
}

/// Normalizes `record` into `store`: inserts it when absent, otherwise writes
/// each of its fields and links over the stored record.
///
/// Slot-wise writes keep unrelated local fields intact and let an
/// `OptimisticLayer` record them individually.
pub fn merge_record<S: RecordStore + ?Sized>(store: &mut S, record: Record) -> StoreResult<()> {
    if !store.contains(&record.id)? {
        store.insert(record)?;
        return Ok(());
    }
    for (name, value) in record.fields {
        store.set_field(&record.id, &name, value)?;
    }
    for (name, link) in record.links {
        store.set_link(&record.id, &name, link)?;
    }
    Ok(())
}
