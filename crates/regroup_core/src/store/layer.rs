//! Undo-recording store layer for optimistic writes.
//!
//! # Responsibility
//! - Forward every call to an underlying store.
//! - Record the pre-image and the written image of every write made through
//!   it, so the writes can be taken back later.
//!
//! # Invariants
//! - Undo is slot-granular: reverting touches only the fields and links the
//!   layer wrote, so writes made directly on the inner store survive.
//! - A slot or record is restored only while it still holds what the layer
//!   wrote; a newer write by anyone else wins.
//! - List links are unwound member by member: ids the layer added are
//!   removed, ids it removed are re-inserted next to their old neighbours.
//!   Membership changes made by others are kept.
//! - Entries are reverted newest first.
//! - Writes that change nothing (absent record) record nothing.

use super::{RecordStore, StoreResult};
use crate::model::record::{Link, Record, RecordId};
use log::debug;
use serde_json::Value;

/// Content of one named slot of a record.
#[derive(Debug, Clone, PartialEq)]
enum SlotImage {
    Absent,
    Field(Value),
    Link(Link),
}

impl SlotImage {
    fn capture(record: &Record, name: &str) -> Self {
        if let Some(value) = record.fields.get(name) {
            return Self::Field(value.clone());
        }
        match record.links.get(name) {
            Some(link) => Self::Link(link.clone()),
            None => Self::Absent,
        }
    }

    fn as_list(&self) -> Option<&[RecordId]> {
        match self {
            Self::Link(Link::Many(ids)) => Some(ids.as_slice()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum UndoEntry {
    /// Whole-record write; `None` means the record did not exist.
    Record {
        id: RecordId,
        before: Option<Record>,
        after: Option<Record>,
    },
    Slot {
        id: RecordId,
        name: String,
        before: SlotImage,
        after: SlotImage,
    },
}

/// Recorded pre-images of one optimistic pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndoLog {
    entries: Vec<UndoEntry>,
}

impl UndoLog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Takes back the layer's writes that were not overwritten since.
    /// Returns the number of entries that changed the store.
    pub fn revert<S: RecordStore + ?Sized>(self, store: &mut S) -> StoreResult<usize> {
        let total = self.entries.len();
        let mut applied = 0;
        for entry in self.entries.into_iter().rev() {
            let changed = match entry {
                UndoEntry::Record { id, before, after } => {
                    revert_record(store, &id, before, after)?
                }
                UndoEntry::Slot {
                    id,
                    name,
                    before,
                    after,
                } => revert_slot(store, &id, &name, &before, &after)?,
            };
            if changed {
                applied += 1;
            }
        }
        debug!("event=undo_revert module=store status=ok entries={total} applied={applied}");
        Ok(applied)
    }
}

fn revert_record<S: RecordStore + ?Sized>(
    store: &mut S,
    id: &RecordId,
    before: Option<Record>,
    after: Option<Record>,
) -> StoreResult<bool> {
    if store.get(id)? != after {
        debug!(
            "event=undo_revert module=store status=skip reason=record_overwritten record_id={id}"
        );
        return Ok(false);
    }
    match before {
        Some(record) => {
            store.insert(record)?;
        }
        None => {
            store.delete(id)?;
        }
    }
    Ok(true)
}

fn revert_slot<S: RecordStore + ?Sized>(
    store: &mut S,
    id: &RecordId,
    name: &str,
    before: &SlotImage,
    after: &SlotImage,
) -> StoreResult<bool> {
    let Some(record) = store.get(id)? else {
        return Ok(false);
    };
    let current = SlotImage::capture(&record, name);

    if let (Some(before), Some(after), Some(current)) =
        (before.as_list(), after.as_list(), current.as_list())
    {
        let restored = unwind_list(before, after, current);
        if restored == current {
            return Ok(false);
        }
        return store.set_link(id, name, Link::Many(restored));
    }

    if &current != after {
        debug!(
            "event=undo_revert module=store status=skip reason=slot_overwritten record_id={id} slot={name}"
        );
        return Ok(false);
    }
    match before {
        SlotImage::Absent => store.unset(id, name),
        SlotImage::Field(value) => store.set_field(id, name, value.clone()),
        SlotImage::Link(link) => store.set_link(id, name, link.clone()),
    }
}

/// Undoes the membership delta `before -> after` on `current`.
fn unwind_list(before: &[RecordId], after: &[RecordId], current: &[RecordId]) -> Vec<RecordId> {
    let mut list: Vec<RecordId> = current
        .iter()
        .filter(|id| before.contains(*id) || !after.contains(*id))
        .cloned()
        .collect();

    for (index, id) in before.iter().enumerate() {
        if after.contains(id) || list.contains(id) {
            continue;
        }
        let position = before[..index]
            .iter()
            .rev()
            .find_map(|prev| list.iter().position(|listed| listed == prev).map(|at| at + 1))
            .or_else(|| {
                before[index + 1..]
                    .iter()
                    .find_map(|next| list.iter().position(|listed| listed == next))
            })
            .unwrap_or(list.len());
        list.insert(position, id.clone());
    }
    list
}

/// Store wrapper that records undo entries for every write.
pub struct OptimisticLayer<'s, S: RecordStore + ?Sized> {
    inner: &'s mut S,
    log: UndoLog,
}

impl<'s, S: RecordStore + ?Sized> OptimisticLayer<'s, S> {
    pub fn new(inner: &'s mut S) -> Self {
        Self {
            inner,
            log: UndoLog::default(),
        }
    }

    /// Ends the layer and hands back its undo log.
    pub fn into_undo_log(self) -> UndoLog {
        self.log
    }

    fn capture_slot(&self, id: &RecordId, name: &str) -> StoreResult<Option<SlotImage>> {
        Ok(self
            .inner
            .get(id)?
            .map(|record| SlotImage::capture(&record, name)))
    }

    fn record_slot(
        &mut self,
        written: bool,
        id: &RecordId,
        name: &str,
        before: Option<SlotImage>,
    ) -> StoreResult<bool> {
        if let (true, Some(before)) = (written, before) {
            let after = self.capture_slot(id, name)?.unwrap_or(SlotImage::Absent);
            self.log.entries.push(UndoEntry::Slot {
                id: id.clone(),
                name: name.to_string(),
                before,
                after,
            });
        }
        Ok(written)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for OptimisticLayer<'_, S> {
    fn get(&self, id: &RecordId) -> StoreResult<Option<Record>> {
        self.inner.get(id)
    }

    fn insert(&mut self, record: Record) -> StoreResult<Option<Record>> {
        let id = record.id.clone();
        let previous = self.inner.insert(record)?;
        let after = self.inner.get(&id)?;
        self.log.entries.push(UndoEntry::Record {
            id,
            before: previous.clone(),
            after,
        });
        Ok(previous)
    }

    fn delete(&mut self, id: &RecordId) -> StoreResult<Option<Record>> {
        let previous = self.inner.delete(id)?;
        if previous.is_some() {
            self.log.entries.push(UndoEntry::Record {
                id: id.clone(),
                before: previous.clone(),
                after: None,
            });
        }
        Ok(previous)
    }

    fn set_field(&mut self, id: &RecordId, name: &str, value: Value) -> StoreResult<bool> {
        let before = self.capture_slot(id, name)?;
        let written = self.inner.set_field(id, name, value)?;
        self.record_slot(written, id, name, before)
    }

    fn set_link(&mut self, id: &RecordId, name: &str, link: Link) -> StoreResult<bool> {
        let before = self.capture_slot(id, name)?;
        let written = self.inner.set_link(id, name, link)?;
        self.record_slot(written, id, name, before)
    }

    fn unset(&mut self, id: &RecordId, name: &str) -> StoreResult<bool> {
        let before = self.capture_slot(id, name)?;
        let written = self.inner.unset(id, name)?;
        self.record_slot(written, id, name, before)
    }

    fn ids(&self) -> StoreResult<Vec<RecordId>> {
        self.inner.ids()
    }
}

#[cfg(test)]
mod tests {
    use super::OptimisticLayer;
    use crate::model::record::{Link, Record, RecordId};
    use crate::store::memory::MemoryRecordStore;
    use crate::store::RecordStore;
    use serde_json::json;

    fn seeded() -> MemoryRecordStore {
        let mut store = MemoryRecordStore::new();
        store
            .insert(
                Record::new(RecordId::from("r1"), "RetroReflection")
                    .with_field("sortOrder", 3.0)
                    .with_field("reflectionGroupId", "g1"),
            )
            .unwrap();
        store
    }

    #[test]
    fn revert_restores_pre_images_and_drops_created_records() {
        let mut store = seeded();
        let before = store.clone();

        let mut layer = OptimisticLayer::new(&mut store);
        let r1 = RecordId::from("r1");
        layer.set_field(&r1, "sortOrder", json!(0.0)).unwrap();
        layer.set_field(&r1, "sortOrder", json!(7.0)).unwrap();
        layer.set_field(&r1, "isNew", json!(true)).unwrap();
        layer
            .insert(Record::new(RecordId::from("client:1"), "RetroReflectionGroup"))
            .unwrap();
        let log = layer.into_undo_log();
        assert_eq!(log.len(), 4);

        log.revert(&mut store).unwrap();
        assert_eq!(store, before);
    }

    #[test]
    fn revert_keeps_writes_made_outside_the_layer() {
        let mut store = seeded();
        let r1 = RecordId::from("r1");

        let mut layer = OptimisticLayer::new(&mut store);
        layer.set_field(&r1, "sortOrder", json!(9.0)).unwrap();
        let log = layer.into_undo_log();

        store.set_field(&r1, "isDropping", json!(true)).unwrap();
        log.revert(&mut store).unwrap();

        let record = store.get(&r1).unwrap().unwrap();
        assert_eq!(record.f64_field("sortOrder"), Some(3.0));
        assert_eq!(record.bool_field("isDropping"), Some(true));
    }

    #[test]
    fn revert_leaves_overwritten_slots_alone() {
        let mut store = seeded();
        let r1 = RecordId::from("r1");

        let mut layer = OptimisticLayer::new(&mut store);
        layer.set_field(&r1, "sortOrder", json!(9.0)).unwrap();
        let log = layer.into_undo_log();

        store.set_field(&r1, "sortOrder", json!(4.0)).unwrap();
        assert_eq!(log.revert(&mut store).unwrap(), 0);
        assert_eq!(store.get(&r1).unwrap().unwrap().f64_field("sortOrder"), Some(4.0));
    }

    #[test]
    fn list_revert_keeps_members_changed_by_others() {
        let mut store = MemoryRecordStore::new();
        let m1 = RecordId::from("m1");
        let ids = |values: &[&str]| -> Vec<RecordId> {
            values.iter().map(|value| RecordId::from(*value)).collect()
        };
        store
            .insert(
                Record::new(m1.clone(), "RetrospectiveMeeting")
                    .with_link("reflectionGroups", Link::Many(ids(&["gA", "gB", "gC"]))),
            )
            .unwrap();

        let mut layer = OptimisticLayer::new(&mut store);
        layer
            .set_linked_records(&m1, "reflectionGroups", ids(&["gA", "gC", "client:1"]))
            .unwrap();
        let log = layer.into_undo_log();

        // Another writer retires gA and lists a server group.
        store
            .set_linked_records(&m1, "reflectionGroups", ids(&["gC", "client:1", "s1"]))
            .unwrap();
        assert_eq!(log.revert(&mut store).unwrap(), 1);
        assert_eq!(
            store.linked_records(&m1, "reflectionGroups").unwrap(),
            ids(&["gB", "gC", "s1"])
        );
    }

    #[test]
    fn writes_to_missing_records_record_nothing() {
        let mut store = seeded();
        let mut layer = OptimisticLayer::new(&mut store);
        layer
            .set_field(&RecordId::from("ghost"), "sortOrder", json!(1.0))
            .unwrap();
        assert!(layer.into_undo_log().is_empty());
    }
}
