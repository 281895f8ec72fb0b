//! Reflection relocation engine.
//!
//! # Responsibility
//! - Move one reflection between group member lists.
//! - Keep group lifecycle consistent: list destination groups in their
//!   meeting, retire groups whose last member left.
//!
//! # Invariants
//! - Every step checks that the records it touches exist and otherwise does
//!   nothing; absence is never an error.
//! - Every step is idempotent, so an optimistic pass followed by a
//!   confirmatory pass converges instead of double-applying.
//! - Group records are retired (de-listed, `isActive=false`), not purged.
//!   Only unconfirmed temporary groups are purged, by `sweep_temporary_groups`.

pub mod noise;
pub mod temp_id;

use crate::model::record::RecordId;
use crate::model::retro::fields;
use crate::store::ordered::{insert_sorted_by, remove_from_list};
use crate::store::{RecordStore, StoreResult};
use log::debug;
use serde_json::Value;
use temp_id::is_temporary_id;

/// What one `relocate` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationOutcome {
    /// Reflection was not materialized; nothing ran.
    pub skipped: bool,
    /// Reflection left the previous group's member list.
    pub detached: bool,
    /// Reflection's current group member list changed.
    pub attached: bool,
    /// Previous group was emptied and retired.
    pub retired_group: Option<RecordId>,
    /// Destination group was added to its meeting's group list.
    pub listed_group: bool,
}

impl RelocationOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn changed(&self) -> bool {
        self.detached || self.attached || self.retired_group.is_some() || self.listed_group
    }
}

/// Moves `reflection_id` from `previous_group_id` into the group its
/// `reflectionGroupId` field names.
///
/// `destination_group` is the group that must be listed in its meeting after
/// the move; `None` skips that step. The reflection's own group field is the
/// attach target, so callers reassign it before calling.
pub fn relocate<S: RecordStore + ?Sized>(
    store: &mut S,
    reflection_id: &RecordId,
    destination_group: Option<&RecordId>,
    previous_group_id: Option<&RecordId>,
) -> StoreResult<RelocationOutcome> {
    let Some(reflection) = store.get(reflection_id)? else {
        debug!(
            "event=relocate module=relocation status=skip reason=reflection_missing reflection_id={reflection_id}"
        );
        return Ok(RelocationOutcome::skipped());
    };
    let current_group = reflection.id_field(fields::REFLECTION_GROUP_ID);
    let mut outcome = RelocationOutcome::default();

    if let Some(previous) = previous_group_id {
        outcome.detached = remove_from_list(store, previous, fields::REFLECTIONS, reflection_id)?;
    }

    if let Some(current) = &current_group {
        outcome.attached = insert_sorted_by(
            store,
            current,
            fields::REFLECTIONS,
            reflection_id,
            fields::SORT_ORDER,
        )?;
    }

    if let Some(previous) = previous_group_id {
        if current_group.as_ref() != Some(previous) && retire_if_empty(store, previous)? {
            outcome.retired_group = Some(previous.clone());
        }
    }

    if let Some(destination) = destination_group {
        outcome.listed_group = list_in_meeting(store, destination)?;
    }

    debug!(
        "event=relocate module=relocation status=ok reflection_id={reflection_id} detached={} attached={} retired={} listed={}",
        outcome.detached,
        outcome.attached,
        outcome.retired_group.is_some(),
        outcome.listed_group
    );
    Ok(outcome)
}

/// Retires `group_id` when it has no members: removes it from its meeting's
/// group list and marks it inactive. Returns `true` when anything changed.
pub fn retire_if_empty<S: RecordStore + ?Sized>(
    store: &mut S,
    group_id: &RecordId,
) -> StoreResult<bool> {
    let Some(group) = store.get(group_id)? else {
        return Ok(false);
    };
    if !group.linked_ids(fields::REFLECTIONS).is_empty() {
        return Ok(false);
    }

    let mut changed = false;
    if let Some(meeting_id) = group.id_field(fields::MEETING_ID) {
        changed |= remove_from_list(store, &meeting_id, fields::REFLECTION_GROUPS, group_id)?;
    }
    if group.bool_field(fields::IS_ACTIVE) != Some(false) {
        changed |= store.set_field(group_id, fields::IS_ACTIVE, Value::Bool(false))?;
    }
    Ok(changed)
}

/// Lists `group_id` in its meeting's group list by the group's sort key when
/// it is not listed yet. Returns `true` when the list changed.
pub fn list_in_meeting<S: RecordStore + ?Sized>(
    store: &mut S,
    group_id: &RecordId,
) -> StoreResult<bool> {
    let Some(meeting_id) = store
        .get(group_id)?
        .and_then(|group| group.id_field(fields::MEETING_ID))
    else {
        return Ok(false);
    };
    if store
        .linked_records(&meeting_id, fields::REFLECTION_GROUPS)?
        .contains(group_id)
    {
        return Ok(false);
    }
    insert_sorted_by(
        store,
        &meeting_id,
        fields::REFLECTION_GROUPS,
        group_id,
        fields::SORT_ORDER,
    )
}

/// Reconciles temporary groups listed in `meeting_id` against the members'
/// authoritative group fields.
///
/// Members whose `reflectionGroupId` no longer names the temporary group are
/// detached. Emptied temporary groups are de-listed and purged. Returns the
/// purged ids.
pub fn sweep_temporary_groups<S: RecordStore + ?Sized>(
    store: &mut S,
    meeting_id: &RecordId,
    temp_prefix: &str,
) -> StoreResult<Vec<RecordId>> {
    let listed = store.linked_records(meeting_id, fields::REFLECTION_GROUPS)?;
    let mut purged = Vec::new();

    for group_id in listed
        .into_iter()
        .filter(|id| is_temporary_id(id, temp_prefix))
    {
        let members = store.linked_records(&group_id, fields::REFLECTIONS)?;
        let mut kept = Vec::with_capacity(members.len());
        for member_id in &members {
            let owner = store
                .get(member_id)?
                .and_then(|member| member.id_field(fields::REFLECTION_GROUP_ID));
            if owner.as_ref() == Some(&group_id) {
                kept.push(member_id.clone());
            }
        }
        if kept.len() != members.len() {
            store.set_linked_records(&group_id, fields::REFLECTIONS, kept.clone())?;
        }
        if kept.is_empty() {
            remove_from_list(store, meeting_id, fields::REFLECTION_GROUPS, &group_id)?;
            store.delete(&group_id)?;
            purged.push(group_id);
        }
    }

    if !purged.is_empty() {
        debug!(
            "event=temp_group_sweep module=relocation status=ok meeting_id={meeting_id} purged={}",
            purged.len()
        );
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::{relocate, sweep_temporary_groups};
    use crate::model::record::{Link, Record, RecordId};
    use crate::model::retro::{
        fields, MEETING_TYPENAME, REFLECTION_GROUP_TYPENAME, REFLECTION_TYPENAME,
    };
    use crate::store::memory::MemoryRecordStore;
    use crate::store::RecordStore;

    fn id(value: &str) -> RecordId {
        RecordId::from(value)
    }

    fn reflection(reflection_id: &str, group_id: &str, sort_order: f64) -> Record {
        Record::new(id(reflection_id), REFLECTION_TYPENAME)
            .with_field(fields::MEETING_ID, "m1")
            .with_field(fields::REFLECTION_GROUP_ID, group_id)
            .with_field(fields::SORT_ORDER, sort_order)
    }

    fn group(group_id: &str, sort_order: f64, members: &[&str]) -> Record {
        Record::new(id(group_id), REFLECTION_GROUP_TYPENAME)
            .with_field(fields::MEETING_ID, "m1")
            .with_field(fields::SORT_ORDER, sort_order)
            .with_field(fields::IS_ACTIVE, true)
            .with_link(
                fields::REFLECTIONS,
                Link::Many(members.iter().map(|member| id(member)).collect()),
            )
    }

    fn board() -> MemoryRecordStore {
        let mut store = MemoryRecordStore::new();
        store.insert(reflection("r1", "gA", 0.0)).unwrap();
        store.insert(reflection("r2", "gA", 1.0)).unwrap();
        store.insert(reflection("r3", "gB", 0.0)).unwrap();
        store.insert(group("gA", 0.0, &["r1", "r2"])).unwrap();
        store.insert(group("gB", 1.0, &["r3"])).unwrap();
        store
            .insert(
                Record::new(id("m1"), MEETING_TYPENAME)
                    .with_link(fields::REFLECTION_GROUPS, Link::Many(vec![id("gA"), id("gB")])),
            )
            .unwrap();
        store
    }

    #[test]
    fn missing_reflection_is_skipped() {
        let mut store = board();
        let before = store.clone();
        let outcome = relocate(&mut store, &id("ghost"), Some(&id("gA")), Some(&id("gB"))).unwrap();
        assert!(outcome.skipped);
        assert_eq!(store, before);
    }

    #[test]
    fn moving_last_member_retires_previous_group() {
        let mut store = board();
        store
            .set_field(&id("r3"), fields::REFLECTION_GROUP_ID, "gA".into())
            .unwrap();
        store.set_field(&id("r3"), fields::SORT_ORDER, 2.0.into()).unwrap();

        let outcome = relocate(&mut store, &id("r3"), Some(&id("gA")), Some(&id("gB"))).unwrap();
        assert_eq!(outcome.retired_group, Some(id("gB")));
        assert_eq!(
            store.linked_records(&id("gA"), fields::REFLECTIONS).unwrap(),
            vec![id("r1"), id("r2"), id("r3")]
        );
        assert_eq!(
            store.linked_records(&id("m1"), fields::REFLECTION_GROUPS).unwrap(),
            vec![id("gA")]
        );
        let retired = store.get(&id("gB")).unwrap().unwrap();
        assert_eq!(retired.bool_field(fields::IS_ACTIVE), Some(false));
    }

    #[test]
    fn second_call_changes_nothing() {
        let mut store = board();
        store
            .set_field(&id("r1"), fields::REFLECTION_GROUP_ID, "gB".into())
            .unwrap();
        relocate(&mut store, &id("r1"), Some(&id("gB")), Some(&id("gA"))).unwrap();
        let once = store.clone();

        let outcome = relocate(&mut store, &id("r1"), Some(&id("gB")), Some(&id("gA"))).unwrap();
        assert!(!outcome.changed());
        assert_eq!(store, once);
    }

    #[test]
    fn sweep_purges_temporary_group_whose_member_moved_on() {
        let mut store = board();
        store.insert(group("client:abc:1", 0.0, &["r2"])).unwrap();
        store
            .set_linked_records(
                &id("m1"),
                fields::REFLECTION_GROUPS,
                vec![id("client:abc:1"), id("gA"), id("gB")],
            )
            .unwrap();

        let purged = sweep_temporary_groups(&mut store, &id("m1"), "client:").unwrap();
        assert_eq!(purged, vec![id("client:abc:1")]);
        assert!(store.get(&id("client:abc:1")).unwrap().is_none());
        assert_eq!(
            store.linked_records(&id("m1"), fields::REFLECTION_GROUPS).unwrap(),
            vec![id("gA"), id("gB")]
        );
    }
}
