//! End-drag mutation updaters.
//!
//! # Responsibility
//! - Apply the optimistic relocation at submission time.
//! - Apply the authoritative relocation once the server payload arrives.
//! - Flag a reflection as settling when the server first acknowledges it.
//!
//! # Invariants
//! - A drag without a drop target only clears `isViewerDragging`.
//! - Optimistic solo drops fabricate exactly one temporary group.
//! - Server snapshots never overwrite client-only reflection fields.

pub mod dispatcher;
pub mod transport;

use crate::model::record::{Link, Record, RecordId};
use crate::model::retro::{
    fields, timestamp_now, DropIntent, DropTargetType, Reflection, ReflectionGroup,
    CLIENT_ONLY_FIELDS, REFLECTION_GROUP_TYPENAME,
};
use crate::relocation::noise::SortNoise;
use crate::relocation::temp_id::TempIdAllocator;
use crate::relocation::{relocate, sweep_temporary_groups, RelocationOutcome};
use crate::store::{merge_record, RecordStore, StoreResult};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authoritative server result of one end-drag mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndDraggingPayload {
    pub drag_id: Option<String>,
    pub reflection: Option<Reflection>,
    pub reflection_group: Option<ReflectionGroup>,
    /// Group the server removed the reflection from.
    pub old_reflection_group_id: Option<RecordId>,
    pub drop_target_type: Option<DropTargetType>,
    pub drop_target_id: Option<RecordId>,
}

/// Result of the optimistic pass.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimisticOutcome {
    /// Reflection is not in the local store yet.
    ReflectionMissing,
    /// Drag released without a target; only the drag flag was cleared.
    DragCancelled,
    /// Named destination group is not in the local store.
    DropTargetMissing(RecordId),
    Relocated {
        group_id: RecordId,
        sort_order: f64,
        /// Destination group was fabricated under a temporary id.
        fabricated: bool,
        relocation: RelocationOutcome,
    },
}

/// Result of the confirmatory pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub relocation: RelocationOutcome,
    /// Temporary groups replaced by server records.
    pub purged_temp_groups: Vec<RecordId>,
}

/// Applies the local guess of where the dropped reflection lands.
pub fn apply_optimistic<S: RecordStore + ?Sized>(
    store: &mut S,
    intent: &DropIntent,
    ids: &TempIdAllocator,
    noise: &mut SortNoise,
) -> StoreResult<OptimisticOutcome> {
    let reflection_id = &intent.reflection_id;
    let Some(reflection) = store.get(reflection_id)? else {
        return Ok(OptimisticOutcome::ReflectionMissing);
    };

    if intent.drop_target_type.is_none() {
        store.set_field(reflection_id, fields::IS_VIEWER_DRAGGING, Value::Bool(false))?;
        return Ok(OptimisticOutcome::DragCancelled);
    }

    let previous_group_id = reflection.id_field(fields::REFLECTION_GROUP_ID);
    let (group_id, sort_order, fabricated) = match &intent.drop_target_id {
        None => {
            let group_id = ids.next_id();
            let now = timestamp_now();
            let meeting_id = reflection
                .field(fields::MEETING_ID)
                .cloned()
                .unwrap_or(Value::Null);
            let group = Record::new(group_id.clone(), REFLECTION_GROUP_TYPENAME)
                .with_field(fields::ID, group_id.as_str())
                .with_field(fields::CREATED_AT, now.as_str())
                .with_field(fields::MEETING_ID, meeting_id)
                .with_field(fields::IS_ACTIVE, true)
                .with_field(fields::SORT_ORDER, 0.0)
                .with_field(fields::UPDATED_AT, now.as_str())
                .with_field(fields::VOTER_IDS, Value::Array(Vec::new()))
                .with_link(fields::REFLECTIONS, Link::Many(Vec::new()));
            store.insert(group)?;
            (group_id, 0.0, true)
        }
        Some(target_id) => {
            let Some(group) = store.get(target_id)? else {
                return Ok(OptimisticOutcome::DropTargetMissing(target_id.clone()));
            };
            let max_sort_order = max_member_sort_order(store, &group)?;
            (target_id.clone(), max_sort_order + 1.0 + noise.sample(), false)
        }
    };

    store.set_field(reflection_id, fields::SORT_ORDER, Value::from(sort_order))?;
    store.set_field(
        reflection_id,
        fields::REFLECTION_GROUP_ID,
        Value::from(group_id.as_str()),
    )?;
    store.set_linked_record(
        reflection_id,
        fields::RETRO_REFLECTION_GROUP,
        Some(group_id.clone()),
    )?;

    let relocation = relocate(
        store,
        reflection_id,
        Some(&group_id),
        previous_group_id.as_ref(),
    )?;
    debug!(
        "event=optimistic_drop module=mutation status=ok reflection_id={reflection_id} group_id={group_id} fabricated={fabricated}"
    );
    Ok(OptimisticOutcome::Relocated {
        group_id,
        sort_order,
        fabricated,
        relocation,
    })
}

/// Normalizes the server payload into `store` and re-runs the relocation with
/// authoritative values.
///
/// Temporary groups of the reflection's meeting that the server did not
/// confirm are purged afterwards.
pub fn apply_confirmatory<S: RecordStore + ?Sized>(
    store: &mut S,
    payload: &EndDraggingPayload,
    temp_prefix: &str,
) -> StoreResult<ConfirmOutcome> {
    let Some(reflection) = &payload.reflection else {
        return Ok(ConfirmOutcome::default());
    };

    let mut reflection_record = reflection.to_record();
    for name in CLIENT_ONLY_FIELDS {
        reflection_record.unset(name);
    }
    merge_record(store, reflection_record)?;
    if let Some(group) = &payload.reflection_group {
        merge_record(store, group.to_record())?;
    }
    store.set_field(
        &reflection.id,
        fields::IS_VIEWER_DRAGGING,
        Value::Bool(false),
    )?;

    let relocation = relocate(
        store,
        &reflection.id,
        payload.reflection_group.as_ref().map(|group| &group.id),
        payload.old_reflection_group_id.as_ref(),
    )?;
    let purged_temp_groups = sweep_temporary_groups(store, &reflection.meeting_id, temp_prefix)?;

    debug!(
        "event=confirm_drop module=mutation status=ok reflection_id={} purged_temp_groups={}",
        reflection.id,
        purged_temp_groups.len()
    );
    Ok(ConfirmOutcome {
        relocation,
        purged_temp_groups,
    })
}

/// Marks a reflection as landed and awaiting final group confirmation.
pub fn mark_dropping<S: RecordStore + ?Sized>(
    store: &mut S,
    reflection_id: &RecordId,
) -> StoreResult<bool> {
    store.set_field(reflection_id, fields::IS_DROPPING, Value::Bool(true))
}

/// Highest member `sortOrder` of `group`, or `-1` when no member has one.
pub(crate) fn max_member_sort_order<S: RecordStore + ?Sized>(
    store: &S,
    group: &Record,
) -> StoreResult<f64> {
    let mut max: Option<f64> = None;
    for member_id in group.linked_ids(fields::REFLECTIONS) {
        let key = store
            .get(&member_id)?
            .and_then(|member| member.f64_field(fields::SORT_ORDER));
        if let Some(key) = key {
            max = Some(max.map_or(key, |current| current.max(key)));
        }
    }
    Ok(max.unwrap_or(-1.0))
}

#[cfg(test)]
mod tests {
    use super::{apply_optimistic, OptimisticOutcome};
    use crate::model::record::RecordId;
    use crate::model::retro::DropIntent;
    use crate::relocation::noise::SortNoise;
    use crate::relocation::temp_id::TempIdAllocator;
    use crate::store::memory::MemoryRecordStore;

    #[test]
    fn missing_reflection_leaves_store_untouched() {
        let mut store = MemoryRecordStore::new();
        let outcome = apply_optimistic(
            &mut store,
            &DropIntent::onto_grid(RecordId::from("ghost")),
            &TempIdAllocator::default(),
            &mut SortNoise::seeded(1e-6, 1),
        )
        .unwrap();
        assert_eq!(outcome, OptimisticOutcome::ReflectionMissing);
        assert!(store.is_empty());
    }
}
