//! Ordered list-link maintenance.
//!
//! # Invariants
//! - A list link never contains the same id twice after these helpers run.
//! - Insertion lands before the first member whose sort key is strictly
//!   greater, so equal keys keep arrival order.
//! - Unchanged lists are not rewritten.

use super::{RecordStore, StoreResult};
use crate::model::record::RecordId;

/// Inserts `node_id` into the `list` link of `parent_id`, positioned by each
/// member's `sort_field`.
///
/// An existing occurrence is moved rather than duplicated. Returns `true` when
/// the stored list changed. Missing parent or node records make this a no-op;
/// a node without a sort key is appended.
pub fn insert_sorted_by<S: RecordStore + ?Sized>(
    store: &mut S,
    parent_id: &RecordId,
    list: &str,
    node_id: &RecordId,
    sort_field: &str,
) -> StoreResult<bool> {
    let Some(parent) = store.get(parent_id)? else {
        return Ok(false);
    };
    let Some(node) = store.get(node_id)? else {
        return Ok(false);
    };

    let current = parent.linked_ids(list);
    let mut members: Vec<RecordId> = current
        .iter()
        .filter(|id| *id != node_id)
        .cloned()
        .collect();

    let index = match node.f64_field(sort_field) {
        Some(node_key) => {
            let mut index = members.len();
            for (position, member_id) in members.iter().enumerate() {
                let member_key = store
                    .get(member_id)?
                    .and_then(|member| member.f64_field(sort_field));
                if matches!(member_key, Some(key) if key > node_key) {
                    index = position;
                    break;
                }
            }
            index
        }
        None => members.len(),
    };
    members.insert(index, node_id.clone());

    if members == current {
        return Ok(false);
    }
    store.set_linked_records(parent_id, list, members)
}

/// Removes every occurrence of `node_id` from the `list` link of `parent_id`.
///
/// Returns `true` when the stored list changed.
pub fn remove_from_list<S: RecordStore + ?Sized>(
    store: &mut S,
    parent_id: &RecordId,
    list: &str,
    node_id: &RecordId,
) -> StoreResult<bool> {
    let current = store.linked_records(parent_id, list)?;
    if !current.contains(node_id) {
        return Ok(false);
    }
    let remaining = current.into_iter().filter(|id| id != node_id).collect();
    store.set_linked_records(parent_id, list, remaining)
}
