//! In-process authoritative board.
//!
//! # Responsibility
//! - Apply end-drag intents to the authoritative copy of the board.
//! - Answer with the acknowledgement and payload the dispatcher confirms with.
//!
//! # Invariants
//! - Server-assigned group ids are UUIDs, never temporary ids.
//! - Appended sort keys carry no noise: `max + 1`.
//! - New solo groups are listed after the meeting's last group.

use crate::model::record::{Record, RecordId};
use crate::model::retro::{
    fields, timestamp_now, DropIntent, Reflection, ReflectionGroup, REFLECTION_TYPENAME,
};
use crate::mutation::transport::{DragAcknowledgement, DragResponse, DragTransport, TransportError};
use crate::mutation::{max_member_sort_order, EndDraggingPayload};
use crate::relocation::relocate;
use crate::service::board_service::{next_group_sort_order, BoardService};
use crate::store::memory::MemoryRecordStore;
use crate::store::RecordStore;
use log::{debug, warn};
use serde_json::Value;

/// Authoritative board reachable through `DragTransport`.
pub struct BoardServer {
    board: BoardService<MemoryRecordStore>,
    injected_failure: Option<TransportError>,
}

impl Default for BoardServer {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardServer {
    pub fn new() -> Self {
        Self {
            board: BoardService::new(MemoryRecordStore::new()),
            injected_failure: None,
        }
    }

    /// Seeding and read access to the authoritative board.
    pub fn board(&mut self) -> &mut BoardService<MemoryRecordStore> {
        &mut self.board
    }

    /// Copy of the authoritative records, used to prime client caches.
    pub fn snapshot(&self) -> MemoryRecordStore {
        self.board.store().clone()
    }

    /// Makes the next `end_dragging` call fail with `error` without touching
    /// the board.
    pub fn fail_next(&mut self, error: TransportError) {
        self.injected_failure = Some(error);
    }

    fn apply(&mut self, intent: &DropIntent) -> Result<DragResponse, TransportError> {
        let store = self.board.store_mut();
        let reflection_id = &intent.reflection_id;
        let Some(record) = store.get(reflection_id)? else {
            return Err(TransportError::Rejected(format!(
                "reflection {reflection_id} not found"
            )));
        };
        let previous_group_id = record.id_field(fields::REFLECTION_GROUP_ID);
        store.set_field(reflection_id, fields::IS_VIEWER_DRAGGING, Value::Bool(false))?;

        let mut destination = None;
        if intent.drop_target_type.is_some() {
            let (group_id, sort_order) = match &intent.drop_target_id {
                Some(target_id) => {
                    let group = store
                        .get(target_id)?
                        .filter(|group| group.bool_field(fields::IS_ACTIVE) == Some(true))
                        .ok_or_else(|| {
                            TransportError::Rejected(format!("group {target_id} is not active"))
                        })?;
                    (target_id.clone(), max_member_sort_order(&*store, &group)? + 1.0)
                }
                None => (create_solo_group(store, &record)?, 0.0),
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
            store.set_field(
                reflection_id,
                fields::UPDATED_AT,
                Value::from(timestamp_now()),
            )?;
            relocate(
                store,
                reflection_id,
                Some(&group_id),
                previous_group_id.as_ref(),
            )?;
            destination = Some(group_id);
        }

        let reflection = store
            .get(reflection_id)?
            .and_then(|record| Reflection::from_record(&record));
        let reflection_group = match &destination {
            Some(group_id) => store
                .get(group_id)?
                .and_then(|record| ReflectionGroup::from_record(&record)),
            None => None,
        };

        let old_reflection_group_id = match destination {
            Some(_) => previous_group_id,
            None => None,
        };
        Ok(DragResponse {
            acknowledgement: DragAcknowledgement {
                drag_id: intent.drag_id.clone(),
                reflection_id: reflection_id.clone(),
            },
            payload: EndDraggingPayload {
                drag_id: intent.drag_id.clone(),
                reflection,
                reflection_group,
                old_reflection_group_id,
                drop_target_type: intent.drop_target_type,
                drop_target_id: intent.drop_target_id.clone(),
            },
        })
    }
}

impl DragTransport for BoardServer {
    fn end_dragging(&mut self, intent: &DropIntent) -> Result<DragResponse, TransportError> {
        if let Some(error) = self.injected_failure.take() {
            warn!(
                "event=end_dragging module=server status=error error_code={} injected=true",
                error.code()
            );
            return Err(error);
        }

        self.apply(intent)
            .map(|response| {
                debug!(
                    "event=end_dragging module=server status=ok reflection_id={}",
                    intent.reflection_id
                );
                response
            })
            .map_err(|err| {
                warn!(
                    "event=end_dragging module=server status=error error_code={} reflection_id={}",
                    err.code(),
                    intent.reflection_id
                );
                err
            })
    }
}

fn create_solo_group(
    store: &mut MemoryRecordStore,
    reflection: &Record,
) -> Result<RecordId, TransportError> {
    if reflection.typename != REFLECTION_TYPENAME {
        return Err(TransportError::Rejected(format!(
            "record {} is not a reflection",
            reflection.id
        )));
    }
    let meeting_id = reflection.id_field(fields::MEETING_ID).ok_or_else(|| {
        TransportError::Rejected(format!("reflection {} has no meeting", reflection.id))
    })?;
    let sort_order = next_group_sort_order(&*store, &meeting_id)?.ok_or_else(|| {
        TransportError::Rejected(format!("meeting {meeting_id} not found"))
    })?;
    let now = timestamp_now();
    let group = ReflectionGroup {
        id: RecordId::generate(),
        meeting_id,
        sort_order,
        title: None,
        is_active: true,
        voter_ids: Vec::new(),
        reflection_ids: Vec::new(),
        created_at: now.clone(),
        updated_at: now,
    };
    let group_id = group.id.clone();
    store.insert(group.to_record())?;
    Ok(group_id)
}
