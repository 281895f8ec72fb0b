//! Retrospective board entities projected from normalized records.
//!
//! # Responsibility
//! - Name the record fields and links used by reflections, groups and
//!   meetings.
//! - Provide typed snapshots for building and reading records.
//!
//! # Invariants
//! - Field names match the wire names used by the board API payloads.
//! - A group's `reflections` link is ordered by member `sortOrder`.
//! - A meeting's `reflectionGroups` link is ordered by group `sortOrder`.

use crate::model::record::{Link, Record, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const REFLECTION_TYPENAME: &str = "RetroReflection";
pub const REFLECTION_GROUP_TYPENAME: &str = "RetroReflectionGroup";
pub const MEETING_TYPENAME: &str = "RetrospectiveMeeting";

/// Field and link names.
pub mod fields {
    pub const ID: &str = "id";
    pub const MEETING_ID: &str = "meetingId";
    pub const REFLECTION_GROUP_ID: &str = "reflectionGroupId";
    pub const SORT_ORDER: &str = "sortOrder";
    pub const IS_VIEWER_DRAGGING: &str = "isViewerDragging";
    pub const IS_DROPPING: &str = "isDropping";
    pub const IS_ACTIVE: &str = "isActive";
    pub const CONTENT: &str = "content";
    pub const TITLE: &str = "title";
    pub const NAME: &str = "name";
    pub const VOTER_IDS: &str = "voterIds";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const REFLECTIONS: &str = "reflections";
    pub const REFLECTION_GROUPS: &str = "reflectionGroups";
    pub const RETRO_REFLECTION_GROUP: &str = "retroReflectionGroup";
}

/// Reflection fields owned by the local client; server snapshots never
/// overwrite them.
pub const CLIENT_ONLY_FIELDS: [&str; 2] = [fields::IS_VIEWER_DRAGGING, fields::IS_DROPPING];

/// Current UTC time as RFC 3339 text.
pub fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Where a dragged reflection was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropTargetType {
    /// Empty grid space: the reflection becomes its own group.
    ReflectionGrid,
    /// An existing group.
    ReflectionGroup,
}

/// Input of one end-drag mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropIntent {
    pub reflection_id: RecordId,
    /// `None` means the drag was cancelled.
    pub drop_target_type: Option<DropTargetType>,
    /// `None` means a new solo group.
    pub drop_target_id: Option<RecordId>,
    /// Opaque correlation id forwarded to the transport.
    pub drag_id: Option<String>,
}

impl DropIntent {
    pub fn onto_group(reflection_id: RecordId, group_id: RecordId) -> Self {
        Self {
            reflection_id,
            drop_target_type: Some(DropTargetType::ReflectionGroup),
            drop_target_id: Some(group_id),
            drag_id: None,
        }
    }

    pub fn onto_grid(reflection_id: RecordId) -> Self {
        Self {
            reflection_id,
            drop_target_type: Some(DropTargetType::ReflectionGrid),
            drop_target_id: None,
            drag_id: None,
        }
    }

    pub fn cancelled(reflection_id: RecordId) -> Self {
        Self {
            reflection_id,
            drop_target_type: None,
            drop_target_id: None,
            drag_id: None,
        }
    }

    pub fn with_drag_id(mut self, drag_id: impl Into<String>) -> Self {
        self.drag_id = Some(drag_id.into());
        self
    }
}

/// Typed snapshot of a reflection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub id: RecordId,
    pub meeting_id: RecordId,
    pub reflection_group_id: Option<RecordId>,
    pub sort_order: f64,
    pub content: String,
    pub is_viewer_dragging: bool,
    pub is_dropping: bool,
    pub created_at: String,
    /// Bumped by the server whenever the reflection moves.
    pub updated_at: String,
}

impl Reflection {
    /// Reads a reflection view; `None` when the record is not a reflection or
    /// lacks its meeting or sort key.
    pub fn from_record(record: &Record) -> Option<Self> {
        if record.typename != REFLECTION_TYPENAME {
            return None;
        }
        Some(Self {
            id: record.id.clone(),
            meeting_id: record.id_field(fields::MEETING_ID)?,
            reflection_group_id: record.id_field(fields::REFLECTION_GROUP_ID),
            sort_order: record.f64_field(fields::SORT_ORDER)?,
            content: record
                .str_field(fields::CONTENT)
                .unwrap_or_default()
                .to_string(),
            is_viewer_dragging: record
                .bool_field(fields::IS_VIEWER_DRAGGING)
                .unwrap_or(false),
            is_dropping: record.bool_field(fields::IS_DROPPING).unwrap_or(false),
            created_at: record
                .str_field(fields::CREATED_AT)
                .unwrap_or_default()
                .to_string(),
            updated_at: record
                .str_field(fields::UPDATED_AT)
                .unwrap_or_default()
                .to_string(),
        })
    }

    pub fn to_record(&self) -> Record {
        let group_id = self
            .reflection_group_id
            .as_ref()
            .map(|id| Value::from(id.as_str()))
            .unwrap_or(Value::Null);
        Record::new(self.id.clone(), REFLECTION_TYPENAME)
            .with_field(fields::ID, self.id.as_str())
            .with_field(fields::MEETING_ID, self.meeting_id.as_str())
            .with_field(fields::REFLECTION_GROUP_ID, group_id)
            .with_field(fields::SORT_ORDER, self.sort_order)
            .with_field(fields::CONTENT, self.content.as_str())
            .with_field(fields::IS_VIEWER_DRAGGING, self.is_viewer_dragging)
            .with_field(fields::IS_DROPPING, self.is_dropping)
            .with_field(fields::CREATED_AT, self.created_at.as_str())
            .with_field(fields::UPDATED_AT, self.updated_at.as_str())
            .with_link(
                fields::RETRO_REFLECTION_GROUP,
                Link::One(self.reflection_group_id.clone()),
            )
    }
}

/// Typed snapshot of a reflection group record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionGroup {
    pub id: RecordId,
    pub meeting_id: RecordId,
    pub sort_order: f64,
    pub title: Option<String>,
    pub is_active: bool,
    pub voter_ids: Vec<String>,
    /// Member reflection ids in sort order.
    pub reflection_ids: Vec<RecordId>,
    pub created_at: String,
    pub updated_at: String,
}

impl ReflectionGroup {
    pub fn from_record(record: &Record) -> Option<Self> {
        if record.typename != REFLECTION_GROUP_TYPENAME {
            return None;
        }
        let voter_ids = record
            .field(fields::VOTER_IDS)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            id: record.id.clone(),
            meeting_id: record.id_field(fields::MEETING_ID)?,
            sort_order: record.f64_field(fields::SORT_ORDER).unwrap_or(0.0),
            title: record.str_field(fields::TITLE).map(str::to_string),
            is_active: record.bool_field(fields::IS_ACTIVE).unwrap_or(false),
            voter_ids,
            reflection_ids: record.linked_ids(fields::REFLECTIONS),
            created_at: record
                .str_field(fields::CREATED_AT)
                .unwrap_or_default()
                .to_string(),
            updated_at: record
                .str_field(fields::UPDATED_AT)
                .unwrap_or_default()
                .to_string(),
        })
    }

    pub fn to_record(&self) -> Record {
        let title = self
            .title
            .as_deref()
            .map(Value::from)
            .unwrap_or(Value::Null);
        Record::new(self.id.clone(), REFLECTION_GROUP_TYPENAME)
            .with_field(fields::ID, self.id.as_str())
            .with_field(fields::MEETING_ID, self.meeting_id.as_str())
            .with_field(fields::SORT_ORDER, self.sort_order)
            .with_field(fields::TITLE, title)
            .with_field(fields::IS_ACTIVE, self.is_active)
            .with_field(fields::VOTER_IDS, self.voter_ids.clone())
            .with_field(fields::CREATED_AT, self.created_at.as_str())
            .with_field(fields::UPDATED_AT, self.updated_at.as_str())
            .with_link(fields::REFLECTIONS, Link::Many(self.reflection_ids.clone()))
    }
}

/// Typed snapshot of a meeting record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: RecordId,
    pub name: String,
    /// Listed group ids in sort order.
    pub group_ids: Vec<RecordId>,
}

impl Meeting {
    pub fn from_record(record: &Record) -> Option<Self> {
        if record.typename != MEETING_TYPENAME {
            return None;
        }
        Some(Self {
            id: record.id.clone(),
            name: record
                .str_field(fields::NAME)
                .unwrap_or_default()
                .to_string(),
            group_ids: record.linked_ids(fields::REFLECTION_GROUPS),
        })
    }

    pub fn to_record(&self) -> Record {
        Record::new(self.id.clone(), MEETING_TYPENAME)
            .with_field(fields::ID, self.id.as_str())
            .with_field(fields::NAME, self.name.as_str())
            .with_link(fields::REFLECTION_GROUPS, Link::Many(self.group_ids.clone()))
    }
}
