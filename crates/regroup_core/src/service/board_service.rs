//! Retrospective board use-case service.
//!
//! # Responsibility
//! - Seed meetings, groups and reflections with consistent links.
//! - Read ordered board layouts back from any record store.
//!
//! # Invariants
//! - New groups are listed in their meeting after every existing group.
//! - New reflections are appended after every existing member of their group.
//! - Reflection content must not be blank after trim.

use crate::model::record::RecordId;
use crate::model::retro::{
    fields, timestamp_now, Meeting, Reflection, ReflectionGroup, REFLECTION_GROUP_TYPENAME,
};
use crate::mutation::max_member_sort_order;
use crate::relocation::list_in_meeting;
use crate::store::ordered::insert_sorted_by;
use crate::store::{RecordStore, StoreError};
use log::debug;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from board service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Meeting record does not exist.
    MeetingNotFound(RecordId),
    /// Group record does not exist or is not a reflection group.
    GroupNotFound(RecordId),
    /// Reflection record does not exist.
    ReflectionNotFound(RecordId),
    /// Reflection content is blank after trim.
    BlankContent,
    /// Store-level failure.
    Store(StoreError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MeetingNotFound(id) => write!(f, "meeting not found: {id}"),
            Self::GroupNotFound(id) => write!(f, "reflection group not found: {id}"),
            Self::ReflectionNotFound(id) => write!(f, "reflection not found: {id}"),
            Self::BlankContent => write!(f, "reflection content must not be blank"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// One listed group with its members in sort order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupLayout {
    pub group: ReflectionGroup,
    pub reflections: Vec<Reflection>,
}

/// Meeting board as rendered: listed groups in sort order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardLayout {
    pub meeting: Meeting,
    pub groups: Vec<GroupLayout>,
}

impl BoardLayout {
    /// Member ids per listed group, in display order.
    pub fn member_ids(&self) -> Vec<(RecordId, Vec<RecordId>)> {
        self.groups
            .iter()
            .map(|entry| {
                let members = entry
                    .reflections
                    .iter()
                    .map(|reflection| reflection.id.clone())
                    .collect();
                (entry.group.id.clone(), members)
            })
            .collect()
    }
}

impl Display for BoardLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "meeting {} ({})", self.meeting.name, self.meeting.id)?;
        for entry in &self.groups {
            writeln!(
                f,
                "  group {} sort={} title={}",
                entry.group.id,
                entry.group.sort_order,
                entry.group.title.as_deref().unwrap_or("-")
            )?;
            for reflection in &entry.reflections {
                writeln!(
                    f,
                    "    reflection {} sort={} {}",
                    reflection.id, reflection.sort_order, reflection.content
                )?;
            }
        }
        Ok(())
    }
}

/// Board service facade over one record store.
pub struct BoardService<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> BoardService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Creates one meeting with an empty group list.
    pub fn create_meeting(&mut self, name: impl Into<String>) -> ServiceResult<Meeting> {
        let meeting = Meeting {
            id: RecordId::generate(),
            name: name.into(),
            group_ids: Vec::new(),
        };
        self.store.insert(meeting.to_record())?;
        debug!(
            "event=meeting_create module=service status=ok meeting_id={}",
            meeting.id
        );
        Ok(meeting)
    }

    /// Creates one active group listed after the meeting's last group.
    pub fn create_group(
        &mut self,
        meeting_id: &RecordId,
        title: Option<String>,
    ) -> ServiceResult<ReflectionGroup> {
        let sort_order = next_group_sort_order(&self.store, meeting_id)?
            .ok_or_else(|| ServiceError::MeetingNotFound(meeting_id.clone()))?;
        let now = timestamp_now();
        let group = ReflectionGroup {
            id: RecordId::generate(),
            meeting_id: meeting_id.clone(),
            sort_order,
            title,
            is_active: true,
            voter_ids: Vec::new(),
            reflection_ids: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.insert(group.to_record())?;
        list_in_meeting(&mut self.store, &group.id)?;
        Ok(group)
    }

    /// Appends one reflection to `group_id`.
    pub fn add_reflection(
        &mut self,
        group_id: &RecordId,
        content: impl Into<String>,
    ) -> ServiceResult<Reflection> {
        let content = normalize_content(content.into())?;
        let group_record = self
            .store
            .get(group_id)?
            .filter(|record| record.typename == REFLECTION_GROUP_TYPENAME)
            .ok_or_else(|| ServiceError::GroupNotFound(group_id.clone()))?;
        let meeting_id = group_record
            .id_field(fields::MEETING_ID)
            .ok_or_else(|| ServiceError::GroupNotFound(group_id.clone()))?;
        let sort_order = max_member_sort_order(&self.store, &group_record)? + 1.0;
        let now = timestamp_now();

        let reflection = Reflection {
            id: RecordId::generate(),
            meeting_id,
            reflection_group_id: Some(group_id.clone()),
            sort_order,
            content,
            is_viewer_dragging: false,
            is_dropping: false,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.insert(reflection.to_record())?;
        insert_sorted_by(
            &mut self.store,
            group_id,
            fields::REFLECTIONS,
            &reflection.id,
            fields::SORT_ORDER,
        )?;
        Ok(reflection)
    }

    /// Flags a reflection as being dragged by the local viewer.
    pub fn start_dragging(&mut self, reflection_id: &RecordId) -> ServiceResult<()> {
        let updated =
            self.store
                .set_field(reflection_id, fields::IS_VIEWER_DRAGGING, Value::Bool(true))?;
        if !updated {
            return Err(ServiceError::ReflectionNotFound(reflection_id.clone()));
        }
        Ok(())
    }

    pub fn meeting(&self, meeting_id: &RecordId) -> ServiceResult<Option<Meeting>> {
        Ok(self
            .store
            .get(meeting_id)?
            .and_then(|record| Meeting::from_record(&record)))
    }

    pub fn group(&self, group_id: &RecordId) -> ServiceResult<Option<ReflectionGroup>> {
        Ok(self
            .store
            .get(group_id)?
            .and_then(|record| ReflectionGroup::from_record(&record)))
    }

    pub fn reflection(&self, reflection_id: &RecordId) -> ServiceResult<Option<Reflection>> {
        Ok(self
            .store
            .get(reflection_id)?
            .and_then(|record| Reflection::from_record(&record)))
    }

    /// Listed groups of a meeting in list order; dangling references are skipped.
    pub fn meeting_groups(&self, meeting_id: &RecordId) -> ServiceResult<Vec<ReflectionGroup>> {
        let meeting = self
            .meeting(meeting_id)?
            .ok_or_else(|| ServiceError::MeetingNotFound(meeting_id.clone()))?;
        let mut groups = Vec::with_capacity(meeting.group_ids.len());
        for group_id in &meeting.group_ids {
            if let Some(group) = self.group(group_id)? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// Member reflections of a group in list order.
    pub fn group_members(&self, group_id: &RecordId) -> ServiceResult<Vec<Reflection>> {
        let group = self.require_group(group_id)?;
        let mut members = Vec::with_capacity(group.reflection_ids.len());
        for reflection_id in &group.reflection_ids {
            match self.reflection(reflection_id)? {
                Some(reflection) => members.push(reflection),
                None => debug!(
                    "event=group_members module=service status=skip group_id={group_id} reflection_id={reflection_id}"
                ),
            }
        }
        Ok(members)
    }

    pub fn layout(&self, meeting_id: &RecordId) -> ServiceResult<BoardLayout> {
        let meeting = self
            .meeting(meeting_id)?
            .ok_or_else(|| ServiceError::MeetingNotFound(meeting_id.clone()))?;
        let mut groups = Vec::with_capacity(meeting.group_ids.len());
        for group in self.meeting_groups(meeting_id)? {
            let reflections = self.group_members(&group.id)?;
            groups.push(GroupLayout { group, reflections });
        }
        Ok(BoardLayout { meeting, groups })
    }

    fn require_group(&self, group_id: &RecordId) -> ServiceResult<ReflectionGroup> {
        self.group(group_id)?
            .ok_or_else(|| ServiceError::GroupNotFound(group_id.clone()))
    }
}

/// Sort key placing a new group after every listed group of `meeting_id`.
///
/// Returns `None` when the meeting does not exist.
pub(crate) fn next_group_sort_order<S: RecordStore + ?Sized>(
    store: &S,
    meeting_id: &RecordId,
) -> Result<Option<f64>, StoreError> {
    let Some(meeting) = store.get(meeting_id)? else {
        return Ok(None);
    };
    let mut max: Option<f64> = None;
    for group_id in meeting.linked_ids(fields::REFLECTION_GROUPS) {
        let key = store
            .get(&group_id)?
            .filter(|group| group.typename == REFLECTION_GROUP_TYPENAME)
            .and_then(|group| group.f64_field(fields::SORT_ORDER));
        if let Some(key) = key {
            max = Some(max.map_or(key, |current| current.max(key)));
        }
    }
    Ok(Some(max.map_or(0.0, |key| key + 1.0)))
}

fn normalize_content(value: String) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::BlankContent);
    }
    Ok(trimmed.to_string())
}
