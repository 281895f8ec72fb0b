//! Normalized record shape shared by every store implementation.
//!
//! # Responsibility
//! - Define the identifier, scalar field and link representation of one
//!   cached entity.
//! - Keep relations as identifier references so records never own each other.
//!
//! # Invariants
//! - A field name is either a scalar field or a link on one record, never both.
//! - `Link::Many` preserves caller-supplied order; ordering policy lives in
//!   `store::ordered`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one normalized record.
///
/// Server-assigned ids are UUID strings; client-fabricated ids carry the
/// temporary prefix handed out by `TempIdAllocator`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh server-style identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

/// Reference from one record to others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    /// Single optional reference.
    One(Option<RecordId>),
    /// Ordered list of references.
    Many(Vec<RecordId>),
}

impl Link {
    /// Returns referenced ids in link order.
    pub fn targets(&self) -> Vec<RecordId> {
        match self {
            Self::One(target) => target.iter().cloned().collect(),
            Self::Many(targets) => targets.clone(),
        }
    }
}

/// One normalized entity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Entity type name, e.g. `RetroReflectionGroup`.
    pub typename: String,
    pub fields: BTreeMap<String, Value>,
    pub links: BTreeMap<String, Link>,
}

impl Record {
    /// Creates an empty record with only identity set.
    pub fn new(id: RecordId, typename: impl Into<String>) -> Self {
        Self {
            id,
            typename: typename.into(),
            fields: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Builder-style scalar field setter.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_field(name, value.into());
        self
    }

    /// Builder-style link setter.
    pub fn with_link(mut self, name: &str, link: Link) -> Self {
        self.set_link(name, link);
        self
    }

    /// Returns scalar field value. `null` is reported as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.links.remove(name);
        self.fields.insert(name.to_string(), value);
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.get(name)
    }

    pub fn set_link(&mut self, name: &str, link: Link) {
        self.fields.remove(name);
        self.links.insert(name.to_string(), link);
    }

    /// Removes field or link stored under `name`.
    pub fn unset(&mut self, name: &str) -> bool {
        let had_field = self.fields.remove(name).is_some();
        let had_link = self.links.remove(name).is_some();
        had_field || had_link
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn f64_field(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(Value::as_f64)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.field(name).and_then(Value::as_bool)
    }

    /// Reads a field holding another record's id.
    pub fn id_field(&self, name: &str) -> Option<RecordId> {
        self.str_field(name).map(RecordId::from)
    }

    /// Returns ids of a `Many` link; empty when absent or single.
    pub fn linked_ids(&self, name: &str) -> Vec<RecordId> {
        match self.link(name) {
            Some(Link::Many(targets)) => targets.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Link, Record, RecordId};
    use serde_json::json;

    #[test]
    fn null_fields_read_as_absent() {
        let record = Record::new(RecordId::from("r1"), "RetroReflection")
            .with_field("title", json!(null))
            .with_field("sortOrder", 3.0);
        assert!(record.field("title").is_none());
        assert_eq!(record.f64_field("sortOrder"), Some(3.0));
    }

    #[test]
    fn field_and_link_share_one_namespace() {
        let mut record = Record::new(RecordId::from("g1"), "RetroReflectionGroup")
            .with_field("reflections", json!("stale"));
        record.set_link("reflections", Link::Many(vec![RecordId::from("r1")]));
        assert!(record.field("reflections").is_none());
        assert_eq!(record.linked_ids("reflections"), vec![RecordId::from("r1")]);

        assert!(record.unset("reflections"));
        assert!(record.link("reflections").is_none());
    }
}
