//! Client-side identifiers for records the server has not confirmed yet.

use crate::model::record::RecordId;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Reserved prefix of temporary identifiers.
pub const DEFAULT_TEMP_ID_PREFIX: &str = "client:";

/// Allocates session-unique temporary ids of the form
/// `{prefix}{session}:{counter}`.
#[derive(Debug)]
pub struct TempIdAllocator {
    prefix: String,
    session: String,
    counter: AtomicU64,
}

impl TempIdAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        let session = Uuid::new_v4().simple().to_string();
        Self {
            prefix: prefix.into(),
            session: session[..8].to_string(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next_id(&self) -> RecordId {
        let value = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        RecordId::new(format!("{}{}:{value}", self.prefix, self.session))
    }

    /// Whether `id` was fabricated by an allocator using this prefix.
    pub fn is_temporary(&self, id: &RecordId) -> bool {
        is_temporary_id(id, &self.prefix)
    }
}

impl Default for TempIdAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_TEMP_ID_PREFIX)
    }
}

pub fn is_temporary_id(id: &RecordId, prefix: &str) -> bool {
    !prefix.is_empty() && id.as_str().starts_with(prefix)
}
