//! Core engine for regrouping retrospective reflections.
//! Owns the normalized record cache and the optimistic drag-and-drop protocol.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod mutation;
pub mod relocation;
pub mod server;
pub mod service;
pub mod store;

pub use config::{ConfigError, CoreConfig, LoggingConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::record::{Link, Record, RecordId};
pub use model::retro::{DropIntent, DropTargetType, Meeting, Reflection, ReflectionGroup};
pub use mutation::dispatcher::{DispatchOutcome, Dispatcher, PendingDrop};
pub use mutation::transport::{DragAcknowledgement, DragResponse, DragTransport, TransportError};
pub use mutation::{
    apply_confirmatory, apply_optimistic, mark_dropping, ConfirmOutcome, EndDraggingPayload,
    OptimisticOutcome,
};
pub use relocation::noise::SortNoise;
pub use relocation::temp_id::TempIdAllocator;
pub use relocation::{relocate, RelocationOutcome};
pub use server::BoardServer;
pub use service::board_service::{BoardLayout, BoardService, GroupLayout, ServiceError};
pub use store::layer::{OptimisticLayer, UndoLog};
pub use store::memory::MemoryRecordStore;
pub use store::sqlite::SqliteRecordStore;
pub use store::{RecordStore, StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
