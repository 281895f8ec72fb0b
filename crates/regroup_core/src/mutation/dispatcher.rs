//! Two-phase end-drag dispatcher.
//!
//! # Responsibility
//! - Run the optimistic pass at submission time, inside an undo layer.
//! - Resolve each submission exactly once: confirm with the server payload or
//!   roll back on transport failure.
//!
//! # Invariants
//! - For one intent the optimistic pass always precedes the confirmatory pass.
//! - The optimistic writes are taken back before the confirmatory pass, except
//!   where another drop or confirmation has written the same slot since.
//!   Temporary groups that survive are purged by the confirmatory sweep.
//! - Drops may be pending at the same time and resolve in any order.
//! - The drop-settling flag is written outside the optimistic layer and
//!   survives the revert.

use crate::config::CoreConfig;
use crate::model::retro::DropIntent;
use crate::mutation::transport::{DragAcknowledgement, DragTransport, TransportError};
use crate::mutation::{
    apply_confirmatory, apply_optimistic, mark_dropping, ConfirmOutcome, EndDraggingPayload,
    OptimisticOutcome,
};
use crate::relocation::noise::SortNoise;
use crate::relocation::temp_id::TempIdAllocator;
use crate::store::layer::{OptimisticLayer, UndoLog};
use crate::store::{RecordStore, StoreResult};
use log::{debug, info, warn};
use std::time::Instant;

/// How one submitted drop was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Confirmed(ConfirmOutcome),
    RolledBack {
        error: TransportError,
        reverted_entries: usize,
    },
}

/// Submission front end owning the temporary-id and noise sources.
#[derive(Debug)]
pub struct Dispatcher {
    ids: TempIdAllocator,
    noise: SortNoise,
}

impl Dispatcher {
    pub fn new(config: &CoreConfig) -> Self {
        Self::with_sources(
            TempIdAllocator::new(config.temp_id_prefix.as_str()),
            SortNoise::new(config.noise_epsilon),
        )
    }

    pub fn with_sources(ids: TempIdAllocator, noise: SortNoise) -> Self {
        Self { ids, noise }
    }

    /// Applies the optimistic pass and returns the handle that resolves it.
    pub fn begin<S: RecordStore + ?Sized>(
        &mut self,
        store: &mut S,
        intent: DropIntent,
    ) -> StoreResult<PendingDrop> {
        let mut layer = OptimisticLayer::new(store);
        let optimistic = apply_optimistic(&mut layer, &intent, &self.ids, &mut self.noise)?;
        let undo = layer.into_undo_log();
        debug!(
            "event=drop_begin module=dispatcher status=ok reflection_id={} undo_entries={}",
            intent.reflection_id,
            undo.len()
        );
        Ok(PendingDrop {
            intent,
            optimistic,
            undo,
            acknowledged: false,
            temp_prefix: self.ids.prefix().to_string(),
        })
    }

    /// Runs one drop end to end against `transport`.
    ///
    /// Transport failures are reported in the outcome after rollback; only
    /// store failures surface as errors.
    pub fn submit<S, T>(
        &mut self,
        store: &mut S,
        transport: &mut T,
        intent: DropIntent,
    ) -> StoreResult<DispatchOutcome>
    where
        S: RecordStore + ?Sized,
        T: DragTransport + ?Sized,
    {
        let started_at = Instant::now();
        let mut pending = self.begin(store, intent)?;

        match transport.end_dragging(pending.intent()) {
            Ok(response) => {
                pending.acknowledge(store, &response.acknowledgement)?;
                let outcome = pending.complete(store, &response.payload)?;
                info!(
                    "event=drop_submit module=dispatcher status=ok duration_ms={} purged_temp_groups={}",
                    started_at.elapsed().as_millis(),
                    outcome.purged_temp_groups.len()
                );
                Ok(DispatchOutcome::Confirmed(outcome))
            }
            Err(error) => {
                let reverted_entries = pending.fail(store, &error)?;
                warn!(
                    "event=drop_submit module=dispatcher status=error duration_ms={} error_code={} reverted_entries={reverted_entries}",
                    started_at.elapsed().as_millis(),
                    error.code()
                );
                Ok(DispatchOutcome::RolledBack {
                    error,
                    reverted_entries,
                })
            }
        }
    }
}

/// One submitted drop awaiting the server.
///
/// `complete` and `fail` consume the handle, so a drop resolves exactly once.
#[derive(Debug)]
pub struct PendingDrop {
    intent: DropIntent,
    optimistic: OptimisticOutcome,
    undo: UndoLog,
    acknowledged: bool,
    temp_prefix: String,
}

impl PendingDrop {
    pub fn intent(&self) -> &DropIntent {
        &self.intent
    }

    pub fn optimistic(&self) -> &OptimisticOutcome {
        &self.optimistic
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Flags the reflection as dropping on the first acknowledgement only.
    ///
    /// Returns `true` when the flag was written by this call.
    pub fn acknowledge<S: RecordStore + ?Sized>(
        &mut self,
        store: &mut S,
        acknowledgement: &DragAcknowledgement,
    ) -> StoreResult<bool> {
        if self.acknowledged {
            return Ok(false);
        }
        self.acknowledged = true;
        mark_dropping(store, &acknowledgement.reflection_id)
    }

    /// Replaces the optimistic guess with the server's answer.
    ///
    /// Writes of other drops made after `begin` are kept.
    pub fn complete<S: RecordStore + ?Sized>(
        self,
        store: &mut S,
        payload: &EndDraggingPayload,
    ) -> StoreResult<ConfirmOutcome> {
        self.undo.revert(store)?;
        apply_confirmatory(store, payload, &self.temp_prefix)
    }

    /// Discards the optimistic guess after a transport failure.
    pub fn fail<S: RecordStore + ?Sized>(
        self,
        store: &mut S,
        error: &TransportError,
    ) -> StoreResult<usize> {
        debug!(
            "event=drop_rollback module=dispatcher status=start reflection_id={} error_code={}",
            self.intent.reflection_id,
            error.code()
        );
        self.undo.revert(store)
    }
}

#[cfg(test)]
mod tests {
    use super::Dispatcher;
    use crate::model::record::{Record, RecordId};
    use crate::model::retro::{fields, DropIntent, REFLECTION_TYPENAME};
    use crate::mutation::transport::TransportError;
    use crate::relocation::noise::SortNoise;
    use crate::relocation::temp_id::TempIdAllocator;
    use crate::store::memory::MemoryRecordStore;
    use crate::store::RecordStore;

    #[test]
    fn failed_cancel_restores_dragging_flag() {
        let mut store = MemoryRecordStore::new();
        store
            .insert(
                Record::new(RecordId::from("r1"), REFLECTION_TYPENAME)
                    .with_field(fields::MEETING_ID, "m1")
                    .with_field(fields::IS_VIEWER_DRAGGING, true),
            )
            .unwrap();
        let before = store.clone();
        let mut dispatcher =
            Dispatcher::with_sources(TempIdAllocator::default(), SortNoise::seeded(1e-6, 9));

        let pending = dispatcher
            .begin(&mut store, DropIntent::cancelled(RecordId::from("r1")))
            .unwrap();
        assert_ne!(store, before);

        let reverted = pending
            .fail(&mut store, &TransportError::Unavailable("timeout".to_string()))
            .unwrap();
        assert_eq!(reverted, 1);
        assert_eq!(store, before);
    }
}
