mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod resolution;
mod store;
mod validate;

pub use availability::{
    day_buckets, free_spans, fully_booked_spans, merge_overlapping, saturated_spans, subtract_spans, tracks,
};
pub use conflict::{find_conflicts, find_location_clashes};
pub use error::{EngineError, Field, Reason, ValidationError};
pub use resolution::{apply_proposals, propose_resolution, resolve};
pub use store::BookingStore;
pub use validate::{parse_records, validate_booking, validate_bookings, validate_policy};

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::journal::Journal;
use crate::model::*;
use crate::observability;

/// What a ledger does with a change that double-books a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Admission {
    /// Refuse it with `EngineError::Conflict`.
    Strict,
    /// Accept it; it shows up in `Ledger::conflicts`.
    #[default]
    Lenient,
}

/// A season's bookings, persisted through an append-only journal.
///
/// Every change is journaled and fsynced before it is applied in memory. Once the
/// journal holds `compact_threshold` appends it is rewritten as one `BookingAdded`
/// per live booking.
pub struct Ledger {
    store: BookingStore,
    journal: Journal,
    compact_threshold: u64,
}

impl Ledger {
    /// Replay the journal at `path`, creating it if missing. `compact_threshold` of zero
    /// turns automatic compaction off.
    pub fn open(path: &Path, compact_threshold: u64) -> Result<Self, EngineError> {
        let events = Journal::replay(path)?;
        let journal = Journal::open(path)?;

        let mut store = BookingStore::new();
        for event in &events {
            store.apply_event(event);
        }
        info!(
            path = %path.display(),
            events = events.len(),
            bookings = store.len(),
            "ledger replayed"
        );

        Ok(Self {
            store,
            journal,
            compact_threshold,
        })
    }

    /// Journal `event`, then apply it.
    pub(super) fn persist_and_apply(&mut self, event: Event) -> Result<(), EngineError> {
        self.persist_batch(std::slice::from_ref(&event))
    }

    /// Journal every event with a single fsync, then apply them in order.
    pub(super) fn persist_batch(&mut self, events: &[Event]) -> Result<(), EngineError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut append_err = None;
        for event in events {
            if let Err(e) = self.journal.append_buffered(event) {
                append_err = Some(e);
                break;
            }
        }
        // Always flush, so a failed batch leaves no bytes behind for the next one.
        let flush_start = Instant::now();
        let flush_result = self.journal.flush_sync();
        metrics::histogram!(observability::JOURNAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Some(e) = append_err {
            return Err(e.into());
        }
        flush_result?;

        for event in events {
            debug!(booking = event.booking_id(), "event applied");
            self.store.apply_event(event);
        }
        self.maybe_compact();
        Ok(())
    }

    /// The batch is already durable, so a failed compaction is only logged and the
    /// next batch tries again.
    fn maybe_compact(&mut self) {
        if self.compact_threshold > 0
            && self.journal.appends_since_compact() >= self.compact_threshold
            && let Err(e) = self.compact()
        {
            warn!(path = %self.journal.path().display(), error = %e, "journal compaction failed");
        }
    }

    /// Rewrite the journal with only the events needed to recreate the current state.
    pub fn compact(&mut self) -> Result<(), EngineError> {
        let events = self.store.snapshot_events();
        self.journal.compact(&events)?;
        info!(path = %self.journal.path().display(), bookings = events.len(), "journal compacted");
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact()
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
    }
}
