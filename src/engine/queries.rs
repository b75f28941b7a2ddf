use crate::model::*;

use super::{
    day_buckets, find_conflicts, find_location_clashes, free_spans, fully_booked_spans, resolve, tracks,
    EngineError, Ledger,
};

impl Ledger {
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Booking> {
        self.store.get(id)
    }

    /// All bookings ordered by track, then start date, then id.
    pub fn bookings(&self) -> Vec<Booking> {
        let mut out = self.store.to_vec();
        out.sort_by(|a, b| {
            a.track_id
                .cmp(&b.track_id)
                .then_with(|| a.start_date.cmp(&b.start_date))
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    pub fn tracks(&self) -> Vec<String> {
        tracks(&self.store.to_vec())
    }

    pub fn conflicts(&self) -> Result<Vec<ConflictPair>, EngineError> {
        find_conflicts(&self.store.to_vec())
    }

    pub fn location_clashes(&self) -> Result<Vec<LocationClash>, EngineError> {
        find_location_clashes(&self.store.to_vec())
    }

    /// Current conflicts and proposals to fix them. The ledger is not changed;
    /// pass the proposals to `apply`.
    pub fn resolve(
        &self,
        policy: &ResolutionPolicy,
    ) -> Result<(Vec<ConflictPair>, ResolutionOutcome), EngineError> {
        resolve(&self.store.to_vec(), policy)
    }

    pub fn free_spans(&self, track: &str, window: DateSpan) -> Result<Vec<DateSpan>, EngineError> {
        free_spans(&self.store.to_vec(), track, window)
    }

    pub fn fully_booked_spans(&self, window: DateSpan) -> Result<Vec<DateSpan>, EngineError> {
        fully_booked_spans(&self.store.to_vec(), window)
    }

    pub fn day_buckets(&self, window: DateSpan) -> Result<Vec<DayBucket>, EngineError> {
        day_buckets(&self.store.to_vec(), window)
    }
}
