use std::collections::HashSet;

use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{detect, first_overlap};
use super::{validate_booking, validate_bookings, Admission, EngineError, Ledger};

fn rejected(booking: &str, with: &str) -> EngineError {
    metrics::counter!(observability::ADMISSION_REJECTED_TOTAL).increment(1);
    EngineError::Conflict {
        booking: booking.to_string(),
        with: with.to_string(),
    }
}

impl Ledger {
    /// Refuse a placement that double-books `track` when admission is strict.
    fn admit(&self, id: &str, track: &str, span: &DateSpan, admission: Admission) -> Result<(), EngineError> {
        if admission == Admission::Lenient {
            return Ok(());
        }
        match first_overlap(self.store.iter(), track, span, id) {
            Some(other) => Err(rejected(id, &other.id)),
            None => Ok(()),
        }
    }

    fn existing(&self, id: &str) -> Result<&Booking, EngineError> {
        self.store
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub fn insert(&mut self, booking: Booking, admission: Admission) -> Result<(), EngineError> {
        validate_booking(&booking)?;
        if self.store.contains(&booking.id) {
            return Err(EngineError::AlreadyExists(booking.id));
        }
        if self.store.len() >= MAX_BOOKINGS_PER_LEDGER {
            return Err(EngineError::LimitExceeded("too many bookings in ledger"));
        }
        self.admit(&booking.id, &booking.track_id, &booking.span(), admission)?;
        debug!(booking = %booking.id, track = %booking.track_id, "booking added");
        self.persist_and_apply(Event::BookingAdded { booking })
    }

    /// Add a booking under a freshly minted id.
    pub fn create(&mut self, draft: BookingDraft, admission: Admission) -> Result<Booking, EngineError> {
        let booking = Booking {
            id: Ulid::new().to_string(),
            track_id: draft.track_id,
            start_date: draft.span.start,
            end_date: draft.span.end,
            location_id: draft.location_id,
            weight: draft.weight,
        };
        self.insert(booking.clone(), admission)?;
        Ok(booking)
    }

    /// Add a whole batch with one fsync. Nothing is added if any booking is refused.
    ///
    /// Strict admission checks the batch against the ledger and against itself.
    pub fn import(&mut self, bookings: Vec<Booking>, admission: Admission) -> Result<usize, EngineError> {
        validate_bookings(&bookings)?;
        if let Some(b) = bookings.iter().find(|b| self.store.contains(&b.id)) {
            return Err(EngineError::AlreadyExists(b.id.clone()));
        }
        if self.store.len() + bookings.len() > MAX_BOOKINGS_PER_LEDGER {
            return Err(EngineError::LimitExceeded("too many bookings in ledger"));
        }
        if admission == Admission::Strict {
            let incoming: HashSet<&str> = bookings.iter().map(|b| b.id.as_str()).collect();
            let clash = detect(self.store.iter().chain(bookings.iter()))
                .into_iter()
                .find(|c| incoming.contains(c.first_id.as_str()) || incoming.contains(c.second_id.as_str()));
            if let Some(c) = clash {
                let (booking, with) = if incoming.contains(c.second_id.as_str()) {
                    (c.second_id, c.first_id)
                } else {
                    (c.first_id, c.second_id)
                };
                return Err(rejected(&booking, &with));
            }
        }

        let count = bookings.len();
        let events: Vec<Event> = bookings
            .into_iter()
            .map(|booking| Event::BookingAdded { booking })
            .collect();
        self.persist_batch(&events)?;
        debug!(count, "bookings imported");
        Ok(count)
    }

    pub fn cancel(&mut self, id: &str) -> Result<Booking, EngineError> {
        let booking = self.existing(id)?.clone();
        self.persist_and_apply(Event::BookingCancelled { id: id.to_string() })?;
        debug!(booking = %id, "booking cancelled");
        Ok(booking)
    }

    /// Move a booking to `track_id`, dates unchanged.
    pub fn reassign(&mut self, id: &str, track_id: &str, admission: Admission) -> Result<(), EngineError> {
        let current = self.existing(id)?;
        if current.track_id == track_id {
            return Ok(());
        }
        let mut moved = current.clone();
        moved.track_id = track_id.to_string();
        validate_booking(&moved)?;
        self.admit(id, track_id, &moved.span(), admission)?;
        self.persist_and_apply(Event::BookingReassigned {
            id: id.to_string(),
            track_id: track_id.to_string(),
        })
    }

    /// Give a booking new dates on its current track.
    pub fn reschedule(&mut self, id: &str, span: DateSpan, admission: Admission) -> Result<(), EngineError> {
        let current = self.existing(id)?;
        if current.span() == span {
            return Ok(());
        }
        let mut moved = current.clone();
        moved.set_span(span);
        validate_booking(&moved)?;
        self.admit(id, &moved.track_id, &span, admission)?;
        self.persist_and_apply(Event::BookingRescheduled {
            id: id.to_string(),
            span,
        })
    }

    /// Apply resolution proposals as one journal batch. Proposals carry absolute
    /// targets, so applying the same set twice changes nothing the second time.
    pub fn apply(&mut self, proposals: &[ResolutionProposal]) -> Result<usize, EngineError> {
        let mut events = Vec::new();
        for p in proposals {
            let current = self.existing(&p.booking_id)?;
            let mut moved = current.clone();
            moved.track_id = p.track_id.clone();
            moved.set_span(p.proposed);
            validate_booking(&moved)?;
            if current.track_id != p.track_id {
                events.push(Event::BookingReassigned {
                    id: p.booking_id.clone(),
                    track_id: p.track_id.clone(),
                });
            }
            if current.span() != p.proposed {
                events.push(Event::BookingRescheduled {
                    id: p.booking_id.clone(),
                    span: p.proposed,
                });
            }
        }
        self.persist_batch(&events)?;
        debug!(proposals = proposals.len(), events = events.len(), "proposals applied");
        Ok(events.len())
    }
}
