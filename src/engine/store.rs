use std::collections::BTreeMap;

use crate::model::*;

/// Current bookings of a ledger, keyed by id.
#[derive(Debug, Default)]
pub struct BookingStore {
    bookings: BTreeMap<String, Booking>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bookings.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Booking> {
        self.bookings.get(id)
    }

    /// Bookings in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.values()
    }

    pub fn to_vec(&self) -> Vec<Booking> {
        self.bookings.values().cloned().collect()
    }

    // ── Event application ────────────────────────────────────

    /// Events naming an unknown booking are skipped, so a journal cut short by a
    /// crash still replays.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::BookingAdded { booking } => {
                self.bookings.insert(booking.id.clone(), booking.clone());
            }
            Event::BookingReassigned { id, track_id } => {
                if let Some(b) = self.bookings.get_mut(id) {
                    b.track_id = track_id.clone();
                }
            }
            Event::BookingRescheduled { id, span } => {
                if let Some(b) = self.bookings.get_mut(id) {
                    b.set_span(*span);
                }
            }
            Event::BookingCancelled { id } => {
                self.bookings.remove(id);
            }
        }
    }

    /// The shortest event list that rebuilds this state.
    pub fn snapshot_events(&self) -> Vec<Event> {
        self.bookings
            .values()
            .map(|b| Event::BookingAdded { booking: b.clone() })
            .collect()
    }
}
