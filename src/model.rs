use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

/// Calendar day, exchanged as `YYYY-MM-DD`. The only time type.
pub type Day = NaiveDate;

/// Inclusive interval `[start, end]` of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: Day,
    pub end: Day,
}

impl DateSpan {
    pub fn new(start: Day, end: Day) -> Self {
        debug_assert!(start <= end, "DateSpan start must not be after end");
        Self { start, end }
    }

    pub fn single(day: Day) -> Self {
        Self { start: day, end: day }
    }

    /// Number of days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Inclusive overlap: spans touching on one day overlap.
    pub fn overlaps(&self, other: &DateSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn intersection(&self, other: &DateSpan) -> Option<DateSpan> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateSpan { start, end })
    }

    pub fn contains_day(&self, day: Day) -> bool {
        self.start <= day && day <= self.end
    }

    /// Move both ends by `days` (negative moves earlier). `None` past the calendar's range.
    pub fn shifted(&self, days: i64) -> Option<DateSpan> {
        let delta = TimeDelta::try_days(days)?;
        Some(DateSpan {
            start: self.start.checked_add_signed(delta)?,
            end: self.end.checked_add_signed(delta)?,
        })
    }

    pub fn iter_days(&self) -> impl Iterator<Item = Day> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

impl fmt::Display for DateSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One scheduled engagement, assigned to exactly one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub track_id: String,
    pub start_date: Day,
    pub end_date: Day,
    #[serde(default)]
    pub location_id: Option<String>,
    /// Relative importance; heavier bookings are kept in place when possible.
    #[serde(default)]
    pub weight: Option<u32>,
}

impl Booking {
    pub fn new(id: impl Into<String>, track_id: impl Into<String>, span: DateSpan) -> Self {
        Self {
            id: id.into(),
            track_id: track_id.into(),
            start_date: span.start,
            end_date: span.end,
            location_id: None,
            weight: None,
        }
    }

    pub fn span(&self) -> DateSpan {
        DateSpan {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn set_span(&mut self, span: DateSpan) {
        self.start_date = span.start;
        self.end_date = span.end;
    }
}

/// Loose input shape: every field optional, dates as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub id: Option<String>,
    pub track_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location_id: Option<String>,
    pub weight: Option<u32>,
}

impl From<&Booking> for BookingRecord {
    fn from(b: &Booking) -> Self {
        Self {
            id: Some(b.id.clone()),
            track_id: Some(b.track_id.clone()),
            start_date: Some(b.start_date.to_string()),
            end_date: Some(b.end_date.to_string()),
            location_id: b.location_id.clone(),
            weight: b.weight,
        }
    }
}

/// A booking without an id yet; the ledger mints one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDraft {
    pub track_id: String,
    pub span: DateSpan,
    pub location_id: Option<String>,
    pub weight: Option<u32>,
}

/// Two bookings on the same track whose date ranges overlap.
/// `first_id` sorts before `second_id` by `(start_date, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPair {
    pub track_id: String,
    pub first_id: String,
    pub second_id: String,
    pub overlap_start: Day,
    pub overlap_end: Day,
}

impl ConflictPair {
    pub fn overlap(&self) -> DateSpan {
        DateSpan {
            start: self.overlap_start,
            end: self.overlap_end,
        }
    }
}

/// Two bookings on different tracks at the same place on overlapping days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationClash {
    pub location_id: String,
    pub first_id: String,
    pub first_track_id: String,
    pub second_id: String,
    pub second_track_id: String,
    pub overlap_start: Day,
    pub overlap_end: Day,
}

/// Caller rules for automatic conflict fixes.
/// JSON uses camelCase; policy files may keep snake_case keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolutionPolicy {
    /// Alternate tracks to try, in order, when reassigning.
    #[serde(alias = "preferred_track_order")]
    pub preferred_track_order: Vec<String>,
    /// Largest date shift, in days, when no reassignment works. Zero disables shifting.
    #[serde(alias = "max_shift_days")]
    pub max_shift_days: u32,
    /// Bookings that are never altered.
    #[serde(alias = "immovable_ids")]
    pub immovable_ids: BTreeSet<String>,
}

impl ResolutionPolicy {
    pub fn is_immovable(&self, id: &str) -> bool {
        self.immovable_ids.contains(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Change {
    /// Move to another track, dates unchanged.
    Reassign { from: String, to: String },
    /// Move both dates by `days` on the same track.
    Shift { days: i64 },
}

/// A proposed edit to exactly one booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionProposal {
    pub booking_id: String,
    pub change: Change,
    /// Track after the change.
    pub track_id: String,
    pub original: DateSpan,
    pub proposed: DateSpan,
    /// Bookings this one overlapped before the change.
    pub resolves: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvedReason {
    BothImmovable,
    NoPlacement,
}

impl UnresolvedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnresolvedReason::BothImmovable => "both_immovable",
            UnresolvedReason::NoPlacement => "no_placement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedConflict {
    pub conflict: ConflictPair,
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub proposals: Vec<ResolutionProposal>,
    pub unresolved: Vec<UnresolvedConflict>,
}

impl ResolutionOutcome {
    /// True when every conflict got a proposal.
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Bookings active on one day, grouped by track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub day: Day,
    pub tracks: BTreeMap<String, Vec<String>>,
}

/// The journal record format. Flat, no nesting beyond the booking itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingAdded { booking: Booking },
    BookingReassigned { id: String, track_id: String },
    BookingRescheduled { id: String, span: DateSpan },
    BookingCancelled { id: String },
}

impl Event {
    pub fn booking_id(&self) -> &str {
        match self {
            Event::BookingAdded { booking } => &booking.id,
            Event::BookingReassigned { id, .. }
            | Event::BookingRescheduled { id, .. }
            | Event::BookingCancelled { id } => id,
        }
    }
}

#[cfg(test)]
pub(crate) fn day(s: &str) -> Day {
    s.parse().unwrap()
}

#[cfg(test)]
pub(crate) fn span(start: &str, end: &str) -> DateSpan {
    DateSpan::new(day(start), day(end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = span("2024-07-01", "2024-07-04");
        assert_eq!(s.days(), 4);
        assert!(s.contains_day(day("2024-07-01")));
        assert!(s.contains_day(day("2024-07-04"))); // inclusive
        assert!(!s.contains_day(day("2024-07-05")));
        assert_eq!(DateSpan::single(day("2024-07-01")).days(), 1);
    }

    #[test]
    fn span_overlap_is_inclusive() {
        let a = span("2024-07-01", "2024-07-04");
        let b = span("2024-07-04", "2024-07-06");
        let c = span("2024-07-05", "2024-07-09");
        assert!(a.overlaps(&b)); // touching on one day
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent days, no shared day
    }

    #[test]
    fn span_intersection() {
        let a = span("2024-01-01", "2024-01-10");
        let b = span("2024-01-05", "2024-01-15");
        assert_eq!(a.intersection(&b), Some(span("2024-01-05", "2024-01-10")));
        let c = span("2024-01-20", "2024-01-25");
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn policy_json_is_camel_case() {
        let policy = ResolutionPolicy {
            preferred_track_order: vec!["Blue".into()],
            max_shift_days: 3,
            immovable_ids: ["X".to_string()].into_iter().collect(),
        };
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(
            json,
            r#"{"preferredTrackOrder":["Blue"],"maxShiftDays":3,"immovableIds":["X"]}"#
        );
        let back: ResolutionPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
        let snake: ResolutionPolicy =
            serde_json::from_str(r#"{"preferred_track_order":["Blue"],"max_shift_days":3,"immovable_ids":["X"]}"#)
                .unwrap();
        assert_eq!(snake, policy);
    }

    #[test]
    fn span_shift_preserves_length() {
        let s = span("2024-02-27", "2024-03-01"); // crosses a leap day
        let later = s.shifted(2).unwrap();
        assert_eq!(later, span("2024-02-29", "2024-03-03"));
        assert_eq!(later.days(), s.days());
        assert_eq!(s.shifted(-27).unwrap(), span("2024-01-31", "2024-02-03"));
    }

    #[test]
    fn span_shift_past_calendar_end() {
        let s = DateSpan::single(NaiveDate::MAX);
        assert!(s.shifted(1).is_none());
    }

    #[test]
    fn span_iter_days() {
        let days: Vec<Day> = span("2024-12-30", "2025-01-02").iter_days().collect();
        assert_eq!(days.len(), 4);
        assert_eq!(days[0], day("2024-12-30"));
        assert_eq!(days[3], day("2025-01-02"));
    }

    #[test]
    fn span_serializes_as_iso_dates() {
        let json = serde_json::to_string(&span("2024-07-01", "2024-07-04")).unwrap();
        assert_eq!(json, r#"{"start":"2024-07-01","end":"2024-07-04"}"#);
    }

    #[test]
    fn booking_json_field_names() {
        let json = r#"{"id":"X","trackId":"Red","startDate":"2024-07-01","endDate":"2024-07-04","locationId":"fargo"}"#;
        let b: Booking = serde_json::from_str(json).unwrap();
        assert_eq!(b.track_id, "Red");
        assert_eq!(b.span(), span("2024-07-01", "2024-07-04"));
        assert_eq!(b.location_id.as_deref(), Some("fargo"));
        assert_eq!(b.weight, None);
    }

    #[test]
    fn record_from_booking() {
        let b = Booking::new("X", "Red", span("2024-07-01", "2024-07-04"));
        let r = BookingRecord::from(&b);
        assert_eq!(r.start_date.as_deref(), Some("2024-07-01"));
        assert_eq!(r.end_date.as_deref(), Some("2024-07-04"));
    }

    #[test]
    fn proposal_change_is_tagged() {
        let c = Change::Reassign {
            from: "Red".into(),
            to: "Blue".into(),
        };
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"kind":"reassign","from":"Red","to":"Blue"}"#);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let mut booking = Booking::new("X", "Red", span("2024-07-01", "2024-07-04"));
        booking.location_id = Some("fargo".into());
        booking.weight = Some(3);
        let event = Event::BookingAdded { booking };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
        assert_eq!(decoded.booking_id(), "X");
    }
}
