use std::collections::HashSet;

use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::error::{EngineError, Field, Reason, ValidationError};

/// Collects problems for one booking of a batch.
struct Problems<'a> {
    index: usize,
    booking_id: Option<String>,
    errors: &'a mut Vec<ValidationError>,
}

impl Problems<'_> {
    fn push(&mut self, field: Field, reason: Reason) {
        self.errors.push(ValidationError {
            index: self.index,
            booking_id: self.booking_id.clone(),
            field,
            reason,
        });
    }

    fn text(&mut self, field: Field, value: &str) {
        if value.trim().is_empty() {
            self.push(field, Reason::Missing);
        } else if value.len() > MAX_ID_LEN {
            self.push(field, Reason::TooLong);
        }
    }

    fn span(&mut self, start: Day, end: Day) {
        if end < start {
            self.push(Field::EndDate, Reason::EndBeforeStart);
        }
    }

    fn parse_day(&mut self, field: Field, raw: Option<String>) -> Option<Day> {
        let Some(raw) = raw else {
            self.push(field, Reason::Missing);
            return None;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            self.push(field, Reason::Missing);
            return None;
        }
        match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                self.push(field, Reason::Malformed(raw));
                None
            }
        }
    }
}

fn non_blank(s: &Option<String>) -> Option<String> {
    s.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

fn finish(errors: Vec<ValidationError>) -> Result<(), EngineError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Invalid(errors))
    }
}

/// Check a typed batch. Every problem is reported, not just the first.
pub fn validate_bookings(bookings: &[Booking]) -> Result<(), EngineError> {
    if bookings.len() > MAX_BOOKINGS_PER_BATCH {
        return Err(EngineError::LimitExceeded("too many bookings in batch"));
    }
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::with_capacity(bookings.len());
    for (index, b) in bookings.iter().enumerate() {
        let mut p = Problems {
            index,
            booking_id: (!b.id.trim().is_empty()).then(|| b.id.clone()),
            errors: &mut errors,
        };
        validate_one(&mut p, b);
        if !b.id.trim().is_empty() && !seen.insert(b.id.as_str()) {
            p.push(Field::Id, Reason::DuplicateId);
        }
    }
    finish(errors)
}

/// Check a single booking outside of any batch.
pub fn validate_booking(booking: &Booking) -> Result<(), EngineError> {
    let mut errors = Vec::new();
    let mut p = Problems {
        index: 0,
        booking_id: (!booking.id.trim().is_empty()).then(|| booking.id.clone()),
        errors: &mut errors,
    };
    validate_one(&mut p, booking);
    finish(errors)
}

fn validate_one(p: &mut Problems<'_>, b: &Booking) {
    p.text(Field::Id, &b.id);
    p.text(Field::TrackId, &b.track_id);
    if let Some(loc) = &b.location_id
        && loc.len() > MAX_ID_LEN {
            p.push(Field::LocationId, Reason::TooLong);
        }
    p.span(b.start_date, b.end_date);
}

/// Turn loose input records into bookings, or report every problem in the batch.
pub fn parse_records(records: Vec<BookingRecord>) -> Result<Vec<Booking>, EngineError> {
    if records.len() > MAX_BOOKINGS_PER_BATCH {
        return Err(EngineError::LimitExceeded("too many bookings in batch"));
    }
    let mut errors = Vec::new();
    let mut bookings = Vec::with_capacity(records.len());
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        let booking_id = non_blank(&record.id);
        let mut p = Problems {
            index,
            booking_id: booking_id.clone(),
            errors: &mut errors,
        };

        p.text(Field::Id, record.id.as_deref().unwrap_or(""));
        p.text(Field::TrackId, record.track_id.as_deref().unwrap_or(""));
        if let Some(loc) = &record.location_id
            && loc.len() > MAX_ID_LEN {
                p.push(Field::LocationId, Reason::TooLong);
            }
        let start = p.parse_day(Field::StartDate, record.start_date);
        let end = p.parse_day(Field::EndDate, record.end_date);
        if let (Some(s), Some(e)) = (start, end) {
            p.span(s, e);
        }
        if let Some(id) = &booking_id
            && !seen.insert(id.clone()) {
                p.push(Field::Id, Reason::DuplicateId);
            }

        if let (Some(id), Some(track_id), Some(start_date), Some(end_date)) =
            (booking_id, non_blank(&record.track_id), start, end)
        {
            bookings.push(Booking {
                id,
                track_id,
                start_date,
                end_date,
                location_id: non_blank(&record.location_id),
                weight: record.weight,
            });
        }
    }

    finish(errors)?;
    Ok(bookings)
}

pub fn validate_policy(policy: &ResolutionPolicy) -> Result<(), EngineError> {
    if policy.max_shift_days > MAX_SHIFT_DAYS {
        return Err(EngineError::LimitExceeded("max_shift_days too large"));
    }
    if policy.preferred_track_order.len() > MAX_PREFERRED_TRACKS {
        return Err(EngineError::LimitExceeded("too many preferred tracks"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, track: &str, start: &str, end: &str) -> BookingRecord {
        BookingRecord {
            id: Some(id.into()),
            track_id: Some(track.into()),
            start_date: Some(start.into()),
            end_date: Some(end.into()),
            location_id: None,
            weight: None,
        }
    }

    fn invalid(result: Result<Vec<Booking>, EngineError>) -> Vec<ValidationError> {
        match result {
            Err(EngineError::Invalid(errors)) => errors,
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn parse_valid_records() {
        let bookings = parse_records(vec![
            record("X", "Red", "2024-07-01", "2024-07-04"),
            record("Y", "Red", "2024-07-04", "2024-07-04"),
        ])
        .unwrap();
        assert_eq!(bookings.len(), 2);
        assert_eq!(bookings[1].span(), span("2024-07-04", "2024-07-04"));
    }

    #[test]
    fn parse_empty_batch() {
        assert!(parse_records(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn end_before_start_names_the_booking() {
        let errors = invalid(parse_records(vec![record("X", "Red", "2024-07-04", "2024-07-01")]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].booking_id.as_deref(), Some("X"));
        assert_eq!(errors[0].field, Field::EndDate);
        assert_eq!(errors[0].reason, Reason::EndBeforeStart);
    }

    #[test]
    fn all_problems_collected_across_batch() {
        let mut missing = BookingRecord::default();
        missing.track_id = Some("Red".into());
        let errors = invalid(parse_records(vec![
            record("A", "Red", "2024-07-01", "2024-07-02"),
            missing,
            record("B", "Red", "07/01/2024", "2024-07-02"),
            record("A", "Blue", "2024-07-01", "2024-07-02"),
        ]));
        // #1: id, startDate, endDate missing
        let first: Vec<_> = errors.iter().filter(|e| e.index == 1).collect();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|e| e.reason == Reason::Missing));
        assert!(first.iter().all(|e| e.booking_id.is_none()));
        // #2: malformed start
        assert!(errors.iter().any(|e| e.index == 2
            && e.field == Field::StartDate
            && matches!(e.reason, Reason::Malformed(_))));
        // #3: duplicate of #0
        assert!(errors.iter().any(|e| e.index == 3 && e.reason == Reason::DuplicateId));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn blank_strings_are_missing() {
        let errors = invalid(parse_records(vec![record("  ", "", "2024-07-01", " ")]));
        let fields: Vec<Field> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec![Field::Id, Field::TrackId, Field::EndDate]);
    }

    #[test]
    fn long_and_distant_bookings_are_valid() {
        let bookings = parse_records(vec![
            record("old", "Red", "1850-01-01", "1850-01-02"),
            record("residency", "Red", "2024-01-01", "2026-06-01"),
        ])
        .unwrap();
        assert_eq!(bookings.len(), 2);
        assert!(validate_bookings(&bookings).is_ok());
    }

    #[test]
    fn id_too_long() {
        let long = "x".repeat(MAX_ID_LEN + 1);
        let errors = invalid(parse_records(vec![record(&long, "Red", "2024-01-01", "2024-01-01")]));
        assert_eq!(errors[0].reason, Reason::TooLong);
    }

    #[test]
    fn validate_typed_batch() {
        let mut bad = Booking::new("Y", "Red", span("2024-07-01", "2024-07-01"));
        bad.end_date = day("2024-06-30");
        let batch = vec![
            Booking::new("X", "Red", span("2024-07-01", "2024-07-04")),
            bad,
            Booking::new("X", "", span("2024-07-01", "2024-07-04")),
        ];
        let Err(EngineError::Invalid(errors)) = validate_bookings(&batch) else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].reason, Reason::EndBeforeStart);
        assert_eq!(errors[1].field, Field::TrackId);
        assert_eq!(errors[2].reason, Reason::DuplicateId);
    }

    #[test]
    fn validation_error_display() {
        let e = ValidationError {
            index: 4,
            booking_id: Some("X".into()),
            field: Field::EndDate,
            reason: Reason::EndBeforeStart,
        };
        assert_eq!(e.to_string(), r#"booking "X" (#4): endDate ends before it starts"#);
    }

    #[test]
    fn policy_limits() {
        let mut policy = ResolutionPolicy::default();
        assert!(validate_policy(&policy).is_ok());
        policy.max_shift_days = MAX_SHIFT_DAYS + 1;
        assert!(matches!(validate_policy(&policy), Err(EngineError::LimitExceeded(_))));
    }
}
