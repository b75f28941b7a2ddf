use std::collections::BTreeMap;
use std::time::Instant;

use crate::model::*;
use crate::observability;

use super::validate::validate_bookings;
use super::EngineError;

/// Deterministic order inside a group: start date, then id.
pub(crate) fn order_key(b: &Booking) -> (Day, &str) {
    (b.start_date, b.id.as_str())
}

/// Group bookings by `key`, each group sorted by `order_key`. Groups come out ordered by key.
pub(crate) fn partition<'a, K: Ord>(
    bookings: impl IntoIterator<Item = &'a Booking>,
    key: impl Fn(&'a Booking) -> Option<K>,
) -> BTreeMap<K, Vec<&'a Booking>> {
    let mut groups: BTreeMap<K, Vec<&'a Booking>> = BTreeMap::new();
    for b in bookings {
        if let Some(k) = key(b) {
            groups.entry(k).or_default().push(b);
        }
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| order_key(a).cmp(&order_key(b)));
    }
    groups
}

/// Sweep line over one sorted group. Calls `emit(earlier, later, overlap)` for every
/// overlapping pair.
///
/// `open` holds the bookings whose end date has not yet passed the incoming start.
/// Anything that ended before the incoming start is evicted first; every booking left
/// in `open` starts no later than the incoming one and ends on or after its start, so
/// each of them overlaps it. Chained overlaps (A-B, B-C, not A-C) fall out naturally.
pub(crate) fn sweep<'a>(sorted: &[&'a Booking], mut emit: impl FnMut(&'a Booking, &'a Booking, DateSpan)) {
    let mut open: Vec<&'a Booking> = Vec::new();
    for &incoming in sorted {
        open.retain(|o| o.end_date >= incoming.start_date);
        for &o in &open {
            let overlap = DateSpan {
                start: incoming.start_date,
                end: o.end_date.min(incoming.end_date),
            };
            emit(o, incoming, overlap);
        }
        open.push(incoming);
    }
}

/// Every same-track pair with overlapping inclusive date ranges.
///
/// Ordered by track id, then by the earlier booking's `(start_date, id)`, then by the
/// later booking's. Input order does not matter.
pub fn find_conflicts(bookings: &[Booking]) -> Result<Vec<ConflictPair>, EngineError> {
    validate_bookings(bookings)?;
    let started = Instant::now();
    let conflicts = detect(bookings);
    metrics::histogram!(observability::DETECTION_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    metrics::counter!(observability::CONFLICTS_FOUND_TOTAL).increment(conflicts.len() as u64);
    Ok(conflicts)
}

/// `find_conflicts` without validation, for batches already known to be valid.
pub(crate) fn detect<'a>(bookings: impl IntoIterator<Item = &'a Booking>) -> Vec<ConflictPair> {
    let mut found = Vec::new();
    for (track, group) in partition(bookings, |b| Some(b.track_id.as_str())) {
        let mut pairs: Vec<(&Booking, &Booking, DateSpan)> = Vec::new();
        sweep(&group, |a, b, overlap| pairs.push((a, b, overlap)));
        pairs.sort_by(|x, y| {
            order_key(x.0)
                .cmp(&order_key(y.0))
                .then_with(|| order_key(x.1).cmp(&order_key(y.1)))
        });
        found.extend(pairs.into_iter().map(|(a, b, overlap)| ConflictPair {
            track_id: track.to_string(),
            first_id: a.id.clone(),
            second_id: b.id.clone(),
            overlap_start: overlap.start,
            overlap_end: overlap.end,
        }));
    }
    found
}

/// Bookings on different tracks sharing a location on overlapping days.
/// Same-track pairs are left out: `find_conflicts` already reports them.
pub fn find_location_clashes(bookings: &[Booking]) -> Result<Vec<LocationClash>, EngineError> {
    validate_bookings(bookings)?;
    let mut found = Vec::new();
    for (location, group) in partition(bookings, |b| b.location_id.as_deref()) {
        let mut pairs: Vec<(&Booking, &Booking, DateSpan)> = Vec::new();
        sweep(&group, |a, b, overlap| {
            if a.track_id != b.track_id {
                pairs.push((a, b, overlap));
            }
        });
        pairs.sort_by(|x, y| {
            order_key(x.0)
                .cmp(&order_key(y.0))
                .then_with(|| order_key(x.1).cmp(&order_key(y.1)))
        });
        found.extend(pairs.into_iter().map(|(a, b, overlap)| LocationClash {
            location_id: location.to_string(),
            first_id: a.id.clone(),
            first_track_id: a.track_id.clone(),
            second_id: b.id.clone(),
            second_track_id: b.track_id.clone(),
            overlap_start: overlap.start,
            overlap_end: overlap.end,
        }));
    }
    Ok(found)
}

/// First booking on `track` (other than `exclude`) overlapping `span`, in `order_key` order.
pub(crate) fn first_overlap<'a>(
    bookings: impl IntoIterator<Item = &'a Booking>,
    track: &str,
    span: &DateSpan,
    exclude: &str,
) -> Option<&'a Booking> {
    bookings
        .into_iter()
        .filter(|b| b.track_id == track && b.id != exclude && b.span().overlaps(span))
        .min_by(|a, b| order_key(a).cmp(&order_key(b)))
}
