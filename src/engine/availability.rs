use std::collections::{BTreeMap, BTreeSet};

use crate::limits::*;
use crate::model::*;

use super::conflict::partition;
use super::validate::validate_bookings;
use super::EngineError;

// ── Calendar views ────────────────────────────────────────────────

fn check_window(window: &DateSpan) -> Result<(), EngineError> {
    if window.end < window.start {
        return Err(EngineError::LimitExceeded("calendar window ends before it starts"));
    }
    if window.days() > MAX_CALENDAR_DAYS {
        return Err(EngineError::LimitExceeded("calendar window too wide"));
    }
    Ok(())
}

/// Days of `track` inside `window` with no booking, as maximal runs.
pub fn free_spans(
    bookings: &[Booking],
    track: &str,
    window: DateSpan,
) -> Result<Vec<DateSpan>, EngineError> {
    validate_bookings(bookings)?;
    check_window(&window)?;

    let mut busy: Vec<DateSpan> = bookings
        .iter()
        .filter(|b| b.track_id == track)
        .filter_map(|b| b.span().intersection(&window))
        .collect();
    busy.sort();
    let busy = merge_overlapping(&busy);

    Ok(subtract_spans(&[window], &busy))
}

/// Runs of days inside `window` on which every track of the batch is booked.
pub fn fully_booked_spans(bookings: &[Booking], window: DateSpan) -> Result<Vec<DateSpan>, EngineError> {
    validate_bookings(bookings)?;
    check_window(&window)?;

    let tracks = partition(bookings, |b| Some(b.track_id.as_str()));
    let mut busy: Vec<DateSpan> = Vec::new();
    for group in tracks.values() {
        // Same-track double bookings must not count twice.
        let clamped: Vec<DateSpan> = group
            .iter()
            .filter_map(|b| b.span().intersection(&window))
            .collect();
        busy.extend(merge_overlapping(&clamped));
    }
    busy.sort();
    Ok(saturated_spans(&busy, tracks.len() as u32))
}

/// One bucket per day of `window`: the ids active that day, grouped by track.
pub fn day_buckets(bookings: &[Booking], window: DateSpan) -> Result<Vec<DayBucket>, EngineError> {
    validate_bookings(bookings)?;
    check_window(&window)?;

    let mut buckets: Vec<DayBucket> = window
        .iter_days()
        .map(|day| DayBucket {
            day,
            tracks: BTreeMap::new(),
        })
        .collect();

    for (track, group) in partition(bookings, |b| Some(b.track_id.as_str())) {
        for b in group {
            let Some(active) = b.span().intersection(&window) else {
                continue;
            };
            let first = (active.start - window.start).num_days() as usize;
            let last = (active.end - window.start).num_days() as usize;
            for bucket in &mut buckets[first..=last] {
                bucket
                    .tracks
                    .entry(track.to_string())
                    .or_default()
                    .push(b.id.clone());
            }
        }
    }
    Ok(buckets)
}

/// Distinct track ids of a batch, sorted.
pub fn tracks(bookings: &[Booking]) -> Vec<String> {
    bookings
        .iter()
        .map(|b| b.track_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ── Span arithmetic ───────────────────────────────────────────────

/// Merge sorted spans that overlap or sit on consecutive days into disjoint runs.
pub fn merge_overlapping(sorted: &[DateSpan]) -> Vec<DateSpan> {
    let mut merged: Vec<DateSpan> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && last.end.succ_opt().is_none_or(|next| span.start <= next) {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Remove `to_remove` (sorted by start) from `base` (sorted, disjoint).
pub fn subtract_spans(base: &[DateSpan], to_remove: &[DateSpan]) -> Vec<DateSpan> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        while ri < to_remove.len() && to_remove[ri].end < b.start {
            ri += 1;
        }

        // `None` once a removal reaches the last day of the calendar.
        let mut current_start = Some(b.start);
        let mut j = ri;
        while let Some(cs) = current_start
            && j < to_remove.len()
            && to_remove[j].start <= b.end
        {
            let r = to_remove[j];
            if r.start > cs
                && let Some(before) = r.start.pred_opt() {
                    result.push(DateSpan::new(cs, before.min(b.end)));
                }
            current_start = if r.end < cs { Some(cs) } else { r.end.succ_opt() };
            j += 1;
        }

        if let Some(cs) = current_start
            && cs <= b.end {
                result.push(DateSpan::new(cs, b.end));
            }
    }

    result
}

/// Sweep line: runs of days where at least `capacity` spans are active.
/// Returns sorted, disjoint, non-adjacent runs.
pub fn saturated_spans(spans: &[DateSpan], capacity: u32) -> Vec<DateSpan> {
    if spans.is_empty() || capacity == 0 {
        return Vec::new();
    }
    if capacity == 1 {
        let mut sorted = spans.to_vec();
        sorted.sort();
        return merge_overlapping(&sorted);
    }

    // +1 on the first day, -1 on the day after the last. A span reaching the end of
    // the calendar never closes.
    let mut events: Vec<(Day, i64)> = Vec::with_capacity(spans.len() * 2);
    for s in spans {
        events.push((s.start, 1));
        if let Some(after) = s.end.succ_opt() {
            events.push((after, -1));
        }
    }
    events.sort();

    let capacity = i64::from(capacity);
    let mut result = Vec::new();
    let mut count: i64 = 0;
    let mut saturated_start: Option<Day> = None;

    let mut i = 0;
    while i < events.len() {
        let day = events[i].0;
        // Apply every event of this day before looking at the count.
        while i < events.len() && events[i].0 == day {
            count += events[i].1;
            i += 1;
        }

        if count >= capacity && saturated_start.is_none() {
            saturated_start = Some(day);
        } else if count < capacity
            && let Some(start) = saturated_start.take()
            && let Some(last) = day.pred_opt() {
                result.push(DateSpan::new(start, last));
            }
    }
    if let Some(start) = saturated_start {
        result.push(DateSpan::new(start, Day::MAX));
    }

    result
}
