use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, TimeDelta};
use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{detect, order_key};
use super::validate::{validate_bookings, validate_policy};
use super::EngineError;

/// Working assignment while proposals are being made: where each booking sits now.
struct Board<'a> {
    /// track -> (start, id) -> end
    tracks: HashMap<&'a str, BTreeMap<(Day, &'a str), Day>>,
    /// track -> longest `end - start` ever placed there, in days
    reach: HashMap<&'a str, i64>,
    placed: HashMap<&'a str, (&'a str, DateSpan)>,
}

impl<'a> Board<'a> {
    fn new(bookings: &'a [Booking]) -> Self {
        let mut board = Self {
            tracks: HashMap::new(),
            reach: HashMap::new(),
            placed: HashMap::with_capacity(bookings.len()),
        };
        for b in bookings {
            board.place(&b.id, &b.track_id, b.span());
        }
        board
    }

    fn place(&mut self, id: &'a str, track: &'a str, span: DateSpan) {
        if let Some((old_track, old_span)) = self.placed.insert(id, (track, span))
            && let Some(lane) = self.tracks.get_mut(old_track) {
                lane.remove(&(old_span.start, id));
            }
        self.tracks
            .entry(track)
            .or_default()
            .insert((span.start, id), span.end);
        let len = (span.end - span.start).num_days();
        let reach = self.reach.entry(track).or_default();
        *reach = (*reach).max(len);
    }

    fn get(&self, id: &str) -> Option<(&'a str, DateSpan)> {
        self.placed.get(id).copied()
    }

    /// Ids on `track` overlapping `span`, other than `id`, in `(start, id)` order.
    /// Only starts within the lane's longest booking of `span.start` can reach `span`.
    fn overlapping<'s>(
        &'s self,
        track: &str,
        span: DateSpan,
        id: &'s str,
    ) -> impl Iterator<Item = &'a str> + 's {
        let reach = self.reach.get(track).copied().unwrap_or(0);
        let lo = TimeDelta::try_days(reach)
            .and_then(|back| span.start.checked_sub_signed(back))
            .unwrap_or(Day::MIN);
        self.tracks
            .get(track)
            .into_iter()
            .flat_map(move |lane| lane.range((lo, "")..))
            .take_while(move |((start, _), _)| *start <= span.end)
            .filter(move |((_, other), end)| *other != id && **end >= span.start)
            .map(|((_, other), _)| *other)
    }

    fn is_free(&self, track: &str, span: DateSpan, id: &str) -> bool {
        self.overlapping(track, span, id).next().is_none()
    }

    /// Still on the same track and still overlapping.
    fn is_live(&self, a: &str, b: &str) -> bool {
        match (self.get(a), self.get(b)) {
            (Some((ta, sa)), Some((tb, sb))) => ta == tb && sa.overlaps(&sb),
            _ => false,
        }
    }
}

fn in_calendar(span: &DateSpan) -> bool {
    (MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&span.start.year())
        && (MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&span.end.year())
}

/// Which side of a conflict to try moving, in order. Immovable bookings are never listed.
fn movers<'b>(first: &'b Booking, second: &'b Booking, policy: &ResolutionPolicy) -> Vec<&'b Booking> {
    let mut order = match (first.weight, second.weight) {
        (Some(wa), Some(wb)) if wa < wb => vec![first, second],
        (Some(wa), Some(wb)) if wa > wb => vec![second, first],
        // No usable weights: the later-starting booking moves.
        _ => vec![second, first],
    };
    order.retain(|b| !policy.is_immovable(&b.id));
    order
}

/// First placement for `id` that overlaps nothing: a preferred track with the same
/// dates, else a shift on its own track, smallest first, earlier before later.
fn find_placement<'a>(
    board: &Board<'a>,
    id: &str,
    policy: &'a ResolutionPolicy,
) -> Option<(Change, &'a str, DateSpan)> {
    let (track, span) = board.get(id)?;

    for candidate in &policy.preferred_track_order {
        if candidate == track {
            continue;
        }
        if board.is_free(candidate, span, id) {
            let change = Change::Reassign {
                from: track.to_string(),
                to: candidate.clone(),
            };
            return Some((change, candidate.as_str(), span));
        }
    }

    for d in 1..=i64::from(policy.max_shift_days) {
        for days in [-d, d] {
            let Some(shifted) = span.shifted(days) else {
                continue;
            };
            if in_calendar(&shifted) && board.is_free(track, shifted, id) {
                return Some((Change::Shift { days }, track, shifted));
            }
        }
    }

    None
}

/// Propose edits that remove `conflicts` from `bookings` under `policy`.
///
/// Conflicts are handled in `find_conflicts` order. Every accepted proposal lands the
/// booking where it overlaps nothing, so later proposals never undo earlier ones and
/// each booking is altered at most once. Conflicts that cannot be fixed come back in
/// `unresolved`. The input is never modified.
pub fn propose_resolution(
    bookings: &[Booking],
    conflicts: &[ConflictPair],
    policy: &ResolutionPolicy,
) -> Result<ResolutionOutcome, EngineError> {
    validate_bookings(bookings)?;
    validate_policy(policy)?;

    let by_id: HashMap<&str, &Booking> = bookings.iter().map(|b| (b.id.as_str(), b)).collect();
    let mut ordered: Vec<(&Booking, &Booking, &ConflictPair)> = Vec::with_capacity(conflicts.len());
    for c in conflicts {
        let a = *by_id
            .get(c.first_id.as_str())
            .ok_or_else(|| EngineError::NotFound(c.first_id.clone()))?;
        let b = *by_id
            .get(c.second_id.as_str())
            .ok_or_else(|| EngineError::NotFound(c.second_id.clone()))?;
        let (a, b) = if order_key(a) <= order_key(b) { (a, b) } else { (b, a) };
        ordered.push((a, b, c));
    }
    ordered.sort_by(|x, y| {
        x.2.track_id
            .cmp(&y.2.track_id)
            .then_with(|| order_key(x.0).cmp(&order_key(y.0)))
            .then_with(|| order_key(x.1).cmp(&order_key(y.1)))
    });
    ordered.dedup_by(|x, y| x.0.id == y.0.id && x.1.id == y.1.id);

    let mut board = Board::new(bookings);
    let mut outcome = ResolutionOutcome::default();

    for (first, second, conflict) in ordered {
        if !board.is_live(&first.id, &second.id) {
            continue;
        }

        let candidates = movers(first, second, policy);
        if candidates.is_empty() {
            outcome.unresolved.push(UnresolvedConflict {
                conflict: conflict.clone(),
                reason: UnresolvedReason::BothImmovable,
            });
            continue;
        }

        let mut placed = false;
        for mover in candidates {
            let Some((change, track, proposed)) = find_placement(&board, &mover.id, policy) else {
                continue;
            };
            let (old_track, original) = board
                .get(&mover.id)
                .ok_or_else(|| EngineError::NotFound(mover.id.clone()))?;
            let resolves: Vec<String> = board
                .overlapping(old_track, original, &mover.id)
                .map(str::to_string)
                .collect();
            debug!(booking = %mover.id, ?change, %proposed, "proposing change");
            metrics::counter!(observability::PROPOSALS_TOTAL, "kind" => observability::change_label(&change))
                .increment(1);
            board.place(&mover.id, track, proposed);
            outcome.proposals.push(ResolutionProposal {
                booking_id: mover.id.clone(),
                change,
                track_id: track.to_string(),
                original,
                proposed,
                resolves,
            });
            placed = true;
            break;
        }

        if !placed {
            outcome.unresolved.push(UnresolvedConflict {
                conflict: conflict.clone(),
                reason: UnresolvedReason::NoPlacement,
            });
        }
    }

    // A later move can settle a pair that had no placement when it came up.
    outcome
        .unresolved
        .retain(|u| board.is_live(&u.conflict.first_id, &u.conflict.second_id));
    for u in &outcome.unresolved {
        metrics::counter!(observability::UNRESOLVED_TOTAL, "reason" => u.reason.as_str()).increment(1);
    }
    info!(
        conflicts = conflicts.len(),
        proposals = outcome.proposals.len(),
        unresolved = outcome.unresolved.len(),
        "resolution proposed"
    );
    Ok(outcome)
}

/// Detect and resolve in one call.
pub fn resolve(
    bookings: &[Booking],
    policy: &ResolutionPolicy,
) -> Result<(Vec<ConflictPair>, ResolutionOutcome), EngineError> {
    validate_bookings(bookings)?;
    let conflicts = detect(bookings);
    let outcome = propose_resolution(bookings, &conflicts, policy)?;
    Ok((conflicts, outcome))
}

/// A copy of `bookings` with every proposal applied. Proposals for unknown ids are ignored.
pub fn apply_proposals(bookings: &[Booking], proposals: &[ResolutionProposal]) -> Vec<Booking> {
    let by_id: HashMap<&str, &ResolutionProposal> = proposals
        .iter()
        .map(|p| (p.booking_id.as_str(), p))
        .collect();
    bookings
        .iter()
        .map(|b| {
            let mut b = b.clone();
            if let Some(p) = by_id.get(b.id.as_str()) {
                b.track_id = p.track_id.clone();
                b.set_span(p.proposed);
            }
            b
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(id: &str, track: &str, start: &str, end: &str) -> Booking {
        Booking::new(id, track, span(start, end))
    }

    fn policy(tracks: &[&str], max_shift_days: u32, immovable: &[&str]) -> ResolutionPolicy {
        ResolutionPolicy {
            preferred_track_order: tracks.iter().map(|t| t.to_string()).collect(),
            max_shift_days,
            immovable_ids: immovable.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn board_overlapping_window() {
        let bookings = vec![
            on("a", "Red", "2024-01-01", "2024-01-10"),
            on("b", "Red", "2024-01-12", "2024-01-12"),
            on("c", "Red", "2024-03-01", "2024-03-02"),
        ];
        let board = Board::new(&bookings);
        let hits: Vec<&str> = board
            .overlapping("Red", span("2024-01-10", "2024-01-12"), "x")
            .collect();
        assert_eq!(hits, vec!["a", "b"]);
        assert!(board.is_free("Red", span("2024-01-13", "2024-02-29"), "x"));
        assert!(board.is_free("Blue", span("2024-01-01", "2024-12-31"), "x"));
    }

    #[test]
    fn board_sees_bookings_longer_than_a_year() {
        let bookings = vec![on("residency", "Red", "2022-01-01", "2024-12-31")];
        let mut board = Board::new(&bookings);
        let hits: Vec<&str> = board
            .overlapping("Red", span("2024-06-01", "2024-06-01"), "x")
            .collect();
        assert_eq!(hits, vec!["residency"]);

        // Moving the long booking away does not shrink how far back the lane is searched.
        board.place("residency", "Blue", span("2022-01-01", "2024-12-31"));
        assert!(board.is_free("Red", span("2024-06-01", "2024-06-01"), "x"));
        assert!(!board.is_free("Blue", span("2024-12-31", "2025-01-05"), "x"));
    }

    #[test]
    fn board_place_moves_entry() {
        let bookings = vec![on("a", "Red", "2024-01-01", "2024-01-10")];
        let mut board = Board::new(&bookings);
        board.place("a", "Blue", span("2024-01-01", "2024-01-10"));
        assert!(board.is_free("Red", span("2024-01-01", "2024-01-10"), "x"));
        assert!(!board.is_free("Blue", span("2024-01-05", "2024-01-05"), "x"));
    }

    #[test]
    fn movers_prefer_lighter_then_later() {
        let mut a = on("a", "Red", "2024-01-01", "2024-01-10");
        let mut b = on("b", "Red", "2024-01-05", "2024-01-06");
        let none = ResolutionPolicy::default();
        fn ids(v: Vec<&Booking>) -> Vec<String> {
            v.into_iter().map(|b| b.id.clone()).collect()
        }
        assert_eq!(ids(movers(&a, &b, &none)), vec!["b", "a"]);
        a.weight = Some(1);
        b.weight = Some(5);
        assert_eq!(ids(movers(&a, &b, &none)), vec!["a", "b"]);
        b.weight = Some(1);
        assert_eq!(ids(movers(&a, &b, &none)), vec!["b", "a"]);
        let pinned = policy(&[], 0, &["b"]);
        assert_eq!(ids(movers(&a, &b, &pinned)), vec!["a"]);
    }

    #[test]
    fn shift_prefers_earlier_at_equal_distance() {
        // Y can leave X by moving one day either way; earlier wins.
        let bookings = vec![
            on("X", "Red", "2024-07-01", "2024-07-01"),
            on("Y", "Red", "2024-07-01", "2024-07-01"),
        ];
        let (_, outcome) = resolve(&bookings, &policy(&[], 3, &["X"])).unwrap();
        assert_eq!(outcome.proposals.len(), 1);
        assert_eq!(outcome.proposals[0].booking_id, "Y");
        assert_eq!(outcome.proposals[0].change, Change::Shift { days: -1 });
        assert_eq!(outcome.proposals[0].proposed, span("2024-06-30", "2024-06-30"));
        assert_eq!(outcome.proposals[0].resolves, vec!["X".to_string()]);
    }

    #[test]
    fn shift_never_leaves_calendar() {
        let bookings = vec![
            on("X", "Red", "2199-12-31", "2199-12-31"),
            on("Y", "Red", "2199-12-31", "2199-12-31"),
            on("Z", "Red", "2199-12-30", "2199-12-30"),
        ];
        // Earlier is blocked by Z, later would leave the supported calendar.
        let outcome = propose_resolution(
            &bookings,
            &detect(&bookings),
            &policy(&[], 1, &["X", "Z"]),
        )
        .unwrap();
        assert!(outcome.proposals.is_empty());
        assert_eq!(outcome.unresolved.len(), 1);
        assert_eq!(outcome.unresolved[0].reason, UnresolvedReason::NoPlacement);
    }

    #[test]
    fn unknown_conflict_id_is_not_found() {
        let bookings = vec![on("X", "Red", "2024-07-01", "2024-07-04")];
        let conflict = ConflictPair {
            track_id: "Red".into(),
            first_id: "X".into(),
            second_id: "ghost".into(),
            overlap_start: day("2024-07-01"),
            overlap_end: day("2024-07-01"),
        };
        let result = propose_resolution(&bookings, &[conflict], &ResolutionPolicy::default());
        assert!(matches!(result, Err(EngineError::NotFound(id)) if id == "ghost"));
    }

    #[test]
    fn apply_proposals_ignores_unknown_ids() {
        let bookings = vec![on("X", "Red", "2024-07-01", "2024-07-04")];
        let proposal = ResolutionProposal {
            booking_id: "ghost".into(),
            change: Change::Shift { days: 1 },
            track_id: "Red".into(),
            original: span("2024-07-01", "2024-07-04"),
            proposed: span("2024-07-02", "2024-07-05"),
            resolves: Vec::new(),
        };
        assert_eq!(apply_proposals(&bookings, &[proposal]), bookings);
    }
}
