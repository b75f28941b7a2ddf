use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::model::Change;

// ── Detection ───────────────────────────────────────────────────

/// Counter: conflicting pairs reported by `find_conflicts`.
pub const CONFLICTS_FOUND_TOTAL: &str = "tourbook_conflicts_found_total";

/// Histogram: `find_conflicts` run time in seconds.
pub const DETECTION_DURATION_SECONDS: &str = "tourbook_detection_duration_seconds";

// ── Resolution ──────────────────────────────────────────────────

/// Counter: proposals made. Labels: kind.
pub const PROPOSALS_TOTAL: &str = "tourbook_proposals_total";

/// Counter: conflicts left unresolved. Labels: reason.
pub const UNRESOLVED_TOTAL: &str = "tourbook_unresolved_total";

// ── Ledger ──────────────────────────────────────────────────────

/// Histogram: journal flush + fsync duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "tourbook_journal_flush_duration_seconds";

/// Counter: changes refused by strict admission.
pub const ADMISSION_REJECTED_TOTAL: &str = "tourbook_admission_rejected_total";

/// Install a Prometheus recorder and return its handle for rendering. No-op if disabled.
pub fn init(enabled: bool) -> Option<PrometheusHandle> {
    if !enabled {
        return None;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("metrics recorder not installed: {e}");
            None
        }
    }
}

/// Map a Change variant to a short label for metrics.
pub fn change_label(change: &Change) -> &'static str {
    match change {
        Change::Reassign { .. } => "reassign",
        Change::Shift { .. } => "shift",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_labels() {
        let reassign = Change::Reassign {
            from: "Red".into(),
            to: "Blue".into(),
        };
        assert_eq!(change_label(&reassign), "reassign");
        assert_eq!(change_label(&Change::Shift { days: -1 }), "shift");
    }

    #[test]
    fn disabled_installs_nothing() {
        assert!(init(false).is_none());
    }
}
