//! In-process counters mirroring the exported metrics

use super::{
    record_counter, CHANGES_APPLIED, REBINDS_PERFORMED, REBINDS_SCHEDULED, RECONNECTS, REGISTRATIONS,
    SEQUENCE_ERRORS,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the coordinator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncMetrics {
    pub changes_applied: u64,
    pub sequence_errors: u64,
    pub rebinds_scheduled: u64,
    pub rebinds_performed: u64,
    pub reconnects: u64,
    pub registrations: u64,
}

/// Metrics collector shared between the coordinator and its handles.
///
/// Every increment is forwarded to the `metrics` facade as well.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    changes_applied: AtomicU64,
    sequence_errors: AtomicU64,
    rebinds_scheduled: AtomicU64,
    rebinds_performed: AtomicU64,
    reconnects: AtomicU64,
    registrations: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_changes_applied(&self, count: u64) {
        if count > 0 {
            self.changes_applied.fetch_add(count, Ordering::Relaxed);
            record_counter(CHANGES_APPLIED, count);
        }
    }

    pub fn inc_sequence_errors(&self) {
        self.sequence_errors.fetch_add(1, Ordering::Relaxed);
        record_counter(SEQUENCE_ERRORS, 1);
    }

    pub fn inc_rebinds_scheduled(&self) {
        self.rebinds_scheduled.fetch_add(1, Ordering::Relaxed);
        record_counter(REBINDS_SCHEDULED, 1);
    }

    pub fn inc_rebinds_performed(&self) {
        self.rebinds_performed.fetch_add(1, Ordering::Relaxed);
        record_counter(REBINDS_PERFORMED, 1);
    }

    pub fn inc_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        record_counter(RECONNECTS, 1);
    }

    pub fn inc_registrations(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        record_counter(REGISTRATIONS, 1);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> SyncMetrics {
        SyncMetrics {
            changes_applied: self.changes_applied.load(Ordering::Relaxed),
            sequence_errors: self.sequence_errors.load(Ordering::Relaxed),
            rebinds_scheduled: self.rebinds_scheduled.load(Ordering::Relaxed),
            rebinds_performed: self.rebinds_performed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let collector = MetricsCollector::new();
        collector.add_changes_applied(3);
        collector.add_changes_applied(0);
        collector.inc_sequence_errors();
        collector.inc_rebinds_scheduled();
        collector.inc_rebinds_scheduled();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.changes_applied, 3);
        assert_eq!(snapshot.sequence_errors, 1);
        assert_eq!(snapshot.rebinds_scheduled, 2);
        assert_eq!(snapshot.rebinds_performed, 0);
    }
}
