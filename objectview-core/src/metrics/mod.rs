//! Metrics for the sync coordinator
//!
//! Counters go through the `metrics` facade so any installed recorder
//! picks them up; the coordinator also keeps an in-process
//! [`MetricsCollector`] that tests and diagnostics can snapshot.

use metrics::{counter, describe_counter};

mod collector;

pub use collector::{MetricsCollector, SyncMetrics};

pub const CHANGES_APPLIED: &str = "objectview.changes.applied";
pub const SEQUENCE_ERRORS: &str = "objectview.sequence.errors";
pub const REBINDS_SCHEDULED: &str = "objectview.rebinds.scheduled";
pub const REBINDS_PERFORMED: &str = "objectview.rebinds.performed";
pub const RECONNECTS: &str = "objectview.reconnects";
pub const REGISTRATIONS: &str = "objectview.registrations";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(CHANGES_APPLIED, "Change events applied to replicas");
    describe_counter!(SEQUENCE_ERRORS, "Sequence gaps detected while applying changes");
    describe_counter!(REBINDS_SCHEDULED, "Rebind requests recorded");
    describe_counter!(REBINDS_PERFORMED, "Re-registrations issued by the rebind timer");
    describe_counter!(RECONNECTS, "Reconnect attempts after backoff");
    describe_counter!(REGISTRATIONS, "View registrations accepted by the hub");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}
