//! Unit tests for metrics.rs module

use std::collections::HashSet;
use std::time::Duration;

use leasebot::metrics::MetricsCollector;
use leasebot::models::LeadStatus;

fn names(collector: &MetricsCollector) -> Vec<&'static str> {
    vec![
        collector.inbound_messages_total,
        collector.bursts_deferred_total,
        collector.extraction_failures_total,
        collector.fields_merged_total,
        collector.properties_attached_total,
        collector.status_transitions_total,
        collector.replies_total,
        collector.transport_failures_total,
        collector.turn_duration,
    ]
}

#[test]
fn test_metric_names_are_prefixed_and_unique() {
    let collector = MetricsCollector::default();
    let all = names(&collector);

    assert!(all.iter().all(|name| name.starts_with("leasebot_")));
    assert_eq!(all.iter().collect::<HashSet<_>>().len(), all.len());
}

#[test]
fn test_counters_end_in_total() {
    let collector = MetricsCollector::default();
    for name in names(&collector).into_iter().filter(|n| *n != collector.turn_duration) {
        assert!(name.ends_with("_total"), "{name} is a counter");
    }
    assert!(collector.turn_duration.ends_with("_seconds"));
}

#[test]
fn test_recording_every_metric_without_recorder() {
    let collector = MetricsCollector::default();
    collector.describe();

    collector.record_inbound();
    collector.record_deferred();
    collector.record_extraction_failure();
    collector.record_merge();
    collector.record_property_attached();
    collector.record_transport_failure();
    collector.record_reply("ai");
    collector.record_reply("fallback");
    for status in LeadStatus::ALL {
        collector.record_transition(status);
    }
    collector.record_turn(Duration::from_millis(250));
}
