use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Duration;

use crate::models::LeadStatus;

/// Metric names emitted by the funnel.
///
/// Recording goes through the `metrics` facade; without an installed
/// recorder every call is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    pub inbound_messages_total: &'static str,
    pub bursts_deferred_total: &'static str,
    pub extraction_failures_total: &'static str,
    pub fields_merged_total: &'static str,
    pub properties_attached_total: &'static str,
    pub status_transitions_total: &'static str,
    pub replies_total: &'static str,
    pub transport_failures_total: &'static str,
    pub turn_duration: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            inbound_messages_total: "leasebot_inbound_messages_total",
            bursts_deferred_total: "leasebot_bursts_deferred_total",
            extraction_failures_total: "leasebot_extraction_failures_total",
            fields_merged_total: "leasebot_fields_merged_total",
            properties_attached_total: "leasebot_properties_attached_total",
            status_transitions_total: "leasebot_status_transitions_total",
            replies_total: "leasebot_replies_total",
            transport_failures_total: "leasebot_transport_failures_total",
            turn_duration: "leasebot_turn_duration_seconds",
        }
    }
}

impl MetricsCollector {
    /// Register descriptions with whatever recorder is installed
    pub fn describe(&self) {
        describe_counter!(self.inbound_messages_total, "Inbound SMS messages accepted");
        describe_counter!(self.bursts_deferred_total, "Handlers that deferred to a newer message");
        describe_counter!(self.extraction_failures_total, "Extraction turns that produced nothing");
        describe_counter!(self.fields_merged_total, "Merge passes that changed a lead");
        describe_counter!(self.properties_attached_total, "Property interests created from extraction");
        describe_counter!(self.status_transitions_total, "Automatic status advances");
        describe_counter!(self.replies_total, "Replies produced, by source");
        describe_counter!(self.transport_failures_total, "Outbound sends that failed");
        describe_histogram!(self.turn_duration, Unit::Seconds, "Time to process one conversational turn");
    }

    pub fn record_inbound(&self) {
        counter!(self.inbound_messages_total).increment(1);
    }

    pub fn record_deferred(&self) {
        counter!(self.bursts_deferred_total).increment(1);
    }

    pub fn record_extraction_failure(&self) {
        counter!(self.extraction_failures_total).increment(1);
    }

    pub fn record_merge(&self) {
        counter!(self.fields_merged_total).increment(1);
    }

    pub fn record_property_attached(&self) {
        counter!(self.properties_attached_total).increment(1);
    }

    pub fn record_transition(&self, to: LeadStatus) {
        counter!(self.status_transitions_total, "status" => to.as_str()).increment(1);
    }

    /// `source` is "ai" or "fallback"
    pub fn record_reply(&self, source: &'static str) {
        counter!(self.replies_total, "source" => source).increment(1);
    }

    pub fn record_transport_failure(&self) {
        counter!(self.transport_failures_total).increment(1);
    }

    pub fn record_turn(&self, duration: Duration) {
        histogram!(self.turn_duration).record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::default();
        assert_eq!(collector.inbound_messages_total, "leasebot_inbound_messages_total");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let collector = MetricsCollector::default();
        collector.describe();
        collector.record_inbound();
        collector.record_transition(LeadStatus::IdVerified);
        collector.record_turn(Duration::from_millis(12));
    }
}
