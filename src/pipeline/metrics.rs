// src/pipeline/metrics.rs
//
// Run counters for one orchestrator. Logged at the end of each session and
// serialisable for the summary file.

use crate::types::ViolationKind;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub frames_processed: u64,
    pub frames_rejected: u64,
    pub events_by_kind: BTreeMap<ViolationKind, u64>,
    pub rule_failures: u64,
    /// Frames on which at least one rule was skipped for a missing input
    pub frames_missing_inputs: u64,
    pub evicted_tracks: u64,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            frames_processed: 0,
            frames_rejected: 0,
            events_by_kind: BTreeMap::new(),
            rule_failures: 0,
            frames_missing_inputs: 0,
            evicted_tracks: 0,
            started_at: Instant::now(),
        }
    }

    pub fn record_events(&mut self, kind: ViolationKind, count: u64) {
        if count > 0 {
            *self.events_by_kind.entry(kind).or_insert(0) += count;
        }
    }

    pub fn total_events(&self) -> u64 {
        self.events_by_kind.values().sum()
    }

    pub fn fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.frames_processed as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self, evidence_failures: u64) -> MetricsSummary {
        MetricsSummary {
            frames_processed: self.frames_processed,
            frames_rejected: self.frames_rejected,
            events_by_kind: self
                .events_by_kind
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            total_events: self.total_events(),
            rule_failures: self.rule_failures,
            frames_missing_inputs: self.frames_missing_inputs,
            evicted_tracks: self.evicted_tracks,
            evidence_failures,
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames_processed: u64,
    pub frames_rejected: u64,
    pub events_by_kind: BTreeMap<String, u64>,
    pub total_events: u64,
    pub rule_failures: u64,
    pub frames_missing_inputs: u64,
    pub evicted_tracks: u64,
    pub evidence_failures: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_counting() {
        let mut metrics = PipelineMetrics::new();
        metrics.record_events(ViolationKind::Overspeed, 2);
        metrics.record_events(ViolationKind::RedLight, 0);
        metrics.record_events(ViolationKind::Overspeed, 1);

        assert_eq!(metrics.total_events(), 3);
        let summary = metrics.summary(0);
        assert_eq!(summary.events_by_kind.get("overspeed"), Some(&3));
        assert!(!summary.events_by_kind.contains_key("red_light"));
    }

    #[test]
    fn test_summary_serializes() {
        let metrics = PipelineMetrics::new();
        let json = serde_json::to_value(metrics.summary(4)).unwrap();
        assert_eq!(json["evidence_failures"], 4);
        assert_eq!(json["frames_processed"], 0);
    }
}
