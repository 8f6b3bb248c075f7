use serde::Serialize;
use tracing::info;

/// Read-only snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Telemetry {
    pub raw_total: u64,
    pub raw_dropped: u64,
    pub raw_consecutive_drop_run: u64,
    pub processed_total: u64,
    pub processed_dropped: u64,
    pub processed_consecutive_drop_run: u64,
    pub forced_gap_events: u64,
    pub skipped_sequences: u64,
    pub reorder_overflow_events: u64,
    pub late_discards: u64,
    pub transform_failures: u64,
    pub delivered: u64,
    pub reorder_pending: usize,
    pub workers: usize,
}

impl Telemetry {
    pub fn raw_accepted(&self) -> u64 {
        self.raw_total - self.raw_dropped
    }

    pub fn processed_accepted(&self) -> u64 {
        self.processed_total - self.processed_dropped
    }

    /// Fraction of offered raw frames that never reached a worker.
    pub fn raw_drop_ratio(&self) -> f64 {
        if self.raw_total == 0 {
            0.0
        } else {
            self.raw_dropped as f64 / self.raw_total as f64
        }
    }

    /// Publish as gauges to whatever `metrics` recorder the host installed.
    pub fn export_metrics(&self) {
        metrics::gauge!("raw_total").set(self.raw_total as f64);
        metrics::gauge!("raw_dropped").set(self.raw_dropped as f64);
        metrics::gauge!("processed_total").set(self.processed_total as f64);
        metrics::gauge!("processed_dropped").set(self.processed_dropped as f64);
        metrics::gauge!("frames_delivered").set(self.delivered as f64);
        metrics::gauge!("reorder_pending").set(self.reorder_pending as f64);
        metrics::gauge!("active_workers").set(self.workers as f64);
    }

    pub fn log_summary(&self) {
        info!(
            raw_total = self.raw_total,
            raw_dropped = self.raw_dropped,
            processed_total = self.processed_total,
            processed_dropped = self.processed_dropped,
            transform_failures = self.transform_failures,
            forced_gaps = self.forced_gap_events,
            skipped = self.skipped_sequences,
            overflow = self.reorder_overflow_events,
            late = self.late_discards,
            delivered = self.delivered,
            "Pipeline telemetry"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_counts() {
        let t = Telemetry {
            raw_total: 10,
            raw_dropped: 4,
            processed_total: 6,
            processed_dropped: 1,
            ..Default::default()
        };
        assert_eq!(t.raw_accepted(), 6);
        assert_eq!(t.processed_accepted(), 5);
        assert!((t.raw_drop_ratio() - 0.4).abs() < f64::EPSILON);
        assert_eq!(Telemetry::default().raw_drop_ratio(), 0.0);
    }
}
