use crate::service_event;
use crate::telemetry::{runtime_counters, ReadinessState, RuntimeCounters};
use std::sync::OnceLock;
use std::time::Duration;

pub use crate::telemetry::{
    ProbeOutcomeSnapshot, ReadinessStatusSnapshot, RuntimeCountersSnapshot,
};

/// Collector that wraps the runtime counter APIs with a single entrypoint.
pub struct MetricsCollector {
    counters: &'static RuntimeCounters,
}

impl MetricsCollector {
    fn new() -> Self {
        Self {
            counters: runtime_counters(),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        self.counters.snapshot()
    }

    /// Logs one `readiness_counters` event per service and one
    /// `probe_counters` event per service/category pair, then returns the
    /// snapshot that was logged.
    pub fn log_snapshot(&self) -> RuntimeCountersSnapshot {
        let snapshot = self.snapshot();
        for status in &snapshot.readiness {
            service_event!(
                info,
                "readiness_counters",
                service = status.service.as_str(),
                state = status.state.as_str(),
                attempts = status.attempts,
                duration_ms = status.duration_ms.unwrap_or_default(),
            );
        }
        for outcome in &snapshot.probe_outcomes {
            service_event!(
                info,
                "probe_counters",
                service = outcome.service.as_str(),
                category = outcome.category,
                success = outcome.success,
                failure = outcome.failure,
            );
        }
        snapshot
    }

    pub fn register_readiness_target(&self, service: &str) {
        self.counters.register_readiness_target(service);
    }

    pub fn record_ready(&self, service: &str, attempts: u32, elapsed: Duration) {
        self.counters
            .record_readiness(service, ReadinessState::Ready, attempts, elapsed);
    }

    pub fn record_timed_out(&self, service: &str, attempts: u32, elapsed: Duration) {
        self.counters
            .record_readiness(service, ReadinessState::TimedOut, attempts, elapsed);
    }

    pub fn record_failed(&self, service: &str, attempts: u32, elapsed: Duration) {
        self.counters
            .record_readiness(service, ReadinessState::Failed, attempts, elapsed);
    }

    pub fn record_probe_outcome(&self, service: &str, category: &str, success: bool) {
        self.counters
            .record_probe_outcome(service, category, success);
    }
}

pub fn metrics() -> &'static MetricsCollector {
    MetricsCollector::global()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logged_snapshot_reflects_recorded_outcomes() {
        let collector = metrics();
        collector.register_readiness_target("metrics-unit-db");
        collector.record_timed_out("metrics-unit-db", 5, Duration::from_secs(8));
        collector.record_probe_outcome("metrics-unit-db", "port", false);

        let snapshot = collector.log_snapshot();

        let status = snapshot
            .readiness
            .iter()
            .find(|status| status.service == "metrics-unit-db")
            .expect("readiness entry");
        assert_eq!(status.state, ReadinessState::TimedOut);
        assert_eq!(status.attempts, 5);
        assert_eq!(status.duration_ms, Some(8_000));
        let outcome = snapshot
            .probe_outcomes
            .iter()
            .find(|outcome| outcome.service == "metrics-unit-db")
            .expect("probe entry");
        assert_eq!((outcome.success, outcome.failure), (0, 1));
    }
}
