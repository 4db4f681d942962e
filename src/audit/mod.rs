//! Exhaustive, non-gating connectivity audit.
//!
//! Unlike the readiness waiter, the auditor never stops early. Every declared
//! probe runs exactly once, failures are collected, and the caller decides what
//! the aggregate means.

pub mod round_trip;
pub mod summary;

pub use round_trip::{
    cache_round_trip, cache_round_trip_with, RoundTripError, ROUND_TRIP_KEY_PREFIX,
};
pub use summary::{AuditCheck, AuditFailure, AuditSummary};

use crate::metrics::metrics;
use crate::probes::Observed;
use crate::readiness::waiter::run_probe;
use crate::readiness::{CheckCategory, DependencyGraph, ServiceSpec};
use crate::service_event;
use crate::telemetry::duration_to_millis;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug)]
pub struct AuditOptions {
    /// Also write, read and delete a scratch key on services with a cache store.
    pub cache_round_trip: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            cache_round_trip: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConnectivityAuditor {
    options: AuditOptions,
}

impl ConnectivityAuditor {
    pub fn new(options: AuditOptions) -> Self {
        Self { options }
    }

    pub async fn audit(&self, graph: &DependencyGraph) -> AuditSummary {
        let started = Instant::now();
        let mut summary = AuditSummary::default();

        for spec in graph.ordered() {
            self.audit_service(spec, &mut summary.checks).await;
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            event = "audit_completed",
            total = summary.total(),
            passed = summary.passed_count(),
            failed = summary.failed_count(),
            duration_ms = duration_to_millis(summary.elapsed),
        );
        summary
    }

    async fn audit_service(&self, spec: &ServiceSpec, checks: &mut Vec<AuditCheck>) {
        for handle in spec.probes() {
            let (_, result) = run_probe(spec, handle, 1).await;
            let check = AuditCheck {
                service: spec.name().to_string(),
                category: handle.category,
                target: result.probe,
                passed: result.success,
                observed: result.observed,
                detail: result.reason,
                latency: result.latency,
            };
            record(&check);
            checks.push(check);
        }

        if !self.options.cache_round_trip {
            return;
        }
        let Some(store) = spec.cache() else {
            return;
        };

        let started = Instant::now();
        let outcome = round_trip::cache_round_trip(store.as_ref(), spec.probe_timeout()).await;
        let check = AuditCheck {
            service: spec.name().to_string(),
            category: CheckCategory::CacheRoundTrip,
            target: format!("round trip {}", store.describe()),
            passed: outcome.is_ok(),
            observed: Observed::Nothing,
            detail: outcome.err().map(|err| err.to_string()),
            latency: started.elapsed(),
        };
        record(&check);
        checks.push(check);
    }
}

fn record(check: &AuditCheck) {
    metrics().record_probe_outcome(&check.service, check.category.as_str(), check.passed);
    if check.passed {
        service_event!(
            debug,
            "audit_check_passed",
            service = check.service.as_str(),
            probe = check.target.as_str(),
            category = check.category,
        );
    } else {
        service_event!(
            warn,
            "audit_check_failed",
            service = check.service.as_str(),
            probe = check.target.as_str(),
            category = check.category,
            reason = check.detail.as_deref().unwrap_or("unknown"),
        );
    }
}
