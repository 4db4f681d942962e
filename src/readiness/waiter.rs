use crate::metrics::metrics;
use crate::probes::{Observation, Observed, ProbeExecutionError};
use crate::readiness::graph::DependencyGraph;
use crate::readiness::report::{ProbeResult, ReadinessReport, ServiceReport, ServiceStatus};
use crate::readiness::spec::{ProbeHandle, ServiceSpec};
use crate::retry::sleep_with_shutdown;
use crate::service_event;
use crate::telemetry::duration_to_millis;
use chrono::Utc;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

/// A service never became ready within its retry budget.
#[derive(Debug, Clone)]
pub struct ProbeTimeoutError {
    pub service: String,
    pub attempts: u32,
    pub elapsed: Duration,
    pub last_reason: Option<String>,
    pub report: ReadinessReport,
}

impl fmt::Display for ProbeTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service `{}` not ready after {} attempt(s) in {}",
            self.service,
            self.attempts,
            humantime::format_duration(Duration::from_millis(duration_to_millis(self.elapsed))),
        )?;
        if let Some(reason) = &self.last_reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProbeTimeoutError {}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error(transparent)]
    Timeout(#[from] ProbeTimeoutError),
    #[error("probe for service `{service}` could not run: {source}")]
    Execution {
        service: String,
        #[source]
        source: ProbeExecutionError,
        report: ReadinessReport,
    },
    #[error("wait cancelled while waiting for service `{service}`")]
    Cancelled {
        service: String,
        report: ReadinessReport,
    },
}

impl WaitError {
    pub fn service(&self) -> &str {
        match self {
            WaitError::Timeout(err) => &err.service,
            WaitError::Execution { service, .. } | WaitError::Cancelled { service, .. } => service,
        }
    }

    /// Report covering every service up to and including the one that failed.
    pub fn report(&self) -> &ReadinessReport {
        match self {
            WaitError::Timeout(err) => &err.report,
            WaitError::Execution { report, .. } | WaitError::Cancelled { report, .. } => report,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WaitOptions {
    /// Keep waiting on later services after one fails instead of aborting.
    pub continue_on_failure: bool,
}

/// Sequential, fail-fast readiness gate over a [`DependencyGraph`].
#[derive(Clone, Debug, Default)]
pub struct ReadinessWaiter {
    options: WaitOptions,
    shutdown: CancellationToken,
}

enum Termination {
    Ready,
    Exhausted,
    Execution(ProbeExecutionError),
    Cancelled,
}

enum AttemptOutcome {
    Healthy,
    Unhealthy(String),
    Execution(ProbeExecutionError),
}

impl ReadinessWaiter {
    pub fn new(options: WaitOptions) -> Self {
        Self {
            options,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn wait(&self, graph: &DependencyGraph) -> Result<ReadinessReport, WaitError> {
        let started = Instant::now();
        let mut report = ReadinessReport::default();
        let counters = metrics();

        for (index, spec) in graph.ordered().enumerate() {
            counters.register_readiness_target(spec.name());
            let (service, termination) = self.wait_for_service(spec).await;
            let attempts = service.attempts;
            let elapsed = service.elapsed;
            let last_reason = service.last_reason.clone();
            report.services.push(service);
            report.elapsed = started.elapsed();

            match termination {
                Termination::Ready => {
                    counters.record_ready(spec.name(), attempts, elapsed);
                }
                Termination::Cancelled => {
                    skip_remaining(graph, index, &mut report);
                    return Err(WaitError::Cancelled {
                        service: spec.name().to_string(),
                        report,
                    });
                }
                Termination::Exhausted => {
                    counters.record_timed_out(spec.name(), attempts, elapsed);
                    if self.options.continue_on_failure {
                        continue;
                    }
                    skip_remaining(graph, index, &mut report);
                    return Err(WaitError::Timeout(ProbeTimeoutError {
                        service: spec.name().to_string(),
                        attempts,
                        elapsed,
                        last_reason,
                        report,
                    }));
                }
                Termination::Execution(source) => {
                    counters.record_failed(spec.name(), attempts, elapsed);
                    if self.options.continue_on_failure {
                        continue;
                    }
                    skip_remaining(graph, index, &mut report);
                    return Err(WaitError::Execution {
                        service: spec.name().to_string(),
                        source,
                        report,
                    });
                }
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    async fn wait_for_service(&self, spec: &ServiceSpec) -> (ServiceReport, Termination) {
        let started = Instant::now();
        let policy = spec.retry();
        let mut attempts = 0;
        let mut results = Vec::new();
        let mut last_reason = None;

        service_event!(
            info,
            "readiness_wait_started",
            service = spec.name(),
            max_attempts = policy.max_attempts(),
            timeout_ms = duration_to_millis(policy.timeout),
        );

        let termination = loop {
            if self.shutdown.is_cancelled() {
                break Termination::Cancelled;
            }

            attempts += 1;
            match self.run_attempt(spec, attempts, &mut results).await {
                AttemptOutcome::Healthy => break Termination::Ready,
                AttemptOutcome::Execution(err) => {
                    last_reason = Some(err.to_string());
                    break Termination::Execution(err);
                }
                AttemptOutcome::Unhealthy(reason) => {
                    service_event!(
                        debug,
                        "readiness_attempt_failed",
                        service = spec.name(),
                        attempt = attempts,
                        reason = reason,
                    );
                    last_reason = Some(reason);
                }
            }

            match policy.next_delay(attempts, started.elapsed()) {
                Some(delay) => {
                    if sleep_with_shutdown(delay, &self.shutdown).await {
                        break Termination::Cancelled;
                    }
                }
                None => break Termination::Exhausted,
            }
        };

        let elapsed = started.elapsed();
        let status = match &termination {
            Termination::Ready => ServiceStatus::Ready,
            Termination::Exhausted => ServiceStatus::TimedOut,
            Termination::Execution(_) => ServiceStatus::Failed,
            Termination::Cancelled => ServiceStatus::Cancelled,
        };

        match status {
            ServiceStatus::Ready => service_event!(
                info,
                "readiness_wait_completed",
                service = spec.name(),
                state_from = "pending",
                state_to = status.as_str(),
                attempts = attempts,
                duration_ms = duration_to_millis(elapsed),
            ),
            _ => service_event!(
                error,
                "readiness_wait_failed",
                service = spec.name(),
                state_from = "pending",
                state_to = status.as_str(),
                attempts = attempts,
                duration_ms = duration_to_millis(elapsed),
                reason = last_reason.as_deref().unwrap_or("unknown"),
            ),
        }

        let report = ServiceReport {
            name: spec.name().to_string(),
            status,
            attempts,
            elapsed,
            results,
            last_reason,
        };
        (report, termination)
    }

    /// Runs the gating probes in order, stopping at the first that is not healthy.
    async fn run_attempt(
        &self,
        spec: &ServiceSpec,
        attempt: u32,
        results: &mut Vec<ProbeResult>,
    ) -> AttemptOutcome {
        for handle in spec.gating_probes() {
            let (outcome, result) = run_probe(spec, handle, attempt).await;
            metrics().record_probe_outcome(spec.name(), handle.category.as_str(), result.success);
            results.push(result);
            match outcome {
                Ok(observation) if observation.healthy => continue,
                Ok(observation) => {
                    return AttemptOutcome::Unhealthy(format!(
                        "{}: {}",
                        handle.describe(),
                        observation.reason()
                    ));
                }
                Err(err) => return AttemptOutcome::Execution(err),
            }
        }
        AttemptOutcome::Healthy
    }
}

fn skip_remaining(graph: &DependencyGraph, failed_at: usize, report: &mut ReadinessReport) {
    for spec in graph.ordered().skip(failed_at + 1) {
        service_event!(warn, "readiness_wait_skipped", service = spec.name());
        report.services.push(ServiceReport::skipped(spec.name()));
    }
}

/// Runs one probe under the service's probe timeout. A probe that overruns
/// counts as unhealthy, not as an execution failure.
pub(crate) async fn run_probe(
    spec: &ServiceSpec,
    handle: &ProbeHandle,
    attempt: u32,
) -> (Result<Observation, ProbeExecutionError>, ProbeResult) {
    let timestamp = Utc::now();
    let started = Instant::now();
    let outcome = match timeout(spec.probe_timeout(), handle.probe.check()).await {
        Ok(outcome) => outcome,
        Err(_) => Ok(Observation::unhealthy(
            Observed::Nothing,
            format!(
                "probe timed out after {}",
                humantime::format_duration(spec.probe_timeout())
            ),
        )),
    };
    let latency = started.elapsed();

    let (success, observed, reason) = match &outcome {
        Ok(observation) => (
            observation.healthy,
            observation.observed.clone(),
            (!observation.healthy).then(|| observation.reason()),
        ),
        Err(err) => (false, Observed::Nothing, Some(err.to_string())),
    };

    let result = ProbeResult {
        service: spec.name().to_string(),
        probe: handle.describe(),
        category: handle.category,
        attempt,
        timestamp,
        success,
        observed,
        latency,
        reason,
    };
    (outcome, result)
}
