use crate::probes::Observed;
use crate::readiness::spec::CheckCategory;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Outcome of one probe run during one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    pub service: String,
    pub probe: String,
    pub category: CheckCategory,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub observed: Observed,
    pub latency: Duration,
    pub reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceStatus {
    Ready,
    TimedOut,
    Failed,
    Cancelled,
    /// Never probed because an earlier service stopped the run.
    Skipped,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Ready => "READY",
            ServiceStatus::TimedOut => "TIMED_OUT",
            ServiceStatus::Failed => "FAILED",
            ServiceStatus::Cancelled => "CANCELLED",
            ServiceStatus::Skipped => "SKIPPED",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceReport {
    pub name: String,
    pub status: ServiceStatus,
    pub attempts: u32,
    pub elapsed: Duration,
    pub results: Vec<ProbeResult>,
    pub last_reason: Option<String>,
}

impl ServiceReport {
    pub(crate) fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ServiceStatus::Skipped,
            attempts: 0,
            elapsed: Duration::ZERO,
            results: Vec::new(),
            last_reason: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ServiceStatus::Ready
    }
}

/// Final outcome of one waiter run. Produced once, never updated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadinessReport {
    pub services: Vec<ServiceReport>,
    pub elapsed: Duration,
}

impl ReadinessReport {
    pub fn service(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|service| service.name == name)
    }

    pub fn all_ready(&self) -> bool {
        self.services.iter().all(ServiceReport::is_ready)
    }

    pub fn first_failure(&self) -> Option<&ServiceReport> {
        self.services
            .iter()
            .find(|service| !service.is_ready() && service.status != ServiceStatus::Skipped)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|service| service.status == ServiceStatus::Skipped)
            .map(|service| service.name.as_str())
    }

    pub fn total_attempts(&self) -> u32 {
        self.services.iter().map(|service| service.attempts).sum()
    }
}

impl fmt::Display for ReadinessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for service in &self.services {
            write!(
                f,
                "  {:<10} {:<9} attempts={} elapsed={}",
                service.name,
                service.status.as_str(),
                service.attempts,
                humantime::format_duration(truncate_millis(service.elapsed)),
            )?;
            if let Some(reason) = service.last_reason.as_ref().filter(|_| !service.is_ready()) {
                write!(f, " reason={reason}")?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "  total elapsed {}",
            humantime::format_duration(truncate_millis(self.elapsed))
        )
    }
}

fn truncate_millis(duration: Duration) -> Duration {
    Duration::from_millis(crate::telemetry::duration_to_millis(duration))
}
