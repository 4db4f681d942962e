use crate::probes::Observed;
use crate::readiness::CheckCategory;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditCheck {
    pub service: String,
    pub category: CheckCategory,
    pub target: String,
    pub passed: bool,
    pub observed: Observed,
    pub detail: Option<String>,
    pub latency: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditFailure {
    pub service: String,
    pub category: CheckCategory,
    pub target: String,
    pub reason: String,
}

/// Tally of one audit pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub checks: Vec<AuditCheck>,
    pub elapsed: Duration,
}

impl AuditSummary {
    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|check| check.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.total() - self.passed_count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Process exit code for automation: 0 when every check passed.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn failures(&self) -> Vec<AuditFailure> {
        self.checks
            .iter()
            .filter(|check| !check.passed)
            .map(|check| AuditFailure {
                service: check.service.clone(),
                category: check.category,
                target: check.target.clone(),
                reason: check
                    .detail
                    .clone()
                    .unwrap_or_else(|| check.observed.to_string()),
            })
            .collect()
    }

    /// Names of services with at least one failed check, in audit order.
    pub fn failing_services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for check in self.checks.iter().filter(|check| !check.passed) {
            if !names.contains(&check.service.as_str()) {
                names.push(&check.service);
            }
        }
        names
    }
}

impl fmt::Display for AuditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let mark = if check.passed { "PASS" } else { "FAIL" };
            write!(
                f,
                "  [{mark}] {:<10} {:<16} {}",
                check.service,
                check.category.as_str(),
                check.target
            )?;
            if let Some(detail) = check.detail.as_ref().filter(|_| !check.passed) {
                write!(f, " ({detail})")?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "  total={} passed={} failed={}",
            self.total(),
            self.passed_count(),
            self.failed_count()
        )
    }
}
