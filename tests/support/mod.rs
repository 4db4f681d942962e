#![allow(dead_code)]

pub mod cache;
pub mod probes;

use safe_ops::readiness::{CheckCategory, DependencyGraph, ServiceSpec};
use safe_ops::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

pub use cache::{CacheFault, MemoryCache};
pub use probes::{CallLog, ScriptedProbe, Step};

pub fn policy(max_attempts: u32, interval_secs: u64, timeout_secs: u64) -> RetryPolicy {
    RetryPolicy::fixed(
        max_attempts,
        Duration::from_secs(interval_secs),
        Duration::from_secs(timeout_secs),
    )
}

/// A service with a single health probe.
pub fn service(name: &str, probe: Arc<ScriptedProbe>, retry: RetryPolicy) -> ServiceSpec {
    ServiceSpec::new(name, retry).with_probe(CheckCategory::Health, probe)
}

pub fn graph(specs: Vec<ServiceSpec>) -> DependencyGraph {
    DependencyGraph::from_specs(specs).expect("valid graph")
}
