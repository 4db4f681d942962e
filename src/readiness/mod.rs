pub mod graph;
pub mod report;
pub mod spec;
pub mod waiter;

pub use graph::DependencyGraph;
pub use report::{ProbeResult, ReadinessReport, ServiceReport, ServiceStatus};
pub use spec::{CheckCategory, ProbeHandle, ServiceSpec, DEFAULT_PROBE_TIMEOUT};
pub use waiter::{ProbeTimeoutError, ReadinessWaiter, WaitError, WaitOptions};
