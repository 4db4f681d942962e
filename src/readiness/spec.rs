use crate::probes::{CacheStore, Probe};
use crate::retry::RetryPolicy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckCategory {
    Container,
    Port,
    Health,
    CacheRoundTrip,
}

impl CheckCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckCategory::Container => "container",
            CheckCategory::Port => "port",
            CheckCategory::Health => "health",
            CheckCategory::CacheRoundTrip => "cache_round_trip",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "container" => Some(CheckCategory::Container),
            "port" => Some(CheckCategory::Port),
            "health" => Some(CheckCategory::Health),
            _ => None,
        }
    }
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One probe attached to a service.
///
/// Gating probes are what the waiter polls. Non-gating probes only run during
/// an audit.
#[derive(Clone)]
pub struct ProbeHandle {
    pub category: CheckCategory,
    pub probe: Arc<dyn Probe>,
    pub gating: bool,
}

impl ProbeHandle {
    pub fn describe(&self) -> String {
        self.probe.describe()
    }
}

impl fmt::Debug for ProbeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeHandle")
            .field("category", &self.category)
            .field("probe", &self.probe.describe())
            .field("gating", &self.gating)
            .finish()
    }
}

/// Static declaration of one dependency and how to probe it.
#[derive(Clone)]
pub struct ServiceSpec {
    name: String,
    probes: Vec<ProbeHandle>,
    retry: RetryPolicy,
    probe_timeout: Duration,
    cache: Option<Arc<dyn CacheStore>>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            probes: Vec::new(),
            retry,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            cache: None,
        }
    }

    /// Adds a probe the waiter gates on.
    pub fn with_probe(mut self, category: CheckCategory, probe: Arc<dyn Probe>) -> Self {
        self.probes.push(ProbeHandle {
            category,
            probe,
            gating: true,
        });
        self
    }

    /// Adds a probe that only the auditor runs.
    pub fn with_audit_probe(mut self, category: CheckCategory, probe: Arc<dyn Probe>) -> Self {
        self.probes.push(ProbeHandle {
            category,
            probe,
            gating: false,
        });
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn probes(&self) -> &[ProbeHandle] {
        &self.probes
    }

    pub fn gating_probes(&self) -> impl Iterator<Item = &ProbeHandle> {
        self.probes.iter().filter(|handle| handle.gating)
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheStore>> {
        self.cache.as_ref()
    }
}

impl fmt::Debug for ServiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSpec")
            .field("name", &self.name)
            .field("probes", &self.probes)
            .field("retry", &self.retry)
            .field("probe_timeout", &self.probe_timeout)
            .field(
                "cache",
                &self.cache.as_ref().map(|store| store.describe()),
            )
            .finish()
    }
}
