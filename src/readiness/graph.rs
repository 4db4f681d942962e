use crate::error::ConfigurationError;
use crate::readiness::spec::ServiceSpec;
use std::collections::HashSet;

/// Services in dependency order.
///
/// The graph is a priority chain: a service may assume every service
/// registered before it is reachable. Registration order is the only
/// ordering signal, so there are no edges and nothing to cycle-check.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    services: Vec<ServiceSpec>,
    names: HashSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ServiceSpec) -> Result<(), ConfigurationError> {
        let name = spec.name().trim();
        if name.is_empty() {
            return Err(ConfigurationError::InvalidService {
                service: spec.name().to_string(),
                reason: "service name must not be empty".to_string(),
            });
        }
        if self.names.contains(name) {
            return Err(ConfigurationError::DuplicateService {
                name: name.to_string(),
            });
        }
        if spec.gating_probes().next().is_none() {
            return Err(ConfigurationError::InvalidService {
                service: name.to_string(),
                reason: "at least one readiness probe is required".to_string(),
            });
        }

        self.names.insert(name.to_string());
        self.services.push(spec);
        Ok(())
    }

    /// Builds a graph from specs, failing on the first invalid one.
    pub fn from_specs(
        specs: impl IntoIterator<Item = ServiceSpec>,
    ) -> Result<Self, ConfigurationError> {
        let mut graph = Self::new();
        for spec in specs {
            graph.register(spec)?;
        }
        Ok(graph)
    }

    /// Lazy iteration in registration order. Each call starts from the first
    /// service again.
    pub fn ordered(&self) -> std::slice::Iter<'_, ServiceSpec> {
        self.services.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|spec| spec.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(ServiceSpec::name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl<'a> IntoIterator for &'a DependencyGraph {
    type Item = &'a ServiceSpec;
    type IntoIter = std::slice::Iter<'a, ServiceSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.ordered()
    }
}
