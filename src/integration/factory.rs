use crate::config::stack::{ProbeDefinition, ProbeTarget, ServiceDefinition, StackConfig};
use crate::error::ConfigurationError;
#[cfg(feature = "db-postgres")]
use crate::probes::PostgresProbe;
#[cfg(feature = "db-redis")]
use crate::probes::{RedisProbe, RedisStore};
use crate::probes::{CacheStore, ExecProbe, HttpProbe, Probe, ProbeExecutionError, TcpProbe};
use crate::readiness::{DependencyGraph, ServiceSpec};
use std::sync::Arc;
use thiserror::Error;

/// Turns a validated [`StackConfig`] into live probes.
///
/// Database-backed probes need the matching cargo feature; without it the
/// factory reports which feature is missing instead of silently skipping the
/// probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeFactory;

impl ProbeFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn build_graph(&self, stack: &StackConfig) -> Result<DependencyGraph, ProbeFactoryError> {
        let mut graph = DependencyGraph::new();
        for service in &stack.services {
            graph.register(self.build_service(service)?)?;
        }
        Ok(graph)
    }

    pub fn build_service(
        &self,
        service: &ServiceDefinition,
    ) -> Result<ServiceSpec, ProbeFactoryError> {
        let mut spec = ServiceSpec::new(&service.name, service.retry)
            .with_probe_timeout(service.probe_timeout);

        for definition in &service.probes {
            let probe = self.build_probe(&service.name, definition)?;
            spec = if definition.gate {
                spec.with_probe(definition.category, probe)
            } else {
                spec.with_audit_probe(definition.category, probe)
            };
        }

        if let Some(url) = service.round_trip_url() {
            let store = self
                .cache_store(url)
                .map_err(|source| ProbeFactoryError::probe(&service.name, "redis", source))?;
            spec = spec.with_cache(store);
        }

        Ok(spec)
    }

    fn build_probe(
        &self,
        service: &str,
        definition: &ProbeDefinition,
    ) -> Result<Arc<dyn Probe>, ProbeFactoryError> {
        let built: Result<Arc<dyn Probe>, ProbeExecutionError> = match &definition.target {
            ProbeTarget::Tcp { host, port } => Ok(Arc::new(TcpProbe::new(host, *port))),
            ProbeTarget::Exec {
                program,
                args,
                expect_exit,
                expect_stdout,
            } => {
                let mut probe = ExecProbe::new(program, args).expect_exit(*expect_exit);
                if let Some(needle) = expect_stdout {
                    probe = probe.expect_stdout(needle);
                }
                Ok(Arc::new(probe))
            }
            ProbeTarget::Container { runtime, container } => {
                Ok(Arc::new(ExecProbe::container(runtime, container)))
            }
            ProbeTarget::Http {
                url,
                expect_status,
                expect_json,
                dependencies,
            } => HttpProbe::new(url.clone()).map(|probe| -> Arc<dyn Probe> {
                Arc::new(
                    probe
                        .expect_status(*expect_status)
                        .expect_json(*expect_json)
                        .require_dependencies(dependencies),
                )
            }),
            ProbeTarget::Postgres { url } => self.postgres_probe(url),
            ProbeTarget::Redis { url, .. } => self.redis_probe(url),
        };

        built.map_err(|source| {
            ProbeFactoryError::probe(service, definition.target.type_name(), source)
        })
    }

    #[cfg(feature = "db-postgres")]
    fn postgres_probe(&self, url: &str) -> Result<Arc<dyn Probe>, ProbeExecutionError> {
        Ok(Arc::new(PostgresProbe::new(url)))
    }

    #[cfg(not(feature = "db-postgres"))]
    fn postgres_probe(&self, _url: &str) -> Result<Arc<dyn Probe>, ProbeExecutionError> {
        Err(ProbeExecutionError::Unsupported {
            probe: "postgres",
            feature: "db-postgres",
        })
    }

    #[cfg(feature = "db-redis")]
    fn redis_probe(&self, url: &str) -> Result<Arc<dyn Probe>, ProbeExecutionError> {
        Ok(Arc::new(RedisProbe::new(url)?))
    }

    #[cfg(not(feature = "db-redis"))]
    fn redis_probe(&self, _url: &str) -> Result<Arc<dyn Probe>, ProbeExecutionError> {
        Err(ProbeExecutionError::Unsupported {
            probe: "redis",
            feature: "db-redis",
        })
    }

    #[cfg(feature = "db-redis")]
    fn cache_store(&self, url: &str) -> Result<Arc<dyn CacheStore>, ProbeExecutionError> {
        Ok(Arc::new(RedisStore::new(url)?))
    }

    #[cfg(not(feature = "db-redis"))]
    fn cache_store(&self, _url: &str) -> Result<Arc<dyn CacheStore>, ProbeExecutionError> {
        Err(ProbeExecutionError::Unsupported {
            probe: "redis round trip",
            feature: "db-redis",
        })
    }
}

#[derive(Debug, Error)]
pub enum ProbeFactoryError {
    #[error("service `{service}`: failed to build {probe} probe")]
    Probe {
        service: String,
        probe: &'static str,
        #[source]
        source: ProbeExecutionError,
    },
    #[error(transparent)]
    Graph(#[from] ConfigurationError),
}

impl ProbeFactoryError {
    fn probe(service: &str, probe: &'static str, source: ProbeExecutionError) -> Self {
        Self::Probe {
            service: service.to_string(),
            probe,
            source,
        }
    }
}
