use super::defaults::{RetrySettings, StackDefaults};
use super::services::{ProbeDefinition, ProbeTarget, ServiceDefinition, POSTGRES_SCHEMES, REDIS_SCHEMES};
use super::{StackConfig, StackConfigError, StackValidationError};
use crate::config::{OpsConfig, ServiceEndpoints};
use crate::dsn::ConnectionTarget;
use crate::readiness::CheckCategory;
use std::time::Duration;
use url::Url;

/// API routes audited on the SAFE-BMAD API, and whether each must serve JSON.
pub const API_ENDPOINTS: &[(&str, bool)] = &[
    ("/health", true),
    ("/ready", true),
    ("/metrics", true),
    ("/", true),
    ("/docs", false),
    ("/redoc", false),
    ("/openapi.json", true),
];

/// Dependencies `/health` reports on.
pub const API_HEALTH_DEPENDENCIES: &[&str] = &["database", "redis"];

/// The three-service SAFE-BMAD stack: database, then cache, then api.
pub fn safe_bmad_defaults(config: &OpsConfig) -> Result<StackConfig, StackConfigError> {
    let endpoints = &config.services;
    let defaults = StackDefaults {
        container_runtime: endpoints.container_runtime.clone(),
        ..StackDefaults::default()
    };
    let mut errors = Vec::new();

    let services = vec![
        database(endpoints, &defaults, &mut errors),
        cache(endpoints, &defaults, &mut errors),
        api(endpoints, &defaults, &mut errors),
    ];

    if errors.is_empty() {
        Ok(StackConfig { defaults, services })
    } else {
        Err(StackConfigError::Invalid(StackValidationError::new(errors)))
    }
}

fn budget(timeout_secs: u64, interval_secs: u64) -> RetrySettings {
    RetrySettings {
        interval: Some(Duration::from_secs(interval_secs)),
        timeout: Some(Duration::from_secs(timeout_secs)),
        ..RetrySettings::default()
    }
}

fn probe(category: CheckCategory, gate: bool, target: ProbeTarget) -> ProbeDefinition {
    ProbeDefinition {
        category,
        gate,
        target,
    }
}

fn container(defaults: &StackDefaults, name: &str) -> ProbeDefinition {
    probe(
        CheckCategory::Container,
        true,
        ProbeTarget::Container {
            runtime: defaults.container_runtime.clone(),
            container: name.to_string(),
        },
    )
}

fn port(target: &ConnectionTarget) -> ProbeDefinition {
    probe(
        CheckCategory::Port,
        true,
        ProbeTarget::Tcp {
            host: target.host.clone(),
            port: target.port,
        },
    )
}

fn database(
    endpoints: &ServiceEndpoints,
    defaults: &StackDefaults,
    errors: &mut Vec<String>,
) -> ServiceDefinition {
    let mut probes = vec![container(defaults, &endpoints.containers.postgres)];
    match ConnectionTarget::parse_with_schemes(&endpoints.database_url, POSTGRES_SCHEMES) {
        Ok(target) => {
            probes.push(port(&target));
            probes.push(database_health(endpoints, defaults, &target));
        }
        Err(err) => errors.push(format!("services.database_url: {err}")),
    }

    ServiceDefinition {
        name: "database".to_string(),
        retry: budget(60, 2).to_policy(),
        probe_timeout: defaults.probe_timeout,
        probes,
    }
}

#[cfg(feature = "db-postgres")]
fn database_health(
    endpoints: &ServiceEndpoints,
    _defaults: &StackDefaults,
    _target: &ConnectionTarget,
) -> ProbeDefinition {
    probe(
        CheckCategory::Health,
        true,
        ProbeTarget::Postgres {
            url: endpoints.database_url.clone(),
        },
    )
}

#[cfg(not(feature = "db-postgres"))]
fn database_health(
    endpoints: &ServiceEndpoints,
    defaults: &StackDefaults,
    target: &ConnectionTarget,
) -> ProbeDefinition {
    let user = target.username.clone().unwrap_or_else(|| "postgres".to_string());
    probe(
        CheckCategory::Health,
        true,
        ProbeTarget::Exec {
            program: defaults.container_runtime.clone(),
            args: vec![
                "exec".to_string(),
                endpoints.containers.postgres.clone(),
                "pg_isready".to_string(),
                "-U".to_string(),
                user,
            ],
            expect_exit: 0,
            expect_stdout: None,
        },
    )
}

fn cache(
    endpoints: &ServiceEndpoints,
    defaults: &StackDefaults,
    errors: &mut Vec<String>,
) -> ServiceDefinition {
    let mut probes = vec![container(defaults, &endpoints.containers.redis)];
    match ConnectionTarget::parse_with_schemes(&endpoints.redis_url, REDIS_SCHEMES) {
        Ok(target) => {
            probes.push(port(&target));
            probes.extend(cache_health(endpoints, defaults));
        }
        Err(err) => errors.push(format!("services.redis_url: {err}")),
    }

    ServiceDefinition {
        name: "cache".to_string(),
        retry: budget(30, 1).to_policy(),
        probe_timeout: defaults.probe_timeout,
        probes,
    }
}

#[cfg(feature = "db-redis")]
fn cache_health(endpoints: &ServiceEndpoints, _defaults: &StackDefaults) -> Vec<ProbeDefinition> {
    vec![probe(
        CheckCategory::Health,
        true,
        ProbeTarget::Redis {
            url: endpoints.redis_url.clone(),
            round_trip: true,
        },
    )]
}

#[cfg(not(feature = "db-redis"))]
fn cache_health(endpoints: &ServiceEndpoints, defaults: &StackDefaults) -> Vec<ProbeDefinition> {
    vec![probe(
        CheckCategory::Health,
        true,
        ProbeTarget::Exec {
            program: defaults.container_runtime.clone(),
            args: vec![
                "exec".to_string(),
                endpoints.containers.redis.clone(),
                "redis-cli".to_string(),
                "ping".to_string(),
            ],
            expect_exit: 0,
            expect_stdout: Some("PONG".to_string()),
        },
    )]
}

fn api(
    endpoints: &ServiceEndpoints,
    defaults: &StackDefaults,
    errors: &mut Vec<String>,
) -> ServiceDefinition {
    let mut probes = vec![container(defaults, &endpoints.containers.api)];
    match parse_api_base(&endpoints.api_base_url) {
        Ok((base, target)) => {
            probes.push(port(&target));
            for (path, json) in API_ENDPOINTS {
                let url = match base.join(path.trim_start_matches('/')) {
                    Ok(url) => url,
                    Err(err) => {
                        errors.push(format!("services.api_base_url: cannot join `{path}`: {err}"));
                        continue;
                    }
                };
                let is_health = *path == "/health";
                let dependencies = if is_health {
                    API_HEALTH_DEPENDENCIES.iter().map(|dep| dep.to_string()).collect()
                } else {
                    Vec::new()
                };
                probes.push(probe(
                    CheckCategory::Health,
                    is_health,
                    ProbeTarget::Http {
                        url,
                        expect_status: 200,
                        expect_json: *json,
                        dependencies,
                    },
                ));
            }
        }
        Err(reason) => errors.push(format!("services.api_base_url: {reason}")),
    }

    ServiceDefinition {
        name: "api".to_string(),
        retry: budget(60, 3).to_policy(),
        probe_timeout: defaults.probe_timeout,
        probes,
    }
}

/// The base URL gets a trailing slash so route joins keep any path prefix.
fn parse_api_base(input: &str) -> Result<(Url, ConnectionTarget), String> {
    let target = ConnectionTarget::parse_with_schemes(input, &["http", "https"])
        .map_err(|err| err.to_string())?;
    let mut base = Url::parse(input.trim()).map_err(|err| err.to_string())?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok((base, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stack_is_database_cache_api() {
        let stack = safe_bmad_defaults(&OpsConfig::default()).expect("defaults are valid");
        let names: Vec<_> = stack.services.iter().map(|service| service.name.as_str()).collect();
        assert_eq!(names, ["database", "cache", "api"]);

        let attempts: Vec<_> = stack
            .services
            .iter()
            .map(|service| (service.retry.max_attempts, service.retry.interval.as_secs()))
            .collect();
        assert_eq!(attempts, [(30, 2), (30, 1), (20, 3)]);
    }

    #[test]
    fn api_audits_every_route_but_gates_on_health() {
        let stack = safe_bmad_defaults(&OpsConfig::default()).expect("defaults are valid");
        let api = stack.service("api").expect("api");
        let routes: Vec<(String, bool, bool)> = api
            .probes
            .iter()
            .filter_map(|probe| match &probe.target {
                ProbeTarget::Http {
                    url, expect_json, ..
                } => Some((url.path().to_string(), *expect_json, probe.gate)),
                _ => None,
            })
            .collect();

        assert_eq!(routes.len(), API_ENDPOINTS.len());
        assert!(routes.contains(&("/health".to_string(), true, true)));
        assert!(routes.contains(&("/docs".to_string(), false, false)));
        assert!(routes.contains(&("/openapi.json".to_string(), true, false)));
    }

    #[test]
    fn base_url_prefix_is_kept() {
        let (base, target) = parse_api_base("https://example.com/v2").expect("valid");
        assert_eq!(base.join("health").expect("join").path(), "/v2/health");
        assert_eq!(target.port, 443);
    }

    #[test]
    fn bad_urls_are_all_reported() {
        let mut config = OpsConfig::default();
        config.services.database_url = "mysql://localhost/db".to_string();
        config.services.api_base_url = "not a url".to_string();
        match safe_bmad_defaults(&config) {
            Err(StackConfigError::Invalid(err)) => {
                assert_eq!(err.messages().len(), 2, "{err}");
            }
            other => panic!("expected invalid defaults, got {other:?}"),
        }
    }
}
