#[path = "support/mod.rs"]
mod support;

use safe_ops::error::ConfigurationError;
use safe_ops::readiness::{CheckCategory, DependencyGraph, ServiceSpec};
use support::{policy, service, CallLog, ScriptedProbe};

#[test]
fn registration_order_is_iteration_order() {
    let log = CallLog::new();
    let mut graph = DependencyGraph::new();
    for name in ["database", "cache", "api"] {
        graph
            .register(service(name, ScriptedProbe::healthy(name, &log), policy(1, 1, 1)))
            .expect("register");
    }

    let first: Vec<_> = graph.ordered().map(ServiceSpec::name).collect();
    let second: Vec<_> = (&graph).into_iter().map(ServiceSpec::name).collect();
    assert_eq!(first, ["database", "cache", "api"]);
    assert_eq!(first, second);
    assert_eq!(graph.len(), 3);
}

#[test]
fn duplicate_names_are_rejected() {
    let log = CallLog::new();
    let err = DependencyGraph::from_specs([
        service("db", ScriptedProbe::healthy("a", &log), policy(1, 1, 1)),
        service("db", ScriptedProbe::healthy("b", &log), policy(1, 1, 1)),
    ])
    .expect_err("duplicate");

    assert_eq!(
        err,
        ConfigurationError::DuplicateService {
            name: "db".to_string()
        }
    );
}

#[test]
fn service_needs_a_gating_probe() {
    let log = CallLog::new();
    let audit_only = ServiceSpec::new("docs", policy(1, 1, 1))
        .with_audit_probe(CheckCategory::Health, ScriptedProbe::healthy("docs", &log));

    let err = DependencyGraph::new()
        .register(audit_only)
        .expect_err("no gating probe");
    assert!(matches!(err, ConfigurationError::InvalidService { ref service, .. } if service == "docs"));

    let err = DependencyGraph::new()
        .register(ServiceSpec::new("  ", policy(1, 1, 1)))
        .expect_err("blank name");
    assert!(err.to_string().contains("must not be empty"));
}

#[test]
fn lookup_by_name() {
    let log = CallLog::new();
    let graph = support::graph(vec![service(
        "cache",
        ScriptedProbe::healthy("cache", &log),
        policy(30, 1, 30),
    )]);

    let cache = graph.get("cache").expect("cache");
    assert_eq!(cache.retry().max_attempts, 30);
    assert!(graph.get("api").is_none());
    assert!(!graph.is_empty());
}
