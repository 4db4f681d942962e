use super::defaults::{self, RawRetry, RetrySettings, StackDefaults};
use super::value_to_string;
use crate::dsn::ConnectionTarget;
use crate::readiness::CheckCategory;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use url::Url;

pub const POSTGRES_SCHEMES: &[&str] = &["postgres", "postgresql"];
pub const REDIS_SCHEMES: &[&str] = &["redis", "rediss"];

const PROBE_TYPES: &str = "tcp, exec, container, http, postgres, redis";

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefinition {
    pub name: String,
    pub retry: RetryPolicy,
    pub probe_timeout: Duration,
    pub probes: Vec<ProbeDefinition>,
}

impl ServiceDefinition {
    /// The probe whose Redis connection backs the audit round trip, if any.
    pub fn round_trip_url(&self) -> Option<&str> {
        self.probes.iter().find_map(|probe| match &probe.target {
            ProbeTarget::Redis {
                url,
                round_trip: true,
            } => Some(url.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeDefinition {
    pub category: CheckCategory,
    /// Gating probes are polled by `wait`; the rest only run during `audit`.
    pub gate: bool,
    pub target: ProbeTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeTarget {
    Tcp {
        host: String,
        port: u16,
    },
    Exec {
        program: String,
        args: Vec<String>,
        expect_exit: i32,
        expect_stdout: Option<String>,
    },
    Container {
        runtime: String,
        container: String,
    },
    Http {
        url: Url,
        expect_status: u16,
        expect_json: bool,
        dependencies: Vec<String>,
    },
    Postgres {
        url: String,
    },
    Redis {
        url: String,
        round_trip: bool,
    },
}

impl ProbeTarget {
    pub fn type_name(&self) -> &'static str {
        match self {
            ProbeTarget::Tcp { .. } => "tcp",
            ProbeTarget::Exec { .. } => "exec",
            ProbeTarget::Container { .. } => "container",
            ProbeTarget::Http { .. } => "http",
            ProbeTarget::Postgres { .. } => "postgres",
            ProbeTarget::Redis { .. } => "redis",
        }
    }

    pub fn default_category(&self) -> CheckCategory {
        match self {
            ProbeTarget::Container { .. } => CheckCategory::Container,
            ProbeTarget::Tcp { .. } => CheckCategory::Port,
            _ => CheckCategory::Health,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawService {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    retry: Option<RawRetry>,
    #[serde(default)]
    probe_timeout: Option<String>,
    #[serde(default)]
    probes: Vec<RawProbe>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawProbe {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    gate: Option<bool>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    container: Option<String>,
    #[serde(default)]
    runtime: Option<String>,
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    expect_exit: Option<i32>,
    #[serde(default)]
    expect_stdout: Option<String>,
    #[serde(default)]
    expect_status: Option<u16>,
    #[serde(default)]
    expect_json: Option<bool>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    round_trip: Option<bool>,
    #[serde(default)]
    #[serde(flatten)]
    extra_fields: BTreeMap<String, YamlValue>,
}

pub(crate) fn parse_services(
    raw_services: Vec<RawService>,
    defaults: &StackDefaults,
    errors: &mut Vec<String>,
) -> Vec<ServiceDefinition> {
    let mut seen = HashSet::new();
    let mut services = Vec::with_capacity(raw_services.len());

    for (index, raw) in raw_services.into_iter().enumerate() {
        let label = format!("services[{index}]");
        let name = match raw.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                errors.push(format!("{label}.name must be a non-empty string"));
                continue;
            }
        };
        let label = format!("service `{name}`");
        if !seen.insert(name.clone()) {
            errors.push(format!("{label} is declared more than once"));
        }

        let overrides = defaults::parse_retry(raw.retry, errors, &format!("{label} retry"));
        let retry = merged_policy(&defaults.retry, &overrides);
        let probe_timeout = defaults::parse_positive_duration(
            &format!("{label} probe_timeout"),
            raw.probe_timeout,
            errors,
        )
        .unwrap_or(defaults.probe_timeout);

        let probes: Vec<ProbeDefinition> = raw
            .probes
            .into_iter()
            .enumerate()
            .filter_map(|(probe_index, probe)| {
                parse_probe(probe, defaults, &format!("{label} probes[{probe_index}]"), errors)
            })
            .collect();

        if !probes.iter().any(|probe| probe.gate) {
            errors.push(format!("{label} needs at least one gating probe"));
        }
        let round_trips = probes
            .iter()
            .filter(|probe| matches!(probe.target, ProbeTarget::Redis { round_trip: true, .. }))
            .count();
        if round_trips > 1 {
            errors.push(format!("{label} enables round_trip on more than one redis probe"));
        }

        services.push(ServiceDefinition {
            name,
            retry,
            probe_timeout,
            probes,
        });
    }

    services
}

fn merged_policy(defaults: &RetrySettings, overrides: &RetrySettings) -> RetryPolicy {
    defaults.merged(overrides).to_policy()
}

fn parse_probe(
    raw: RawProbe,
    defaults: &StackDefaults,
    label: &str,
    errors: &mut Vec<String>,
) -> Option<ProbeDefinition> {
    for (key, value) in &raw.extra_fields {
        errors.push(format!(
            "{label} has unknown key \"{key}\" (value `{}`)",
            value_to_string(value)
        ));
    }

    let category = match raw.category.as_deref() {
        None => None,
        Some(value) => match CheckCategory::parse(value) {
            Some(category) => Some(category),
            None => {
                errors.push(format!(
                    "{label}.category must be one of `container`, `port`, or `health` (got `{value}`)"
                ));
                None
            }
        },
    };

    let kind = match raw.kind.as_deref().map(str::trim) {
        Some(kind) if !kind.is_empty() => kind.to_ascii_lowercase(),
        _ => {
            errors.push(format!("{label}.type is required (one of {PROBE_TYPES})"));
            return None;
        }
    };

    let target = match kind.as_str() {
        "tcp" => parse_tcp(&raw, label, errors),
        "exec" => parse_exec(&raw, label, errors),
        "container" => parse_container(&raw, defaults, label, errors),
        "http" => parse_http(&raw, label, errors),
        "postgres" => required(&raw.url, label, "url", errors).and_then(|url| {
            check_dsn(url, POSTGRES_SCHEMES, label, errors).map(|_| ProbeTarget::Postgres {
                url: url.to_string(),
            })
        }),
        "redis" => required(&raw.url, label, "url", errors).and_then(|url| {
            check_dsn(url, REDIS_SCHEMES, label, errors).map(|_| ProbeTarget::Redis {
                url: url.to_string(),
                round_trip: raw.round_trip.unwrap_or(false),
            })
        }),
        other => {
            errors.push(format!(
                "{label}.type `{other}` is not supported (expected one of {PROBE_TYPES})"
            ));
            None
        }
    }?;

    if raw.round_trip.is_some() && !matches!(target, ProbeTarget::Redis { .. }) {
        errors.push(format!("{label}.round_trip is only valid on redis probes"));
    }

    Some(ProbeDefinition {
        category: category.unwrap_or_else(|| target.default_category()),
        gate: raw.gate.unwrap_or(true),
        target,
    })
}

fn parse_tcp(raw: &RawProbe, label: &str, errors: &mut Vec<String>) -> Option<ProbeTarget> {
    let input = match (&raw.address, &raw.url) {
        (Some(address), None) => address,
        (None, Some(url)) => url,
        (Some(_), Some(_)) => {
            errors.push(format!("{label} sets both address and url; pick one"));
            return None;
        }
        (None, None) => {
            errors.push(format!("{label}.address is required for tcp probes"));
            return None;
        }
    };
    match ConnectionTarget::parse_address(input) {
        Ok(target) => Some(ProbeTarget::Tcp {
            host: target.host,
            port: target.port,
        }),
        Err(err) => {
            errors.push(format!("{label}: {err}"));
            None
        }
    }
}

fn parse_exec(raw: &RawProbe, label: &str, errors: &mut Vec<String>) -> Option<ProbeTarget> {
    let Some((program, args)) = raw.command.split_first() else {
        errors.push(format!("{label}.command must list the program and its arguments"));
        return None;
    };
    if program.trim().is_empty() {
        errors.push(format!("{label}.command program must be a non-empty string"));
        return None;
    }
    Some(ProbeTarget::Exec {
        program: program.clone(),
        args: args.to_vec(),
        expect_exit: raw.expect_exit.unwrap_or(0),
        expect_stdout: raw.expect_stdout.clone(),
    })
}

fn parse_container(
    raw: &RawProbe,
    defaults: &StackDefaults,
    label: &str,
    errors: &mut Vec<String>,
) -> Option<ProbeTarget> {
    let container = required(&raw.container, label, "container", errors)?;
    let runtime = raw
        .runtime
        .as_deref()
        .map(str::trim)
        .filter(|runtime| !runtime.is_empty())
        .unwrap_or(&defaults.container_runtime);
    Some(ProbeTarget::Container {
        runtime: runtime.to_string(),
        container: container.to_string(),
    })
}

fn parse_http(raw: &RawProbe, label: &str, errors: &mut Vec<String>) -> Option<ProbeTarget> {
    let input = required(&raw.url, label, "url", errors)?;
    let url = match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        Ok(url) => {
            errors.push(format!(
                "{label}.url must use http or https (got `{}`)",
                url.scheme()
            ));
            return None;
        }
        Err(err) => {
            errors.push(format!("{label}.url `{input}` is not a valid URL: {err}"));
            return None;
        }
    };

    let expect_status = raw.expect_status.unwrap_or(200);
    if !(100..=599).contains(&expect_status) {
        errors.push(format!(
            "{label}.expect_status must be between 100 and 599 (got {expect_status})"
        ));
    }

    let expect_json = raw.expect_json.unwrap_or(!raw.dependencies.is_empty());
    if !expect_json && !raw.dependencies.is_empty() {
        errors.push(format!("{label}.dependencies require expect_json"));
    }

    Some(ProbeTarget::Http {
        url,
        expect_status,
        expect_json,
        dependencies: raw.dependencies.clone(),
    })
}

fn required<'a>(
    value: &'a Option<String>,
    label: &str,
    field: &str,
    errors: &mut Vec<String>,
) -> Option<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Some(value),
        _ => {
            errors.push(format!("{label}.{field} is required"));
            None
        }
    }
}

fn check_dsn(
    url: &str,
    schemes: &[&str],
    label: &str,
    errors: &mut Vec<String>,
) -> Option<ConnectionTarget> {
    match ConnectionTarget::parse_with_schemes(url, schemes) {
        Ok(target) => Some(target),
        Err(err) => {
            errors.push(format!("{label}.url: {err}"));
            None
        }
    }
}
