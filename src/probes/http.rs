use crate::probes::{Observation, Observed, Probe, ProbeExecutionError, ProbeKind};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;
use url::Url;

pub const HEALTHY_DEPENDENCY_STATUSES: &[&str] = &["healthy", "ok", "up", "ready"];

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET url` expecting a status code, optionally a JSON body, and optionally
/// healthy entries for named dependencies in that body.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    client: Client,
    url: Url,
    expect_status: u16,
    expect_json: bool,
    dependencies: Vec<String>,
}

impl HttpProbe {
    pub fn new(url: Url) -> Result<Self, ProbeExecutionError> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ProbeExecutionError::Client(err.to_string()))?;

        Ok(Self {
            client,
            url,
            expect_status: 200,
            expect_json: false,
            dependencies: Vec::new(),
        })
    }

    pub fn expect_status(mut self, status: u16) -> Self {
        self.expect_status = status;
        self
    }

    pub fn expect_json(mut self, expect: bool) -> Self {
        self.expect_json = expect;
        self
    }

    /// Requires `body[name].status` (or `body.checks[name].status`) to be healthy.
    pub fn require_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = names.into_iter().map(Into::into).collect();
        if !self.dependencies.is_empty() {
            self.expect_json = true;
        }
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> Result<Observation, ProbeExecutionError> {
        let response = match self.client.get(self.url.clone()).send().await {
            Ok(response) => response,
            Err(err) if err.is_builder() => {
                return Err(ProbeExecutionError::Client(err.to_string()));
            }
            Err(err) => {
                return Ok(Observation::unhealthy(Observed::Nothing, err.to_string()));
            }
        };

        let status = response.status().as_u16();
        let observed = Observed::StatusCode(status);
        if status != self.expect_status {
            return Ok(Observation::unhealthy(
                observed,
                format!("expected HTTP {}", self.expect_status),
            ));
        }

        if !self.expect_json {
            return Ok(Observation::healthy(observed));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return Ok(Observation::unhealthy(
                    observed,
                    format!("failed to read body: {err}"),
                ));
            }
        };

        let json: JsonValue = match serde_json::from_str(&body) {
            Ok(json) => json,
            Err(err) => {
                return Ok(Observation::unhealthy(
                    observed,
                    format!("body is not JSON: {err}"),
                ));
            }
        };

        let unhealthy: Vec<String> = self
            .dependencies
            .iter()
            .filter_map(|name| match dependency_status(&json, name) {
                Some(status) if is_healthy_status(status) => None,
                Some(status) => Some(format!("{name}={status}")),
                None => Some(format!("{name}=missing")),
            })
            .collect();

        if unhealthy.is_empty() {
            Ok(Observation::healthy(observed))
        } else {
            Ok(Observation::unhealthy(
                observed,
                format!("dependencies not healthy: {}", unhealthy.join(", ")),
            ))
        }
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Http
    }

    fn describe(&self) -> String {
        format!("http GET {}", self.url)
    }
}

fn dependency_status<'a>(body: &'a JsonValue, name: &str) -> Option<&'a str> {
    let entry = body
        .get(name)
        .or_else(|| body.get("checks").and_then(|checks| checks.get(name)))?;

    entry
        .get("status")
        .and_then(JsonValue::as_str)
        .or_else(|| entry.as_str())
}

fn is_healthy_status(status: &str) -> bool {
    HEALTHY_DEPENDENCY_STATUSES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(status))
}
