//! Read-only checks against the services of the stack.
//!
//! A probe answers one question: is the target healthy right now. It must not
//! mutate the target, so the waiter can call it as often as its budget allows.
//! A probe that cannot run at all (missing tool, unusable client) returns a
//! [`ProbeExecutionError`] instead of an unhealthy [`Observation`].

mod cache;
mod exec;
mod http;
#[cfg(feature = "db-postgres")]
mod postgres;
#[cfg(feature = "db-redis")]
mod redis;
mod tcp;

pub use self::cache::{CacheError, CacheStore};
pub use self::exec::{ExecProbe, DEFAULT_CONTAINER_RUNTIME};
pub use self::http::{HttpProbe, HEALTHY_DEPENDENCY_STATUSES};
#[cfg(feature = "db-postgres")]
pub use self::postgres::PostgresProbe;
#[cfg(feature = "db-redis")]
pub use self::redis::{RedisProbe, RedisStore};
pub use self::tcp::TcpProbe;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Tcp,
    Exec,
    Container,
    Http,
    Postgres,
    Redis,
}

impl ProbeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Tcp => "tcp",
            ProbeKind::Exec => "exec",
            ProbeKind::Container => "container",
            ProbeKind::Http => "http",
            ProbeKind::Postgres => "postgres",
            ProbeKind::Redis => "redis",
        }
    }
}

/// The raw value a probe saw, kept for reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observed {
    Connected,
    StatusCode(u16),
    ExitCode(i32),
    Reply(String),
    Nothing,
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Connected => f.write_str("connected"),
            Observed::StatusCode(code) => write!(f, "HTTP {code}"),
            Observed::ExitCode(code) => write!(f, "exit {code}"),
            Observed::Reply(reply) => write!(f, "reply `{reply}`"),
            Observed::Nothing => f.write_str("no response"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    pub healthy: bool,
    pub observed: Observed,
    pub detail: Option<String>,
}

impl Observation {
    pub fn healthy(observed: Observed) -> Self {
        Self {
            healthy: true,
            observed,
            detail: None,
        }
    }

    pub fn unhealthy(observed: Observed, detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            observed,
            detail: Some(detail.into()),
        }
    }

    /// Human readable explanation of an unhealthy observation.
    pub fn reason(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{detail} ({})", self.observed),
            None => self.observed.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeExecutionError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not resolve `{target}`: {reason}")]
    Resolve { target: String, reason: String },
    #[error("HTTP client unavailable: {0}")]
    Client(String),
    #[error("{probe} probes require the `{feature}` feature")]
    Unsupported {
        probe: &'static str,
        feature: &'static str,
    },
}

#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> Result<Observation, ProbeExecutionError>;

    fn kind(&self) -> ProbeKind;

    /// Short description of the target, e.g. `tcp localhost:5432`.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_includes_detail_and_observed_value() {
        let observation = Observation::unhealthy(Observed::StatusCode(503), "unexpected status");
        assert_eq!(observation.reason(), "unexpected status (HTTP 503)");
        assert!(!observation.healthy);
    }

    #[test]
    fn healthy_observation_has_no_detail() {
        let observation = Observation::healthy(Observed::Reply("PONG".to_string()));
        assert!(observation.healthy);
        assert_eq!(observation.reason(), "reply `PONG`");
    }
}
