//! Validation of the environment variables the SAFE-BMAD stack expects.

use crate::dsn::{redact, ConnectionTarget};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

pub const MIN_SECRET_KEY_LEN: usize = 32;
pub const ENVIRONMENTS: &[&str] = &["development", "staging", "production", "test"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvRule {
    NonEmpty,
    Dsn(Vec<String>),
    Url,
    MinLength(usize),
    OneOf(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvRequirement {
    pub name: String,
    pub rule: EnvRule,
    pub required: bool,
}

impl EnvRequirement {
    pub fn required(name: impl Into<String>, rule: EnvRule) -> Self {
        Self {
            name: name.into(),
            rule,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, rule: EnvRule) -> Self {
        Self {
            name: name.into(),
            rule,
            required: false,
        }
    }
}

pub fn default_requirements() -> Vec<EnvRequirement> {
    vec![
        EnvRequirement::required(
            "DATABASE_URL",
            EnvRule::Dsn(vec!["postgres".to_string(), "postgresql".to_string()]),
        ),
        EnvRequirement::required(
            "REDIS_URL",
            EnvRule::Dsn(vec!["redis".to_string(), "rediss".to_string()]),
        ),
        EnvRequirement::required("SECRET_KEY", EnvRule::MinLength(MIN_SECRET_KEY_LEN)),
        EnvRequirement::optional(
            "ENVIRONMENT",
            EnvRule::OneOf(ENVIRONMENTS.iter().map(|env| env.to_string()).collect()),
        ),
        EnvRequirement::optional("API_BASE_URL", EnvRule::Url),
    ]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvCheckStatus {
    Ok,
    Missing,
    Invalid(String),
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvCheck {
    pub name: String,
    pub status: EnvCheckStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvReport {
    pub checks: Vec<EnvCheck>,
}

impl EnvReport {
    pub fn problems(&self) -> impl Iterator<Item = &EnvCheck> {
        self.checks.iter().filter(|check| {
            matches!(
                check.status,
                EnvCheckStatus::Missing | EnvCheckStatus::Invalid(_)
            )
        })
    }

    pub fn is_valid(&self) -> bool {
        self.problems().next().is_none()
    }
}

impl fmt::Display for EnvReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            match &check.status {
                EnvCheckStatus::Ok => writeln!(f, "  ok       {}", check.name)?,
                EnvCheckStatus::Skipped => writeln!(f, "  unset    {} (optional)", check.name)?,
                EnvCheckStatus::Missing => writeln!(f, "  missing  {}", check.name)?,
                EnvCheckStatus::Invalid(reason) => {
                    writeln!(f, "  invalid  {}: {reason}", check.name)?
                }
            }
        }
        Ok(())
    }
}

/// Checks every requirement and reports all problems at once.
pub fn validate_environment(
    vars: &BTreeMap<String, String>,
    requirements: &[EnvRequirement],
) -> EnvReport {
    let checks = requirements
        .iter()
        .map(|requirement| {
            let value = vars
                .get(&requirement.name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty());
            let status = match value {
                None if requirement.required => EnvCheckStatus::Missing,
                None => EnvCheckStatus::Skipped,
                Some(value) => match check_rule(&requirement.rule, value) {
                    Ok(()) => EnvCheckStatus::Ok,
                    Err(reason) => EnvCheckStatus::Invalid(reason),
                },
            };
            EnvCheck {
                name: requirement.name.clone(),
                status,
            }
        })
        .collect();

    EnvReport { checks }
}

fn check_rule(rule: &EnvRule, value: &str) -> Result<(), String> {
    match rule {
        EnvRule::NonEmpty => Ok(()),
        EnvRule::Dsn(schemes) => {
            let schemes: Vec<&str> = schemes.iter().map(String::as_str).collect();
            ConnectionTarget::parse_with_schemes(value, &schemes)
                .map(|_| ())
                .map_err(|err| err.to_string())
        }
        EnvRule::Url => match Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
            Ok(url) => Err(format!(
                "`{}` must be an http(s) URL with a host",
                redact(url.as_str())
            )),
            Err(err) => Err(format!("`{value}` is not a valid URL: {err}")),
        },
        EnvRule::MinLength(min) => {
            let len = value.chars().count();
            if len >= *min {
                Ok(())
            } else {
                Err(format!("must be at least {min} characters (got {len})"))
            }
        }
        EnvRule::OneOf(allowed) => {
            if allowed.iter().any(|candidate| candidate == value) {
                Ok(())
            } else {
                Err(format!(
                    "`{value}` is not one of: {}",
                    allowed.join(", ")
                ))
            }
        }
    }
}
