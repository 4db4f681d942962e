use crate::probes::DEFAULT_CONTAINER_RUNTIME;
use crate::readiness::DEFAULT_PROBE_TIMEOUT;
use crate::retry::{Backoff, JitterMode, RetryPolicy, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
use humantime::parse_duration;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDefaults {
    pub container_runtime: String,
    pub probe_timeout: Duration,
    pub retry: RetrySettings,
}

impl Default for StackDefaults {
    fn default() -> Self {
        Self {
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            retry: RetrySettings::default(),
        }
    }
}

/// Retry knobs as written in the file. Unset fields inherit from the
/// enclosing defaults when a service's settings are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: Option<u32>,
    pub interval: Option<Duration>,
    pub timeout: Option<Duration>,
    pub backoff: Option<BackoffMode>,
    pub max_backoff: Option<Duration>,
    pub jitter: Option<JitterMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffMode {
    Fixed,
    Exponential,
}

impl RetrySettings {
    pub fn merged(&self, overrides: &RetrySettings) -> RetrySettings {
        RetrySettings {
            max_attempts: overrides.max_attempts.or(self.max_attempts),
            interval: overrides.interval.or(self.interval),
            timeout: overrides.timeout.or(self.timeout),
            backoff: overrides.backoff.or(self.backoff),
            max_backoff: overrides.max_backoff.or(self.max_backoff),
            jitter: overrides.jitter.or(self.jitter),
        }
    }

    /// Without an explicit `max_attempts`, the count is `timeout / interval`.
    pub fn to_policy(&self) -> RetryPolicy {
        let interval = self.interval.unwrap_or(DEFAULT_INTERVAL);
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let mut policy = RetryPolicy::from_timeout(timeout, interval);
        if let Some(attempts) = self.max_attempts {
            policy.max_attempts = attempts;
        }
        if self.backoff == Some(BackoffMode::Exponential) {
            let max = self.max_backoff.unwrap_or(timeout);
            policy = policy.with_backoff(Backoff::Exponential { max });
        }
        policy.with_jitter(self.jitter.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawDefaults {
    #[serde(default)]
    container_runtime: Option<String>,
    #[serde(default)]
    probe_timeout: Option<String>,
    #[serde(default)]
    retry: Option<RawRetry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawRetry {
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    interval: Option<String>,
    #[serde(default)]
    timeout: Option<String>,
    #[serde(default)]
    backoff: Option<String>,
    #[serde(default)]
    max_backoff: Option<String>,
    #[serde(default)]
    jitter: Option<String>,
}

pub(crate) fn parse_defaults(raw: Option<RawDefaults>, errors: &mut Vec<String>) -> StackDefaults {
    let mut defaults = StackDefaults::default();
    let Some(raw) = raw else {
        return defaults;
    };

    if let Some(runtime) = raw.container_runtime {
        let trimmed = runtime.trim();
        if trimmed.is_empty() {
            errors.push("defaults.container_runtime must be a non-empty string".to_string());
        } else {
            defaults.container_runtime = trimmed.to_string();
        }
    }

    if let Some(timeout) = parse_positive_duration("defaults.probe_timeout", raw.probe_timeout, errors)
    {
        defaults.probe_timeout = timeout;
    }

    defaults.retry = parse_retry(raw.retry, errors, "defaults.retry");
    defaults
}

pub(crate) fn parse_retry(
    raw: Option<RawRetry>,
    errors: &mut Vec<String>,
    context_label: &str,
) -> RetrySettings {
    let Some(raw) = raw else {
        return RetrySettings::default();
    };

    let mut settings = RetrySettings {
        max_attempts: raw.max_attempts,
        ..RetrySettings::default()
    };
    if settings.max_attempts == Some(0) {
        errors.push(format!("{context_label}.max_attempts must be greater than zero"));
    }

    settings.interval =
        parse_positive_duration(&format!("{context_label}.interval"), raw.interval, errors);
    settings.timeout =
        parse_positive_duration(&format!("{context_label}.timeout"), raw.timeout, errors);
    settings.max_backoff =
        parse_positive_duration(&format!("{context_label}.max_backoff"), raw.max_backoff, errors);

    if let Some(backoff) = raw.backoff {
        match backoff.trim().to_ascii_lowercase().as_str() {
            "fixed" => settings.backoff = Some(BackoffMode::Fixed),
            "exponential" => settings.backoff = Some(BackoffMode::Exponential),
            other => errors.push(format!(
                "{context_label}.backoff must be one of `fixed` or `exponential` (got `{other}`)"
            )),
        }
    }

    if let Some(jitter) = raw.jitter {
        match JitterMode::parse(&jitter) {
            Some(mode) => settings.jitter = Some(mode),
            None => errors.push(format!(
                "{context_label}.jitter must be one of `none`, `equal`, or `full` (got `{}`)",
                jitter.trim()
            )),
        }
    }

    if let (Some(interval), Some(timeout)) = (settings.interval, settings.timeout) {
        if interval > timeout {
            errors.push(format!(
                "{context_label}.interval must be less than or equal to {context_label}.timeout"
            ));
        }
    }

    if let (Some(interval), Some(max_backoff)) = (settings.interval, settings.max_backoff) {
        if max_backoff < interval {
            errors.push(format!(
                "{context_label}.max_backoff must be greater than or equal to {context_label}.interval"
            ));
        }
    }

    settings
}

pub(crate) fn parse_positive_duration(
    field_label: &str,
    raw: Option<String>,
    errors: &mut Vec<String>,
) -> Option<Duration> {
    let raw_value = raw?;
    let trimmed = raw_value.trim();
    if trimmed.is_empty() {
        errors.push(format!("{field_label} must be a non-empty duration string"));
        return None;
    }

    match parse_duration(trimmed) {
        Ok(duration) if duration.is_zero() => {
            errors.push(format!("{field_label} must be greater than zero"));
            None
        }
        Ok(duration) => Some(duration),
        Err(_) => {
            errors.push(format!("{field_label} must be a valid duration (got `{trimmed}`)"));
            None
        }
    }
}
