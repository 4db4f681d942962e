use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt::{self as stdfmt};
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::Event;
use tracing::Subscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{
    self as fmt_subscriber, format::Writer, FmtContext, FormatEvent, FormatFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "safe-ops";
const DEFAULT_FILTER: &str = "safe_ops=info,info";

pub fn init_tracing() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stdout = std::io::stdout;
    let stderr = std::io::stderr;

    let writer = stdout
        .with_max_level(tracing::Level::INFO)
        .or_else(stderr.with_min_level(tracing::Level::WARN));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(false)
        .with_ansi(false)
        .event_format(KeyValueFormatter::new())
        .fmt_fields(fmt_subscriber::format::DefaultFields::new())
        .with_writer(writer)
        .try_init()
        .map_err(|err| crate::err!("failed to initialise tracing subscriber: {err}"))
}

struct KeyValueFormatter {
    service_name: &'static str,
}

impl KeyValueFormatter {
    const fn new() -> Self {
        Self {
            service_name: SERVICE_NAME,
        }
    }
}

impl<S, N> FormatEvent<S, N> for KeyValueFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .take()
            .or_else(|| visitor.take_field("event"))
            .unwrap_or_else(|| metadata.name().to_string());

        let mut fields = visitor.fields;
        fields.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));

        let mut line = String::new();
        push_field(&mut line, "ts", &timestamp);
        push_field(&mut line, "level", metadata.level().as_str());
        push_field(&mut line, "app", self.service_name);
        push_field(&mut line, "component", metadata.target());

        if let Some(span_path) = current_span_path(ctx) {
            push_field(&mut line, "span", &span_path);
        }

        push_field(&mut line, "msg", &message);

        for (key, value) in fields {
            push_field(&mut line, &key, &value);
        }

        writer.write_str(&line)?;
        writer.write_char('\n')
    }
}

fn current_span_path<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    let span = ctx.lookup_current()?;
    let names: Vec<&str> = span.scope().from_root().map(|s| s.name()).collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join("."))
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn record_field(&mut self, field: &Field, value: String) {
        if field.name().is_empty() {
            return;
        }
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }

    fn take_field(&mut self, name: &str) -> Option<String> {
        let index = self.fields.iter().position(|(key, _)| key == name)?;
        Some(self.fields.remove(index).1)
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_field(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.record_field(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_field(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_field(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_field(field, value.to_string());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReadinessState {
    #[default]
    Pending,
    Ready,
    TimedOut,
    Failed,
}

impl ReadinessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadinessState::Pending => "pending",
            ReadinessState::Ready => "ready",
            ReadinessState::TimedOut => "timed_out",
            ReadinessState::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadinessStatusSnapshot {
    pub service: String,
    pub state: ReadinessState,
    pub attempts: u32,
    pub duration_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcomeSnapshot {
    pub service: String,
    pub category: String,
    pub success: u64,
    pub failure: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCountersSnapshot {
    pub readiness: Vec<ReadinessStatusSnapshot>,
    pub probe_outcomes: Vec<ProbeOutcomeSnapshot>,
}

#[derive(Default)]
pub struct RuntimeCounters {
    readiness: ReadinessRegistry,
    probe_outcomes: ProbeOutcomeRegistry,
}

static RUNTIME_COUNTERS: OnceLock<RuntimeCounters> = OnceLock::new();

pub fn runtime_counters() -> &'static RuntimeCounters {
    RUNTIME_COUNTERS.get_or_init(RuntimeCounters::default)
}

impl RuntimeCounters {
    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        RuntimeCountersSnapshot {
            readiness: self.readiness.snapshot(),
            probe_outcomes: self.probe_outcomes.snapshot(),
        }
    }

    pub fn register_readiness_target(&self, service: &str) {
        self.readiness.register(service);
    }

    pub fn record_readiness(
        &self,
        service: &str,
        state: ReadinessState,
        attempts: u32,
        elapsed: Duration,
    ) {
        self.readiness.record(service, state, attempts, elapsed);
    }

    pub fn record_probe_outcome(&self, service: &str, category: &str, success: bool) {
        self.probe_outcomes.record(service, category, success);
    }
}

#[derive(Clone, Debug, Default)]
struct ReadinessEntry {
    state: ReadinessState,
    attempts: u32,
    duration_ms: Option<u64>,
}

#[derive(Default)]
struct ReadinessRegistry {
    inner: Mutex<BTreeMap<String, ReadinessEntry>>,
}

impl ReadinessRegistry {
    fn register(&self, service: &str) {
        let mut guard = self.inner.lock().expect("readiness registry poisoned");
        guard.insert(service.to_string(), ReadinessEntry::default());
    }

    fn record(&self, service: &str, state: ReadinessState, attempts: u32, elapsed: Duration) {
        let mut guard = self.inner.lock().expect("readiness registry poisoned");
        let entry = guard.entry(service.to_string()).or_default();
        entry.state = state;
        entry.attempts = attempts;
        entry.duration_ms = Some(duration_to_millis(elapsed));
    }

    fn snapshot(&self) -> Vec<ReadinessStatusSnapshot> {
        let guard = self.inner.lock().expect("readiness registry poisoned");
        guard
            .iter()
            .map(|(service, entry)| ReadinessStatusSnapshot {
                service: service.clone(),
                state: entry.state,
                attempts: entry.attempts,
                duration_ms: entry.duration_ms,
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
struct ProbeOutcomeEntry {
    success: u64,
    failure: u64,
}

#[derive(Default)]
struct ProbeOutcomeRegistry {
    inner: Mutex<BTreeMap<(String, String), ProbeOutcomeEntry>>,
}

impl ProbeOutcomeRegistry {
    fn record(&self, service: &str, category: &str, success: bool) {
        let mut guard = self.inner.lock().expect("probe outcome registry poisoned");
        let entry = guard
            .entry((service.to_string(), category.to_string()))
            .or_default();
        if success {
            entry.success = entry.success.saturating_add(1);
        } else {
            entry.failure = entry.failure.saturating_add(1);
        }
    }

    fn snapshot(&self) -> Vec<ProbeOutcomeSnapshot> {
        let guard = self.inner.lock().expect("probe outcome registry poisoned");
        guard
            .iter()
            .map(|((service, category), entry)| ProbeOutcomeSnapshot {
                service: service.clone(),
                category: category.clone(),
                success: entry.success,
                failure: entry.failure,
            })
            .collect()
    }
}

pub(crate) fn duration_to_millis(duration: Duration) -> u64 {
    std::cmp::min(duration.as_millis(), u128::from(u64::MAX)) as u64
}

fn encode_field_value(value: &str) -> String {
    let needs_quotes = value.chars().any(|c| {
        c.is_whitespace()
            || matches!(
                c,
                '"' | '\\' | '=' | '[' | ']' | '{' | '}' | ',' | '\n' | '\r' | '\t'
            )
    });

    if !needs_quotes {
        return value.to_string();
    }

    let mut encoded = String::with_capacity(value.len() + 2);
    encoded.push('"');
    for ch in value.chars() {
        match ch {
            '"' => encoded.push_str("\\\""),
            '\\' => encoded.push_str("\\\\"),
            '\n' => encoded.push_str("\\n"),
            '\r' => encoded.push_str("\\r"),
            '\t' => encoded.push_str("\\t"),
            _ => encoded.push(ch),
        }
    }
    encoded.push('"');
    encoded
}

fn push_field(buffer: &mut String, key: &str, value: &str) {
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(key);
    buffer.push('=');
    buffer.push_str(&encode_field_value(value));
}
