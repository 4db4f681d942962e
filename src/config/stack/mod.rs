//! YAML description of the services to wait for and audit.
//!
//! Parsing is two-phase: serde fills loose `Raw*` structs, then a validation
//! pass resolves them into typed definitions and collects every problem it
//! finds, so a broken file is reported in one go.

mod builtin;
mod defaults;
mod services;

use serde::de::Error as _;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

pub use builtin::safe_bmad_defaults;
pub use defaults::{RetrySettings, StackDefaults};
pub use services::{ProbeDefinition, ProbeTarget, ServiceDefinition};

pub const SUPPORTED_API_VERSION: &str = "v1";

const TOP_LEVEL_FIELDS: &str = "api_version, defaults, services";

#[derive(Debug, Clone)]
pub struct StackConfig {
    pub defaults: StackDefaults,
    pub services: Vec<ServiceDefinition>,
}

impl StackConfig {
    pub fn from_reader(mut reader: impl Read) -> Result<Self, StackConfigError> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StackConfigError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, StackConfigError> {
        let mut documents = serde_yaml::Deserializer::from_str(contents);
        let mut parsed = None;
        let mut extra_errors = Vec::new();

        for (index, document) in documents.by_ref().enumerate() {
            if index == 0 {
                parsed = Some(RawStackFile::deserialize(document)?);
            } else {
                let _: YamlValue = YamlValue::deserialize(document)?;
                extra_errors.push("multiple YAML documents are not supported".to_string());
                break;
            }
        }

        let Some(raw) = parsed else {
            let err = serde_yaml::Error::custom("stack config must contain exactly one YAML document");
            return Err(StackConfigError::Parse(err));
        };

        Self::from_raw(raw, extra_errors).map_err(StackConfigError::Invalid)
    }

    fn from_raw(raw: RawStackFile, mut errors: Vec<String>) -> Result<Self, StackValidationError> {
        let RawStackFile {
            api_version,
            defaults: raw_defaults,
            services: raw_services,
            extra_fields,
        } = raw;

        for key in extra_fields.keys() {
            errors.push(format!(
                "unknown top-level key \"{key}\" (expected one of {TOP_LEVEL_FIELDS})"
            ));
        }

        check_api_version(api_version, &mut errors);
        let defaults = defaults::parse_defaults(raw_defaults, &mut errors);
        let services = services::parse_services(raw_services, &defaults, &mut errors);

        if errors.is_empty() {
            Ok(Self { defaults, services })
        } else {
            Err(StackValidationError::new(errors))
        }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|service| service.name == name)
    }
}

fn check_api_version(raw: Option<String>, errors: &mut Vec<String>) {
    match raw {
        None => errors.push(format!(
            "api_version is required (supported versions: {SUPPORTED_API_VERSION})"
        )),
        Some(value) => {
            let trimmed = value.trim();
            if !trimmed.eq_ignore_ascii_case(SUPPORTED_API_VERSION) {
                errors.push(format!(
                    "api_version `{trimmed}` is not supported (supported versions: {SUPPORTED_API_VERSION})"
                ));
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawStackFile {
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    defaults: Option<defaults::RawDefaults>,
    #[serde(default)]
    services: Vec<services::RawService>,
    #[serde(default)]
    #[serde(flatten)]
    extra_fields: BTreeMap<String, YamlValue>,
}

#[derive(Debug, Error)]
pub enum StackConfigError {
    #[error("failed to read stack config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse stack config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(StackValidationError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("stack config validation failed:\n{rendered}")]
pub struct StackValidationError {
    messages: Vec<String>,
    rendered: String,
}

impl StackValidationError {
    pub fn new(messages: Vec<String>) -> Self {
        let rendered = messages
            .iter()
            .map(|msg| format!("- {msg}"))
            .collect::<Vec<_>>()
            .join("\n");
        Self { messages, rendered }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

fn value_to_string(value: &YamlValue) -> String {
    match value {
        YamlValue::Null => "null".to_string(),
        YamlValue::Bool(inner) => inner.to_string(),
        YamlValue::Number(inner) => inner.to_string(),
        YamlValue::String(inner) => inner.clone(),
        YamlValue::Sequence(items) => format!(
            "[{}]",
            items
                .iter()
                .map(value_to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        YamlValue::Mapping(_) => "{...}".to_string(),
        YamlValue::Tagged(tagged) => value_to_string(&tagged.value),
    }
}
