#![allow(clippy::result_large_err)]

use anyhow::{anyhow, Context};
use jsonschema::{Draft, JSONSchema};
use safe_ops::app::OpsApp;
use safe_ops::audit::AuditOptions;
use safe_ops::config::{OpsConfig, StackConfig};
use safe_ops::env_check::{default_requirements, validate_environment};
use safe_ops::readiness::{WaitError, WaitOptions};
use safe_ops::telemetry;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const EMBEDDED_SCHEMA: &str = include_str!("../docs/reference/stack.schema.json");
const DEFAULT_SCHEMA_PATH: &str = "docs/reference/stack.schema.json";

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Wait {
        stack_path: Option<String>,
        keep_going: bool,
    },
    Audit {
        stack_path: Option<String>,
        skip_round_trip: bool,
    },
    Validate {
        schema_path: Option<String>,
        configs: Vec<String>,
    },
    ValidateEnv,
    List {
        stack_path: Option<String>,
    },
    Help,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise telemetry")?;

    match parse_cli_args(std::env::args().skip(1))? {
        CliCommand::Wait {
            stack_path,
            keep_going,
        } => run_wait(stack_path, keep_going).await,
        CliCommand::Audit {
            stack_path,
            skip_round_trip,
        } => run_audit(stack_path, skip_round_trip).await,
        CliCommand::Validate {
            schema_path,
            configs,
        } => run_validate_command(schema_path, configs),
        CliCommand::ValidateEnv => run_validate_env(),
        CliCommand::List { stack_path } => run_list(stack_path),
        CliCommand::Help => {
            print_help();
            Ok(())
        }
    }
}

fn parse_cli_args<I>(args: I) -> anyhow::Result<CliCommand>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(CliCommand::Help);
    };

    match first.as_str() {
        "wait" => {
            let mut stack_path = None;
            let mut keep_going = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "-c" | "--config" => set_stack_path(&mut stack_path, &arg, args.next())?,
                    "--keep-going" => keep_going = true,
                    "-h" | "--help" => return Ok(CliCommand::Help),
                    other => anyhow::bail!("unrecognised argument `{other}` for wait"),
                }
            }
            Ok(CliCommand::Wait {
                stack_path,
                keep_going,
            })
        }
        "audit" => {
            let mut stack_path = None;
            let mut skip_round_trip = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "-c" | "--config" => set_stack_path(&mut stack_path, &arg, args.next())?,
                    "--skip-cache-roundtrip" => skip_round_trip = true,
                    "-h" | "--help" => return Ok(CliCommand::Help),
                    other => anyhow::bail!("unrecognised argument `{other}` for audit"),
                }
            }
            Ok(CliCommand::Audit {
                stack_path,
                skip_round_trip,
            })
        }
        "list" => {
            let mut stack_path = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "-c" | "--config" => set_stack_path(&mut stack_path, &arg, args.next())?,
                    "-h" | "--help" => return Ok(CliCommand::Help),
                    other => anyhow::bail!("unrecognised argument `{other}` for list"),
                }
            }
            Ok(CliCommand::List { stack_path })
        }
        "validate" => parse_validate_args(args),
        "validate-env" => Ok(CliCommand::ValidateEnv),
        "help" | "-h" | "--help" => Ok(CliCommand::Help),
        other => anyhow::bail!("unknown command `{other}` (run `safe-ops help`)"),
    }
}

fn set_stack_path(
    slot: &mut Option<String>,
    flag: &str,
    value: Option<String>,
) -> anyhow::Result<()> {
    if slot.is_some() {
        anyhow::bail!("stack config path specified multiple times");
    }
    let value = value.ok_or_else(|| anyhow!("expected path after {flag}"))?;
    *slot = Some(value);
    Ok(())
}

fn parse_validate_args<I>(args: I) -> anyhow::Result<CliCommand>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut schema_path = None;
    let mut configs = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--schema" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("expected path after --schema"))?;
                schema_path = Some(value);
            }
            "-h" | "--help" => return Ok(CliCommand::Help),
            other => configs.push(other.to_string()),
        }
    }

    if configs.is_empty() {
        anyhow::bail!("safe-ops validate requires at least one stack config path");
    }

    Ok(CliCommand::Validate {
        schema_path,
        configs,
    })
}

fn print_help() {
    println!(
        "\
Usage: safe-ops <COMMAND> [OPTIONS]

Commands:
  wait           Block until every service is ready, in dependency order
  audit          Check every service once and report all failures
  validate       Check stack config files against the schema and rules
  validate-env   Check DATABASE_URL, REDIS_URL, SECRET_KEY and ENVIRONMENT
  list           Print the services and probes of the stack
  help           Print this help message

Options:
  -c, --config <PATH>        Stack YAML file (default: built-in SAFE-BMAD stack)
      --keep-going           wait: keep checking later services after a failure
      --skip-cache-roundtrip audit: skip the cache write/read/delete check
      --schema <PATH>        validate: override docs/reference/stack.schema.json
  -h, --help                 Print this help message
"
    );
}

fn load_config(stack_path: Option<String>) -> anyhow::Result<OpsConfig> {
    let mut config = OpsConfig::load().context("failed to load configuration")?;
    if let Some(path) = stack_path {
        config.stack_config_path = Some(path);
    }
    Ok(config)
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping");
            trigger.cancel();
        }
    });
    token
}

async fn run_wait(stack_path: Option<String>, keep_going: bool) -> anyhow::Result<()> {
    let config = load_config(stack_path)?;
    let app = OpsApp::initialise(config)
        .context("failed to construct application")?
        .with_shutdown(shutdown_on_ctrl_c());

    let options = WaitOptions {
        continue_on_failure: keep_going,
    };
    match app.wait(options).await {
        Ok(report) if report.all_ready() => {
            println!("all services ready\n{report}");
            Ok(())
        }
        Ok(report) => {
            println!("{report}");
            let failed: Vec<&str> = report
                .services
                .iter()
                .filter(|service| !service.is_ready())
                .map(|service| service.name.as_str())
                .collect();
            Err(anyhow!("services not ready: {}", failed.join(", ")))
        }
        Err(err) => {
            eprintln!("{}", err.report());
            if let WaitError::Timeout(timeout) = &err {
                eprintln!(
                    "hint: check `{}` logs and its connection settings",
                    timeout.service
                );
            }
            Err(err).context("readiness wait failed")
        }
    }
}

async fn run_audit(stack_path: Option<String>, skip_round_trip: bool) -> anyhow::Result<()> {
    let mut config = load_config(stack_path)?;
    if skip_round_trip {
        config.cache_round_trip = false;
    }
    let app = OpsApp::initialise(config).context("failed to construct application")?;
    let options = AuditOptions {
        cache_round_trip: app.config().cache_round_trip,
    };

    let summary = app.audit_with(options).await;
    println!("{summary}");
    if summary.is_success() {
        return Ok(());
    }

    for failure in summary.failures() {
        eprintln!(
            "- {} {} {}: {}",
            failure.service,
            failure.category.as_str(),
            failure.target,
            failure.reason
        );
    }
    Err(anyhow!(
        "{} of {} checks failed ({})",
        summary.failed_count(),
        summary.total(),
        summary.failing_services().join(", ")
    ))
}

fn run_validate_env() -> anyhow::Result<()> {
    let vars: BTreeMap<String, String> = std::env::vars().collect();
    let report = validate_environment(&vars, &default_requirements());
    print!("{report}");
    if report.is_valid() {
        println!("environment ok");
        Ok(())
    } else {
        Err(anyhow!(
            "{} environment variable(s) missing or invalid",
            report.problems().count()
        ))
    }
}

fn run_list(stack_path: Option<String>) -> anyhow::Result<()> {
    let config = load_config(stack_path)?;
    let app = OpsApp::initialise(config).context("failed to construct application")?;

    for (index, service) in app.graph().ordered().enumerate() {
        let retry = service.retry();
        println!(
            "{}. {} (attempts={}, interval={}, timeout={})",
            index + 1,
            service.name(),
            retry.max_attempts(),
            humantime::format_duration(retry.interval),
            humantime::format_duration(retry.timeout),
        );
        for handle in service.probes() {
            let marker = if handle.gating { "gate " } else { "audit" };
            println!(
                "   [{marker}] {:<10} {}",
                handle.category.as_str(),
                handle.describe()
            );
        }
        if let Some(store) = service.cache() {
            println!("   [audit] {:<10} round trip {}", "cache", store.describe());
        }
    }
    Ok(())
}

fn run_validate_command(
    schema_override: Option<String>,
    configs: Vec<String>,
) -> anyhow::Result<()> {
    let schema = compile_json_schema(schema_override.as_deref())?;
    let mut had_error = false;

    for config in configs {
        let path = PathBuf::from(&config);
        if let Err(err) = validate_with_schema(&schema, &path) {
            eprintln!("{err}");
            had_error = true;
            continue;
        }

        match StackConfig::from_path(&path) {
            Ok(stack) => println!(
                "validated {} ({} service(s))",
                path.display(),
                stack.services.len()
            ),
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                had_error = true;
            }
        }
    }

    if had_error {
        Err(anyhow!("one or more stack configs failed validation"))
    } else {
        Ok(())
    }
}

fn compile_json_schema(override_path: Option<&str>) -> anyhow::Result<JSONSchema> {
    if let Some(path) = override_path {
        return load_schema_from_path(Path::new(path));
    }

    let default_path = Path::new(DEFAULT_SCHEMA_PATH);
    match load_schema_from_path(default_path) {
        Ok(schema) => Ok(schema),
        Err(err) => {
            warn!(
                schema = DEFAULT_SCHEMA_PATH,
                error = %err,
                "falling back to embedded stack.schema.json"
            );
            compile_embedded_schema()
        }
    }
}

fn compile_embedded_schema() -> anyhow::Result<JSONSchema> {
    let parsed: JsonValue =
        serde_json::from_str(EMBEDDED_SCHEMA).context("embedded JSON schema is invalid JSON")?;
    compile_schema_from_json(parsed, "embedded schema")
}

fn load_schema_from_path(path: &Path) -> anyhow::Result<JSONSchema> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read JSON schema at {}", path.display()))?;
    let parsed: JsonValue = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON schema {}", path.display()))?;
    compile_schema_from_json(parsed, &path.display().to_string())
}

fn compile_schema_from_json(value: JsonValue, label: &str) -> anyhow::Result<JSONSchema> {
    let leaked: &'static JsonValue = Box::leak(Box::new(value));
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(leaked)
        .map_err(|err| anyhow!("failed to compile JSON schema {label}: {err}"))
}

fn validate_with_schema(schema: &JSONSchema, path: &Path) -> anyhow::Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let yaml: YamlValue = serde_yaml::from_str(&raw)
        .with_context(|| format!("{} is not valid YAML", path.display()))?;
    let json =
        serde_json::to_value(yaml).context("failed to convert YAML configuration to JSON")?;

    if let Err(errors) = schema.validate(&json) {
        let mut message = String::new();
        for error in errors {
            use std::fmt::Write as _;
            let _ = writeln!(message, "- {}: {}", path.display(), error);
        }
        anyhow::bail!("schema validation failed:\n{}", message.trim_end());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<CliCommand> {
        parse_cli_args(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn no_arguments_prints_help() {
        assert_eq!(parse(&[]).expect("parse"), CliCommand::Help);
    }

    #[test]
    fn wait_accepts_config_and_keep_going() {
        assert_eq!(
            parse(&["wait", "-c", "stack.yaml", "--keep-going"]).expect("parse"),
            CliCommand::Wait {
                stack_path: Some("stack.yaml".to_string()),
                keep_going: true,
            }
        );
    }

    #[test]
    fn audit_can_skip_round_trip() {
        assert_eq!(
            parse(&["audit", "--skip-cache-roundtrip"]).expect("parse"),
            CliCommand::Audit {
                stack_path: None,
                skip_round_trip: true,
            }
        );
    }

    #[test]
    fn duplicate_config_flag_is_rejected() {
        let err = parse(&["list", "-c", "a.yaml", "--config", "b.yaml"]).expect_err("duplicate");
        assert!(err.to_string().contains("multiple times"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = parse(&["deploy"]).expect_err("unknown");
        assert!(err.to_string().contains("unknown command `deploy`"));
    }

    #[test]
    fn validate_requires_a_path() {
        assert!(parse(&["validate", "--schema", "s.json"]).is_err());
        assert_eq!(
            parse(&["validate", "a.yaml", "b.yaml"]).expect("parse"),
            CliCommand::Validate {
                schema_path: None,
                configs: vec!["a.yaml".to_string(), "b.yaml".to_string()],
            }
        );
    }

    #[test]
    fn embedded_schema_accepts_sample_stack() {
        let schema = compile_embedded_schema().expect("schema compiles");
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/stack.yaml");
        validate_with_schema(&schema, &path).expect("sample stack matches schema");
        StackConfig::from_path(&path).expect("sample stack passes validation");
    }

    #[test]
    fn embedded_schema_rejects_unknown_probe_type() {
        let schema = compile_embedded_schema().expect("schema compiles");
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        use std::io::Write as _;
        writeln!(
            file,
            "api_version: v1\nservices:\n  - name: x\n    probes:\n      - type: ftp\n        url: ftp://x"
        )
        .expect("write");
        let err = validate_with_schema(&schema, file.path()).expect_err("invalid");
        assert!(err.to_string().contains("schema validation failed"));
    }
}
