use crate::probes::{Observation, Observed, Probe, ProbeExecutionError, ProbeKind};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

pub const DEFAULT_CONTAINER_RUNTIME: &str = "docker";

/// Runs a command and compares its exit code (and optionally stdout).
///
/// Covers `pg_isready`, `redis-cli ping` inside a container, and container
/// liveness via `<runtime> inspect`.
#[derive(Clone, Debug)]
pub struct ExecProbe {
    kind: ProbeKind,
    program: String,
    args: Vec<String>,
    expect_exit: i32,
    expect_stdout: Option<String>,
}

impl ExecProbe {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ProbeKind::Exec,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            expect_exit: 0,
            expect_stdout: None,
        }
    }

    /// Liveness of a named container: `<runtime> inspect -f {{.State.Running}} <name>`.
    pub fn container(runtime: impl Into<String>, container: impl Into<String>) -> Self {
        let container = container.into();
        let mut probe = Self::new(
            runtime,
            [
                "inspect".to_string(),
                "-f".to_string(),
                "{{.State.Running}}".to_string(),
                container,
            ],
        )
        .expect_stdout("true");
        probe.kind = ProbeKind::Container;
        probe
    }

    pub fn expect_exit(mut self, code: i32) -> Self {
        self.expect_exit = code;
        self
    }

    pub fn expect_stdout(mut self, needle: impl Into<String>) -> Self {
        self.expect_stdout = Some(needle.into());
        self
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[async_trait]
impl Probe for ExecProbe {
    async fn check(&self) -> Result<Observation, ProbeExecutionError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeExecutionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let Some(code) = output.status.code() else {
            return Ok(Observation::unhealthy(
                Observed::Nothing,
                "process terminated by signal",
            ));
        };

        let observed = Observed::ExitCode(code);
        if code != self.expect_exit {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = match stderr.trim() {
                "" => format!("expected exit {}", self.expect_exit),
                text => format!("expected exit {}: {}", self.expect_exit, first_line(text)),
            };
            return Ok(Observation::unhealthy(observed, detail));
        }

        if let Some(needle) = &self.expect_stdout {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.contains(needle.as_str()) {
                let seen = first_line(stdout.trim());
                return Ok(Observation::unhealthy(
                    Observed::Reply(seen.to_string()),
                    format!("stdout does not contain `{needle}`"),
                ));
            }
        }

        Ok(Observation::healthy(observed))
    }

    fn kind(&self) -> ProbeKind {
        self.kind
    }

    fn describe(&self) -> String {
        format!("{} `{}`", self.kind.as_str(), self.command_line())
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
