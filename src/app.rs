use crate::audit::{AuditOptions, AuditSummary, ConnectivityAuditor};
use crate::config::stack::{safe_bmad_defaults, StackConfig};
use crate::config::OpsConfig;
use crate::error::{Context, Result};
use crate::integration::ProbeFactory;
use crate::metrics::metrics;
use crate::readiness::{DependencyGraph, ReadinessReport, ReadinessWaiter, WaitError, WaitOptions};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Resolved stack plus the probes built from it, ready to wait on or audit.
pub struct OpsApp {
    config: OpsConfig,
    stack: StackConfig,
    graph: DependencyGraph,
    shutdown: CancellationToken,
}

impl OpsApp {
    /// Loads the stack file named in `config`, or the built-in SAFE-BMAD stack
    /// when none is set, and builds its probes.
    pub fn initialise(config: OpsConfig) -> Result<Self> {
        let stack = load_stack(&config)?;
        let graph = ProbeFactory::new()
            .build_graph(&stack)
            .context("failed to build probes for the stack")?;

        tracing::info!(
            event = "stack_loaded",
            services = %graph.names().collect::<Vec<_>>().join(","),
            source = config.stack_config_path.as_deref().unwrap_or("built-in"),
        );

        Ok(Self {
            config,
            stack,
            graph,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    pub fn stack(&self) -> &StackConfig {
        &self.stack
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub async fn wait(&self, options: WaitOptions) -> std::result::Result<ReadinessReport, WaitError> {
        let outcome = ReadinessWaiter::new(options)
            .with_cancellation(self.shutdown.clone())
            .wait(&self.graph)
            .await;
        metrics().log_snapshot();
        outcome
    }

    /// Audit with the round trip enabled or not according to `config`.
    pub async fn audit(&self) -> AuditSummary {
        self.audit_with(AuditOptions {
            cache_round_trip: self.config.cache_round_trip,
        })
        .await
    }

    pub async fn audit_with(&self, options: AuditOptions) -> AuditSummary {
        let summary = ConnectivityAuditor::new(options).audit(&self.graph).await;
        metrics().log_snapshot();
        summary
    }
}

fn load_stack(config: &OpsConfig) -> Result<StackConfig> {
    match config.stack_config_path.as_deref() {
        Some(path) if !path.trim().is_empty() => StackConfig::from_path(Path::new(path))
            .with_context(|| format!("failed to load stack config from {path}")),
        _ => safe_bmad_defaults(config).context("built-in stack settings are invalid"),
    }
}
