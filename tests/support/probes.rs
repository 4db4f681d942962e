use async_trait::async_trait;
use safe_ops::probes::{Observation, Observed, Probe, ProbeExecutionError, ProbeKind};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

/// Shared record of which probe ran, in call order.
#[derive(Clone, Default, Debug)]
pub struct CallLog {
    inner: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.inner.lock().expect("call log").push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().expect("call log").clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == name).count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Healthy,
    Unhealthy,
    /// The probe tool itself cannot run.
    Broken,
    /// Never answers; only the probe timeout ends it.
    Hang,
}

/// Probe that replays a script of outcomes, then repeats `then` forever.
#[derive(Debug)]
pub struct ScriptedProbe {
    name: String,
    script: Mutex<VecDeque<Step>>,
    then: Step,
    log: CallLog,
}

impl ScriptedProbe {
    pub fn new(name: &str, script: Vec<Step>, then: Step, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            then,
            log: log.clone(),
        })
    }

    pub fn healthy(name: &str, log: &CallLog) -> Arc<Self> {
        Self::new(name, Vec::new(), Step::Healthy, log)
    }

    pub fn unhealthy(name: &str, log: &CallLog) -> Arc<Self> {
        Self::new(name, Vec::new(), Step::Unhealthy, log)
    }

    /// Unhealthy for `failures` calls, healthy afterwards.
    pub fn healthy_after(name: &str, failures: usize, log: &CallLog) -> Arc<Self> {
        Self::new(name, vec![Step::Unhealthy; failures], Step::Healthy, log)
    }

    pub fn broken(name: &str, log: &CallLog) -> Arc<Self> {
        Self::new(name, Vec::new(), Step::Broken, log)
    }

    pub fn hanging(name: &str, log: &CallLog) -> Arc<Self> {
        Self::new(name, Vec::new(), Step::Hang, log)
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .expect("probe script")
            .pop_front()
            .unwrap_or(self.then)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn check(&self) -> Result<Observation, ProbeExecutionError> {
        self.log.record(&self.name);
        match self.next_step() {
            Step::Healthy => Ok(Observation::healthy(Observed::Connected)),
            Step::Unhealthy => Ok(Observation::unhealthy(
                Observed::StatusCode(503),
                format!("{} not ready", self.name),
            )),
            Step::Broken => Err(ProbeExecutionError::Spawn {
                program: format!("{}-check", self.name),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
            }),
            Step::Hang => {
                std::future::pending::<()>().await;
                unreachable!("pending never resolves")
            }
        }
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Exec
    }

    fn describe(&self) -> String {
        format!("fake {}", self.name)
    }
}
