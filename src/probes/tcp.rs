use crate::dsn::ConnectionTarget;
use crate::probes::{Observation, Observed, Probe, ProbeExecutionError, ProbeKind};
use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream};

/// Port reachability: healthy once a TCP connection is accepted.
#[derive(Clone, Debug)]
pub struct TcpProbe {
    host: String,
    port: u16,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_target(target: &ConnectionTarget) -> Self {
        Self::new(target.host.clone(), target.port)
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self) -> Result<Observation, ProbeExecutionError> {
        let addrs: Vec<_> = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|err| ProbeExecutionError::Resolve {
                target: self.address(),
                reason: err.to_string(),
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ProbeExecutionError::Resolve {
                target: self.address(),
                reason: "no addresses returned".to_string(),
            });
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(_) => return Ok(Observation::healthy(Observed::Connected)),
                Err(err) => last_error = Some(format!("{addr}: {err}")),
            }
        }

        let reason = last_error.unwrap_or_else(|| "connection failed".to_string());
        Ok(Observation::unhealthy(Observed::Nothing, reason))
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Tcp
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.address())
    }
}
