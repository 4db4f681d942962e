use crate::dsn::redact;
use crate::probes::{Observation, Observed, Probe, ProbeExecutionError, ProbeKind};
use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::Connection;

/// Opens a fresh connection and runs `SELECT 1`.
#[derive(Clone)]
pub struct PostgresProbe {
    url: String,
}

impl PostgresProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl std::fmt::Debug for PostgresProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresProbe")
            .field("url", &redact(&self.url))
            .finish()
    }
}

#[async_trait]
impl Probe for PostgresProbe {
    async fn check(&self) -> Result<Observation, ProbeExecutionError> {
        let mut conn = match PgConnection::connect(&self.url).await {
            Ok(conn) => conn,
            Err(err) => {
                return Ok(Observation::unhealthy(
                    Observed::Nothing,
                    format!("connect failed: {err}"),
                ));
            }
        };

        let outcome = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&mut conn)
            .await;
        if let Err(err) = conn.close().await {
            tracing::debug!(error = %err, "postgres probe connection close failed");
        }

        match outcome {
            Ok(value) => Ok(Observation::healthy(Observed::Reply(value.to_string()))),
            Err(err) => Ok(Observation::unhealthy(
                Observed::Nothing,
                format!("SELECT 1 failed: {err}"),
            )),
        }
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Postgres
    }

    fn describe(&self) -> String {
        format!("postgres {}", redact(&self.url))
    }
}
