use crate::dsn::redact;
use crate::probes::{
    CacheError, CacheStore, Observation, Observed, Probe, ProbeExecutionError, ProbeKind,
};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;

/// Expiry on round-trip keys, so a crash between SET and DEL cannot leave
/// the key behind for long.
const ROUND_TRIP_TTL_SECS: u64 = 60;

/// `PING` expecting `PONG`.
#[derive(Clone)]
pub struct RedisProbe {
    client: Client,
    url: String,
}

impl RedisProbe {
    pub fn new(url: &str) -> Result<Self, ProbeExecutionError> {
        let client = Client::open(url).map_err(|err| ProbeExecutionError::Client(err.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl std::fmt::Debug for RedisProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisProbe")
            .field("url", &redact(&self.url))
            .finish()
    }
}

#[async_trait]
impl Probe for RedisProbe {
    async fn check(&self) -> Result<Observation, ProbeExecutionError> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                return Ok(Observation::unhealthy(
                    Observed::Nothing,
                    format!("connect failed: {err}"),
                ));
            }
        };

        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(reply) if reply.eq_ignore_ascii_case("PONG") => {
                Ok(Observation::healthy(Observed::Reply(reply)))
            }
            Ok(reply) => Ok(Observation::unhealthy(
                Observed::Reply(reply),
                "expected PONG",
            )),
            Err(err) => Ok(Observation::unhealthy(
                Observed::Nothing,
                format!("PING failed: {err}"),
            )),
        }
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Redis
    }

    fn describe(&self) -> String {
        format!("redis PING {}", redact(&self.url))
    }
}

/// Redis-backed [`CacheStore`] for the audit round trip.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    url: String,
}

impl RedisStore {
    pub fn new(url: &str) -> Result<Self, ProbeExecutionError> {
        let client = Client::open(url).map_err(|err| ProbeExecutionError::Client(err.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn connection(&self, operation: &'static str) -> Result<MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| CacheError::new(operation, err.to_string()))
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection("SET").await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ROUND_TRIP_TTL_SECS)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|err| CacheError::new("SET", err.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection("GET").await?;
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|err| CacheError::new("GET", err.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection("DEL").await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| CacheError::new("DEL", err.to_string()))
    }

    fn describe(&self) -> String {
        format!("redis {}", redact(&self.url))
    }
}
