use crate::probes::{CacheError, CacheStore};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

pub const ROUND_TRIP_KEY_PREFIX: &str = "safe-ops:audit:";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoundTripError {
    #[error("write failed: {0}")]
    Write(CacheError),
    #[error("read failed: {0}")]
    Read(CacheError),
    #[error("read back `{actual:?}` instead of `{expected}`")]
    Mismatch {
        expected: String,
        actual: Option<String>,
    },
    #[error("cleanup failed: {0}")]
    Cleanup(CacheError),
    #[error("key `{key}` still present after cleanup")]
    Leaked { key: String },
}

/// Writes a unique key, reads it back and deletes it. Each cache command
/// gets its own `op_timeout`.
pub async fn cache_round_trip(
    store: &dyn CacheStore,
    op_timeout: Duration,
) -> Result<(), RoundTripError> {
    let key = format!("{ROUND_TRIP_KEY_PREFIX}{}", Uuid::new_v4());
    let value = Uuid::new_v4().to_string();
    cache_round_trip_with(store, &key, &value, op_timeout).await
}

/// SET `key` to `value`, GET it back and compare, then DEL it whatever the
/// comparison said, and confirm the key is gone. The first problem found is
/// reported; cleanup is attempted even after a failed, or timed out, write
/// or read.
pub async fn cache_round_trip_with(
    store: &dyn CacheStore,
    key: &str,
    value: &str,
    op_timeout: Duration,
) -> Result<(), RoundTripError> {
    let verdict = write_and_verify(store, key, value, op_timeout).await;

    let cleanup = bounded("DEL", op_timeout, store.delete(key))
        .await
        .map_err(RoundTripError::Cleanup);
    let absent = match cleanup {
        Ok(()) => match bounded("GET", op_timeout, store.get(key)).await {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(RoundTripError::Leaked {
                key: key.to_string(),
            }),
            Err(err) => Err(RoundTripError::Read(err)),
        },
        Err(err) => Err(err),
    };

    if let Err(err) = &absent {
        tracing::warn!(key = key, store = %store.describe(), error = %err, "round-trip key cleanup failed");
    }

    verdict.and(absent)
}

async fn write_and_verify(
    store: &dyn CacheStore,
    key: &str,
    value: &str,
    op_timeout: Duration,
) -> Result<(), RoundTripError> {
    bounded("SET", op_timeout, store.set(key, value))
        .await
        .map_err(RoundTripError::Write)?;
    let actual = bounded("GET", op_timeout, store.get(key))
        .await
        .map_err(RoundTripError::Read)?;
    if actual.as_deref() == Some(value) {
        Ok(())
    } else {
        Err(RoundTripError::Mismatch {
            expected: value.to_string(),
            actual,
        })
    }
}

async fn bounded<T>(
    operation: &'static str,
    op_timeout: Duration,
    call: impl Future<Output = Result<T, CacheError>>,
) -> Result<T, CacheError> {
    match timeout(op_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::new(
            operation,
            format!("timed out after {}", humantime::format_duration(op_timeout)),
        )),
    }
}
