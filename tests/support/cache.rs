use async_trait::async_trait;
use safe_ops::probes::{CacheError, CacheStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheFault {
    None,
    /// GET returns a different value than was written.
    CorruptReads,
    FailWrites,
    FailDeletes,
    /// DEL reports success but the key stays.
    IgnoreDeletes,
    /// GET never answers.
    HangReads,
}

/// In-memory [`CacheStore`] that records every operation.
#[derive(Clone, Debug)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
    operations: Arc<Mutex<Vec<String>>>,
    fault: CacheFault,
}

impl MemoryCache {
    pub fn new(fault: CacheFault) -> Self {
        Self {
            entries: Arc::default(),
            operations: Arc::default(),
            fault,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().expect("cache entries").keys().cloned().collect()
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().expect("cache ops").clone()
    }

    fn log(&self, op: &str) {
        self.operations.lock().expect("cache ops").push(op.to_string());
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.log("set");
        if self.fault == CacheFault::FailWrites {
            return Err(CacheError::new("SET", "READONLY replica"));
        }
        self.entries
            .lock()
            .expect("cache entries")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.log("get");
        if self.fault == CacheFault::HangReads {
            std::future::pending::<()>().await;
        }
        let value = self.entries.lock().expect("cache entries").get(key).cloned();
        Ok(match (self.fault, value) {
            (CacheFault::CorruptReads, Some(_)) => Some("corrupted".to_string()),
            (_, value) => value,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.log("delete");
        match self.fault {
            CacheFault::FailDeletes => Err(CacheError::new("DEL", "connection reset")),
            CacheFault::IgnoreDeletes => Ok(()),
            _ => {
                self.entries.lock().expect("cache entries").remove(key);
                Ok(())
            }
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
