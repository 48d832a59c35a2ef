//! Byte-keyed store shared by the Raft core and the application.
//!
//! The Raft core persists exactly three blobs here (`currentTerm`,
//! `votedFor`, `log`); the application state machine keeps its values under
//! its own keys. The namespaces share one flat map and key discipline is the
//! caller's responsibility.
//!
//! The store has its own mutex so the application can read while the node
//! mutex is held elsewhere; writes return only once the value is stored,
//! which is what makes a persist call durable before the next message leaves.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Error;

#[derive(Debug, Default)]
pub struct Store {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, bytes: Vec<u8>) {
        self.data.lock().unwrap().insert(name.to_string(), bytes);
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(name).cloned()
    }

    /// True once anything has ever been stored. A restarting node restores
    /// its Raft state only when this holds.
    pub fn has_data(&self) -> bool {
        !self.data.lock().unwrap().is_empty()
    }

    /// Stores an application value under `key`.
    pub fn set_app_value(&self, key: &str, value: i64) {
        let bytes = bincode::serialize(&value).expect("i64 serialization is infallible");
        self.set(key, bytes);
    }

    /// Reads an application value. Unknown keys are a typed error, not a
    /// Raft concern.
    pub fn app_value(&self, key: &str) -> Result<i64, Error> {
        let bytes = self
            .get(key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
