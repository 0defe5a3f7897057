use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Errors from the ephemeral state store
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state store backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Ephemeral key-value store with TTL and an atomic compare-and-set
///
/// All shared mutable state of the core (LiveStatus, BookingReservation)
/// lives behind this trait; `compare_and_set` is the only mutation primitive
/// and is what makes instant booking race-free across service instances.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError>;

    /// Atomically replace the value at `key` if it currently equals
    /// `expected` (`None` means the key must be absent). Returns whether the
    /// swap happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new_value: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError>;

    async fn delete(&self, key: &str) -> Result<(), StateStoreError>;
}

/// State store key builder
pub struct StateKey;

impl StateKey {
    /// Key for an expert's live status
    pub fn live(expert_id: &str) -> String {
        format!("live:{}", expert_id)
    }

    /// Key for an instant-booking reservation
    pub fn reservation(token: &str) -> String {
        format!("resv:{}", token)
    }
}

/// In-process state store for tests and single-node deployments
///
/// One mutex over the whole map makes every operation, including the
/// compare-and-set, trivially atomic. Expiry is checked lazily on access
/// (tokio time, so paused-clock tests can drive it).
#[derive(Default)]
pub struct InMemoryStateStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new_value: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        let mut entries = self.entries.lock().await;

        let current = match entries.get(key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.as_str()),
            None => None,
        };

        if current != expected {
            return Ok(false);
        }

        entries.insert(key.to_string(), (new_value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StateStoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
