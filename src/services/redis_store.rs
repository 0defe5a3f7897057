use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use crate::services::state_store::{StateStore, StateStoreError};

/// Lua script performing the compare-and-set in one atomic server-side step.
/// ARGV[1] is the expected prior value, with the empty string standing in for
/// "key absent" (stored values are JSON objects and never empty).
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '' then
    if current then return 0 end
else
    if current ~= ARGV[1] then return 0 end
end
redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
return 1
"#;

/// Redis-backed ephemeral state store
///
/// Shared across service instances; the CAS script is what makes reservation
/// arbitration linearizable per key without any in-process locking.
pub struct RedisStateStore {
    conn: ConnectionManager,
    cas: Script,
}

impl RedisStateStore {
    pub async fn new(redis_url: &str) -> Result<Self, StateStoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StateStoreError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StateStoreError::Backend(e.to_string()))?;

        Ok(Self {
            conn,
            cas: Script::new(CAS_SCRIPT),
        })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StateStoreError::Backend(e.to_string()))?;
        Ok(value)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new_value: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        let mut conn = self.conn.clone();
        let swapped: i64 = self
            .cas
            .key(key)
            .arg(expected.unwrap_or(""))
            .arg(new_value)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateStoreError::Backend(e.to_string()))?;

        tracing::trace!("CAS {} -> {}", key, swapped == 1);
        Ok(swapped == 1)
    }

    async fn delete(&self, key: &str) -> Result<(), StateStoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StateStoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
