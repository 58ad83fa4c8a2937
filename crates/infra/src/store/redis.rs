//! Redis/Valkey-backed shared store.
//!
//! - Counters: `INCR` + `PEXPIRE` in one script, so the expiry is attached
//!   exactly when the key is created
//! - Lists: `LPUSH` to append, `BRPOP` to take the oldest value
//! - Sorted sets: `ZADD` / `ZRANGEBYSCORE` / `ZREM`
//!
//! Connections come from one r2d2 pool per process. A blocked `BRPOP` holds
//! its connection for the whole wait, so size the pool above the worker count.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use hookrelay_core::{RelayError, RelayResult};

use super::SharedStore;
use crate::config::DEFAULT_POOL_SIZE;

const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// How long a caller waits for a free pooled connection.
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

type Pool = r2d2::Pool<redis::Client>;
type PooledConnection = r2d2::PooledConnection<redis::Client>;

/// Shared store backed by a Redis-compatible server.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    incr_script: Arc<redis::Script>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("RedisStore")
            .field("connections", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}

fn store_error(context: &str, err: impl std::fmt::Display) -> RelayError {
    RelayError::store(format!("{context}: {err}"))
}

impl RedisStore {
    /// Open a pool for `redis_url` with [`DEFAULT_POOL_SIZE`] connections.
    pub fn connect(redis_url: impl AsRef<str>) -> RelayResult<Self> {
        Self::connect_with_pool_size(redis_url, DEFAULT_POOL_SIZE)
    }

    /// Open a connection pool and verify the server answers `PING`.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - connection URL (e.g., "redis://localhost:6379/0")
    /// * `pool_size` - maximum number of open connections
    pub fn connect_with_pool_size(redis_url: impl AsRef<str>, pool_size: u32) -> RelayResult<Self> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| store_error("invalid redis url", e))?;

        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .min_idle(Some(1))
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(client)
            .map_err(|e| store_error("connection failed", e))?;

        let store = Self {
            pool,
            incr_script: Arc::new(redis::Script::new(INCR_WITH_EXPIRY)),
        };
        store.ping()?;

        info!(
            url = %redact(redis_url.as_ref()),
            pool_size,
            "connected to shared store"
        );
        Ok(store)
    }

    fn conn(&self) -> RelayResult<PooledConnection> {
        self.pool
            .get()
            .map_err(|e| store_error("connection failed", e))
    }

    fn ping(&self) -> RelayResult<()> {
        let mut conn = self.conn()?;
        let _: String = redis::cmd("PING")
            .query(&mut *conn)
            .map_err(|e| store_error("PING failed", e))?;
        Ok(())
    }
}

/// Hide credentials embedded in the URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

impl SharedStore for RedisStore {
    fn incr_with_expiry(&self, key: &str, ttl: Duration) -> RelayResult<i64> {
        let mut conn = self.conn()?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        self.incr_script
            .key(key)
            .arg(ttl_ms)
            .invoke(&mut *conn)
            .map_err(|e| store_error("INCR failed", e))
    }

    fn list_push(&self, list: &str, value: &str) -> RelayResult<()> {
        let mut conn = self.conn()?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(list)
            .arg(value)
            .query(&mut *conn)
            .map_err(|e| store_error("LPUSH failed", e))?;
        Ok(())
    }

    fn list_pop_blocking(&self, list: &str, timeout: Duration) -> RelayResult<Option<String>> {
        let mut conn = self.conn()?;

        // BRPOP treats 0 as "wait forever"; keep the wait bounded.
        let secs = timeout.as_secs_f64().max(0.001);
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(list)
            .arg(secs)
            .query(&mut *conn)
            .map_err(|e| store_error("BRPOP failed", e))?;

        Ok(popped.map(|(_, value)| value))
    }

    fn sorted_add(&self, set: &str, score: f64, member: &str) -> RelayResult<()> {
        let mut conn = self.conn()?;
        let _: i64 = redis::cmd("ZADD")
            .arg(set)
            .arg(score)
            .arg(member)
            .query(&mut *conn)
            .map_err(|e| store_error("ZADD failed", e))?;
        Ok(())
    }

    fn sorted_range_to(&self, set: &str, max_score: f64) -> RelayResult<Vec<String>> {
        let mut conn = self.conn()?;
        redis::cmd("ZRANGEBYSCORE")
            .arg(set)
            .arg("-inf")
            .arg(max_score)
            .query(&mut *conn)
            .map_err(|e| store_error("ZRANGEBYSCORE failed", e))
    }

    fn sorted_remove(&self, set: &str, member: &str) -> RelayResult<bool> {
        let mut conn = self.conn()?;
        let removed: i64 = redis::cmd("ZREM")
            .arg(set)
            .arg(member)
            .query(&mut *conn)
            .map_err(|e| store_error("ZREM failed", e))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_hides_credentials() {
        assert_eq!(redact("redis://user:pw@host:6379/0"), "redis://***@host:6379/0");
        assert_eq!(redact("redis://localhost:6379"), "redis://localhost:6379");
    }

    #[test]
    fn connect_rejects_malformed_url() {
        assert!(matches!(
            RedisStore::connect("not a url"),
            Err(RelayError::StoreUnavailable(_))
        ));
    }
}
