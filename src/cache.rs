use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use tracing::info;

/// Thin wrapper around the Redis client used for throttling counters.
///
/// Opening the client does not touch the network; connections are established
/// per command through the multiplexed pool. `ping` is the startup
/// connectivity check and the only place a Redis failure is fatal.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("Invalid Redis URL: {url}"))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")
    }

    /// Round-trip a PING to confirm the cache is reachable.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING failed")?;
        anyhow::ensure!(reply == "PONG", "unexpected PING reply: {reply}");
        info!("Redis connection verified");
        Ok(())
    }

    /// Increment a fixed-window counter, setting the window TTL on first hit.
    /// Returns the counter value after the increment.
    pub async fn incr_window(&self, key: &str, window_secs: i64) -> Result<i64> {
        let mut conn = self.connection().await?;
        let count: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("INCR failed for key {key}"))?;
        if count == 1 {
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_secs)
                .query_async(&mut conn)
                .await
                .with_context(|| format!("EXPIRE failed for key {key}"))?;
        }
        Ok(count)
    }
}
