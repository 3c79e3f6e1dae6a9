use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::RedisCache;
use crate::config::ThrottleConfig;

/// Per-user rate limit applied as an outer filter on the message branch of the
/// dispatch tree. Counters live in Redis as fixed windows keyed by user id.
pub struct Throttle {
    cache: RedisCache,
    max_messages: i64,
    window_secs: i64,
}

impl Throttle {
    pub fn new(cache: RedisCache, config: &ThrottleConfig) -> Arc<Self> {
        Arc::new(Self {
            cache,
            max_messages: config.max_messages,
            window_secs: config.window_secs,
        })
    }

    /// Whether a message from this user should be handled. Over-limit updates
    /// are dropped silently; a Redis failure fails open so a cache outage
    /// cannot stall the bot mid-flight.
    pub async fn admit(&self, user_id: u64) -> bool {
        let key = throttle_key(user_id);
        match self.cache.incr_window(&key, self.window_secs).await {
            Ok(count) => {
                if over_limit(count, self.max_messages) {
                    debug!("Throttled user {user_id} ({count} messages in window)");
                    false
                } else {
                    true
                }
            }
            Err(e) => {
                warn!("Throttle check failed, letting update through: {e:#}");
                true
            }
        }
    }
}

fn throttle_key(user_id: u64) -> String {
    format!("throttle:user:{user_id}")
}

fn over_limit(count: i64, max_messages: i64) -> bool {
    count > max_messages
}
