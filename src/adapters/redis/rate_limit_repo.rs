use crate::adapters::redis::RedisClient;
use crate::domain::ClientIdentity;
use crate::services::rate_limit_service::{RateLimitStore, Reservation};
use async_trait::async_trait;
use std::sync::{Arc, LazyLock};
use time::{Duration, OffsetDateTime};

// KEYS[1] = ledger key, ARGV[1] = now (ms), ARGV[2] = window (ms).
// Returns 0 when the slot was taken, otherwise the remaining wait in ms.
static RESERVE: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
local last = redis.call('GET', KEYS[1])
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
if last then
    local elapsed = now - tonumber(last)
    if elapsed < window then
        return window - elapsed
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', window)
return 0
",
    )
});

// KEYS[1] = ledger key, ARGV[1] = reserved timestamp (ms).
static RELEASE: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
",
    )
});

/// Send ledger shared by every instance through Valkey.
///
/// Entries expire on their own once the window passes, so no pruning is needed.
#[derive(Debug, Clone)]
pub struct ValkeyRateLimitStore {
    redis: Arc<RedisClient>,
    prefix: String,
}

impl ValkeyRateLimitStore {
    #[must_use]
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis, prefix: "contact:last_sent:".to_string() }
    }

    fn key(&self, identity: &ClientIdentity) -> String {
        format!("{}{}", self.prefix, identity.as_str())
    }
}

fn to_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.whole_milliseconds()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl RateLimitStore for ValkeyRateLimitStore {
    async fn reserve(
        &self,
        identity: &ClientIdentity,
        now: OffsetDateTime,
        window: Duration,
    ) -> anyhow::Result<Reservation> {
        let mut conn = self.redis.connection();
        let wait_ms: i64 = RESERVE
            .key(self.key(identity))
            .arg(to_millis(now))
            .arg(window_millis(window))
            .invoke_async(&mut conn)
            .await?;

        if wait_ms <= 0 {
            Ok(Reservation::Granted { reserved_at: now })
        } else {
            Ok(Reservation::Denied { retry_after: Duration::milliseconds(wait_ms) })
        }
    }

    async fn release(&self, identity: &ClientIdentity, reserved_at: OffsetDateTime) -> anyhow::Result<()> {
        let mut conn = self.redis.connection();
        let _: i64 = RELEASE.key(self.key(identity)).arg(to_millis(reserved_at)).invoke_async(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.redis.ping().await
    }
}
