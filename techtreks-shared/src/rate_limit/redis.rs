/// Redis-backed fixed-window limiter
///
/// One key per window: `ratelimit:{route}:{window_secs}:{client}:{window_index}`.
/// The whole check runs as a single Lua script so concurrent requests from
/// several API instances see a consistent count:
///
/// ```lua
/// -- ARGV[1] = now; ARGV[2i], ARGV[2i+1] = max_requests, window_secs of KEYS[i]
/// for each key: if GET(key) >= max then remember window - now % window
/// if any window is full: return {0, 0, 0, longest_wait}
/// for each key: INCR, and EXPIRE window on the first hit
/// return {1, tightest_limit, tightest_remaining, 0}
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::error;

use super::{RateLimitDecision, RateLimitError, RateLimitedRoute, RateLimiter};

const CHECK_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local retry_after = 0

for i = 1, #KEYS do
    local count = tonumber(redis.call('GET', KEYS[i]) or '0')
    local max = tonumber(ARGV[2 * i])
    local window = tonumber(ARGV[2 * i + 1])
    if count >= max then
        local wait = window - (now % window)
        if wait > retry_after then
            retry_after = wait
        end
    end
end

if retry_after > 0 then
    return {0, 0, 0, retry_after}
end

local limit = -1
local remaining = -1
for i = 1, #KEYS do
    local max = tonumber(ARGV[2 * i])
    local window = tonumber(ARGV[2 * i + 1])
    local count = redis.call('INCR', KEYS[i])
    if count == 1 then
        redis.call('EXPIRE', KEYS[i], window)
    end
    local left = max - count
    if remaining < 0 or left < remaining then
        limit = max
        remaining = left
    end
end

return {1, limit, remaining, 0}
"#;

pub struct RedisRateLimiter {
    conn: ConnectionManager,
    script: Script,
}

impl RedisRateLimiter {
    /// Connects to Redis at `url`
    pub async fn connect(url: &str) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            script: Script::new(CHECK_SCRIPT),
        })
    }
}

fn window_key(route: RateLimitedRoute, window_secs: u64, client: &str, index: u64) -> String {
    format!(
        "ratelimit:{}:{}:{}:{}",
        route.as_str(),
        window_secs,
        client,
        index
    )
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(
        &self,
        route: RateLimitedRoute,
        client: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let mut invocation = self.script.prepare_invoke();
        invocation.arg(now.timestamp().max(0));

        for limit in route.limits() {
            invocation.key(window_key(
                route,
                limit.window_secs,
                client,
                limit.window_index(now),
            ));
            invocation.arg(limit.max_requests).arg(limit.window_secs);
        }

        let mut conn = self.conn.clone();
        let result: Vec<i64> = invocation.invoke_async(&mut conn).await.map_err(|e| {
            error!(error = %e, route = route.as_str(), "Rate limit script failed");
            RateLimitError::from(e)
        })?;

        match result.as_slice() {
            [1, limit, remaining, _] => Ok(RateLimitDecision::Allowed {
                limit: (*limit).max(0) as u32,
                remaining: (*remaining).max(0) as u32,
            }),
            [0, _, _, retry_after] => Ok(RateLimitDecision::Limited {
                retry_after: (*retry_after).max(1) as u64,
            }),
            other => Err(RateLimitError::Backend(format!(
                "unexpected rate limit script reply: {:?}",
                other
            ))),
        }
    }
}
