/// Per-client request rate limiting
///
/// Every limited route has one or more fixed windows. A request is allowed
/// only if every window still has room, and only allowed requests are
/// counted, so a client hammering a full window does not push its own reset
/// further out.
///
/// # Limits
///
/// | Route | Windows |
/// |---|---|
/// | `POST /auth/register` | 10 / hour |
/// | `POST /auth/verify-email` | 20 / minute |
/// | `POST /auth/resend-code` | 5 / hour |
/// | `POST /auth/login` | 20 / minute |
/// | `POST /auth/check` | 20 / minute |
/// | anything else | 200 / day and 50 / hour |
///
/// `/health` is never limited.
///
/// # Implementations
///
/// - [`memory::MemoryRateLimiter`]: one process, state in a mutex-held map
/// - [`redis::RedisRateLimiter`]: shared across instances, one Lua script per check

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryRateLimiter;
pub use self::redis::RedisRateLimiter;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// One fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimit {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    /// Index of the window containing `now`
    pub fn window_index(&self, now: DateTime<Utc>) -> u64 {
        unix_secs(now) / self.window_secs
    }

    /// Seconds from `now` until the current window closes
    pub fn retry_after(&self, now: DateTime<Utc>) -> u64 {
        self.window_secs - unix_secs(now) % self.window_secs
    }
}

/// Route groups sharing a quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitedRoute {
    Register,
    VerifyEmail,
    ResendCode,
    Login,
    Check,
    Default,
}

impl RateLimitedRoute {
    /// Maps a matched route path to its quota group
    ///
    /// `None` for routes that are not limited at all.
    pub fn from_path(path: &str) -> Option<Self> {
        let route = match path {
            "/health" => return None,
            "/auth/register" => Self::Register,
            "/auth/verify-email" => Self::VerifyEmail,
            "/auth/resend-code" => Self::ResendCode,
            "/auth/login" => Self::Login,
            "/auth/check" => Self::Check,
            _ => Self::Default,
        };
        Some(route)
    }

    pub fn limits(&self) -> &'static [RateLimit] {
        const REGISTER: [RateLimit; 1] = [RateLimit::new(10, HOUR)];
        const VERIFY_EMAIL: [RateLimit; 1] = [RateLimit::new(20, MINUTE)];
        const RESEND_CODE: [RateLimit; 1] = [RateLimit::new(5, HOUR)];
        const LOGIN: [RateLimit; 1] = [RateLimit::new(20, MINUTE)];
        const CHECK: [RateLimit; 1] = [RateLimit::new(20, MINUTE)];
        const DEFAULT: [RateLimit; 2] = [RateLimit::new(200, DAY), RateLimit::new(50, HOUR)];

        match self {
            Self::Register => &REGISTER,
            Self::VerifyEmail => &VERIFY_EMAIL,
            Self::ResendCode => &RESEND_CODE,
            Self::Login => &LOGIN,
            Self::Check => &CHECK,
            Self::Default => &DEFAULT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::VerifyEmail => "verify_email",
            Self::ResendCode => "resend_code",
            Self::Login => "login",
            Self::Check => "check",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// `limit` and `remaining` describe the tightest window after counting
    /// this request
    Allowed { limit: u32, remaining: u32 },

    /// Seconds until every full window has reset
    Limited { retry_after: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit backend error: {0}")]
    Backend(String),
}

impl From<::redis::RedisError> for RateLimitError {
    fn from(err: ::redis::RedisError) -> Self {
        RateLimitError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one request from `client` against `route` if it fits
    async fn check(
        &self,
        route: RateLimitedRoute,
        client: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitError>;
}

/// Limiter that allows everything
#[derive(Debug, Clone, Default)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check(
        &self,
        route: RateLimitedRoute,
        _client: &str,
        _now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let limit = route
            .limits()
            .iter()
            .map(|l| l.max_requests)
            .min()
            .unwrap_or(0);
        Ok(RateLimitDecision::Allowed {
            limit,
            remaining: limit,
        })
    }
}

fn unix_secs(now: DateTime<Utc>) -> u64 {
    now.timestamp().max(0) as u64
}
