/// In-process fixed-window limiter
///
/// Counters are keyed by route, window length and client, and remember which
/// window they belong to; a counter from an older window is treated as zero.
/// Stale counters are dropped once the map grows past a threshold.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{RateLimitDecision, RateLimitError, RateLimitedRoute, RateLimiter};

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    route: RateLimitedRoute,
    window_secs: u64,
    client: String,
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    window_index: u64,
    count: u32,
}

#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    counters: Mutex<HashMap<CounterKey, Counter>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(
        &self,
        route: RateLimitedRoute,
        client: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let limits = route.limits();
        let mut counters = self.counters.lock().await;

        if counters.len() > PRUNE_THRESHOLD {
            let now_secs = now.timestamp().max(0) as u64;
            counters.retain(|key, counter| (counter.window_index + 1) * key.window_secs > now_secs);
        }

        let mut counts = Vec::with_capacity(limits.len());
        for limit in limits {
            let key = CounterKey {
                route,
                window_secs: limit.window_secs,
                client: client.to_string(),
            };
            let count = counters
                .get(&key)
                .filter(|c| c.window_index == limit.window_index(now))
                .map_or(0, |c| c.count);
            counts.push((key, count));
        }

        let retry_after = limits
            .iter()
            .zip(&counts)
            .filter(|(limit, (_, count))| *count >= limit.max_requests)
            .map(|(limit, _)| limit.retry_after(now))
            .max();
        if let Some(retry_after) = retry_after {
            return Ok(RateLimitDecision::Limited { retry_after });
        }

        let mut tightest: Option<(u32, u32)> = None;
        for (limit, (key, count)) in limits.iter().zip(counts) {
            let count = count + 1;
            counters.insert(
                key,
                Counter {
                    window_index: limit.window_index(now),
                    count,
                },
            );

            let remaining = limit.max_requests - count;
            if tightest.map_or(true, |(_, r)| remaining < r) {
                tightest = Some((limit.max_requests, remaining));
            }
        }

        let (limit, remaining) = tightest.unwrap_or((0, 0));
        Ok(RateLimitDecision::Allowed { limit, remaining })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_rejects() {
        let limiter = MemoryRateLimiter::new();
        let now = at(3600 * 1000);

        for expected_remaining in (0..5).rev() {
            let decision = limiter
                .check(RateLimitedRoute::ResendCode, "1.2.3.4", now)
                .await
                .unwrap();
            assert_eq!(
                decision,
                RateLimitDecision::Allowed {
                    limit: 5,
                    remaining: expected_remaining
                }
            );
        }

        let decision = limiter
            .check(RateLimitedRoute::ResendCode, "1.2.3.4", now + Duration::seconds(600))
            .await
            .unwrap();
        assert_eq!(decision, RateLimitDecision::Limited { retry_after: 3000 });
    }

    #[tokio::test]
    async fn test_clients_and_routes_are_independent() {
        let limiter = MemoryRateLimiter::new();
        let now = at(3600 * 1000);

        for _ in 0..5 {
            limiter.check(RateLimitedRoute::ResendCode, "a", now).await.unwrap();
        }

        let other_client = limiter.check(RateLimitedRoute::ResendCode, "b", now).await.unwrap();
        assert!(matches!(other_client, RateLimitDecision::Allowed { .. }));

        let other_route = limiter.check(RateLimitedRoute::Register, "a", now).await.unwrap();
        assert!(matches!(other_route, RateLimitDecision::Allowed { .. }));
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = MemoryRateLimiter::new();
        let now = at(60 * 1000);

        for _ in 0..20 {
            limiter.check(RateLimitedRoute::Login, "a", now).await.unwrap();
        }
        let blocked = limiter.check(RateLimitedRoute::Login, "a", now).await.unwrap();
        assert!(matches!(blocked, RateLimitDecision::Limited { .. }));

        let next_window = limiter
            .check(RateLimitedRoute::Login, "a", now + Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(
            next_window,
            RateLimitDecision::Allowed {
                limit: 20,
                remaining: 19
            }
        );
    }

    #[tokio::test]
    async fn test_default_route_reports_tightest_window() {
        let limiter = MemoryRateLimiter::new();
        let now = at(86400 * 100);

        let decision = limiter.check(RateLimitedRoute::Default, "a", now).await.unwrap();
        assert_eq!(
            decision,
            RateLimitDecision::Allowed {
                limit: 50,
                remaining: 49
            }
        );

        for _ in 0..49 {
            limiter.check(RateLimitedRoute::Default, "a", now).await.unwrap();
        }
        let blocked = limiter.check(RateLimitedRoute::Default, "a", now).await.unwrap();
        assert_eq!(blocked, RateLimitDecision::Limited { retry_after: 3600 });
    }

    #[tokio::test]
    async fn test_rejected_requests_are_not_counted() {
        let limiter = MemoryRateLimiter::new();
        let now = at(86400 * 100);

        for _ in 0..50 {
            limiter.check(RateLimitedRoute::Default, "a", now).await.unwrap();
        }
        for _ in 0..10 {
            limiter.check(RateLimitedRoute::Default, "a", now).await.unwrap();
        }

        // Next hour: the daily window holds 50, not 60
        let next_hour = now + Duration::hours(1);
        let decision = limiter.check(RateLimitedRoute::Default, "a", next_hour).await.unwrap();
        assert_eq!(
            decision,
            RateLimitDecision::Allowed {
                limit: 50,
                remaining: 49
            }
        );

        let counters = limiter.counters.lock().await;
        let daily = counters
            .get(&CounterKey {
                route: RateLimitedRoute::Default,
                window_secs: 86400,
                client: "a".to_string(),
            })
            .unwrap();
        assert_eq!(daily.count, 51);
    }
}
