/// Rate limiting middleware
///
/// Every request except `GET /health` is counted against fixed windows per
/// client address and route group:
///
/// - **register**: 10 requests/hour
/// - **verify-email**: 20 requests/minute
/// - **resend-code**: 5 requests/hour
/// - **login**: 20 requests/minute
/// - **check**: 20 requests/minute
/// - **everything else**: 200 requests/day and 50 requests/hour
///
/// Counters live in whichever [`RateLimiter`] the application state holds
/// (Redis in production, in-process otherwise). A rejected request does not
/// consume quota.
///
/// # Headers
///
/// Response includes rate limit headers:
/// - `X-RateLimit-Limit`: Requests allowed in the tightest window
/// - `X-RateLimit-Remaining`: Requests left in that window
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// [`RateLimiter`]: techtreks_shared::rate_limit::RateLimiter

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::net::SocketAddr;
use techtreks_shared::rate_limit::{RateLimitDecision, RateLimitedRoute};

/// Client key used when the peer address is not known
const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limiting middleware layer
///
/// # Errors
///
/// - 429 Too Many Requests: Rate limit exceeded
/// - 500 Internal Server Error: Limiter backend failure
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let Some(route) = RateLimitedRoute::from_path(&path) else {
        return Ok(next.run(request).await);
    };

    let client = client_key(&request);
    let decision = state
        .limiter
        .check(route, &client, Utc::now())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, route = route.as_str(), "Rate limit check failed");
            ApiError::from(e)
        })?;

    match decision {
        RateLimitDecision::Limited { retry_after } => {
            tracing::warn!(route = route.as_str(), client = %client, retry_after, "Rate limit exceeded");
            Err(create_rate_limit_error(retry_after))
        }
        RateLimitDecision::Allowed { limit, remaining } => {
            let mut response = next.run(request).await;

            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));

            Ok(response)
        }
    }
}

/// Peer IP address of the request
///
/// Requests served without connection info (e.g. in-process tests) share
/// one bucket.
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Creates a rate limit exceeded error response
fn create_rate_limit_error(retry_after: u64) -> ApiError {
    ApiError::RateLimitExceeded {
        retry_after,
        message: format!(
            "Rate limit exceeded. Try again in {} seconds",
            retry_after
        ),
    }
}
