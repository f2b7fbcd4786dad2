/// Session cookie handling
///
/// The browser holds an opaque token in the `techtreks_session` cookie; the
/// server only ever stores its SHA-256 digest. This module reads the cookie
/// into a [`RequestContext`] and turns the [`SessionCommand`] an operation
/// returns into a `Set-Cookie` header.
///
/// ```text
/// techtreks_session=<token>; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600[; Secure]
/// ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
};
use chrono::{DateTime, Utc};
use std::convert::Infallible;
use techtreks_shared::auth::{RequestContext, SessionCommand};

use crate::error::ApiError;

pub const SESSION_COOKIE_NAME: &str = "techtreks_session";

/// Request context extracted from the session cookie and the clock
///
/// A missing or malformed cookie yields an anonymous context; it is never
/// an error.
#[derive(Debug, Clone)]
pub struct Session(pub RequestContext);

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(&parts.headers);
        Ok(Session(RequestContext::new(token, Utc::now())))
    }
}

/// Finds the session token among the request's `Cookie` headers
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Builds the `HttpOnly` cookie for a freshly issued session token
pub fn session_cookie(
    token: &str,
    max_age_secs: i64,
    secure: bool,
) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::InternalError(format!("Invalid session cookie: {}", e)))
}

/// Builds a cookie that makes the browser drop the session
pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static(
            "techtreks_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure",
        )
    } else {
        HeaderValue::from_static("techtreks_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

/// Response headers carrying out a session command
pub fn session_headers(
    command: &SessionCommand,
    now: DateTime<Utc>,
    secure: bool,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    match command {
        SessionCommand::Keep => {}
        SessionCommand::Set(issued) => {
            headers.insert(
                SET_COOKIE,
                session_cookie(&issued.token, issued.max_age_secs(now), secure)?,
            );
        }
        SessionCommand::Clear => {
            headers.insert(SET_COOKIE, clear_session_cookie(secure));
        }
    }
    Ok(headers)
}
