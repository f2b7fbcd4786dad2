//! Common test utilities for API tests
//!
//! Builds the full router on in-process backends:
//! - `MemoryStore` for users, pending verifications, sessions, messages and products
//! - `RecordingDispatcher` capturing every verification code
//! - `MemoryRateLimiter` with fresh counters per test app

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use techtreks_api::app::{build_router, AppState};
use techtreks_api::config::Config;
use techtreks_shared::email::RecordingDispatcher;
use techtreks_shared::rate_limit::MemoryRateLimiter;
use techtreks_shared::store::MemoryStore;
use tower::Service as _;

pub const PASSWORD: &str = "SecurePass123!";

/// Test context holding the router and handles on its backends
pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingDispatcher>,
    pub config: Config,
}

/// Response status, headers and decoded JSON body
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Session token from a `Set-Cookie` header, if one was set
    pub fn session_token(&self) -> Option<String> {
        self.set_cookie()
            .and_then(|cookie| cookie.split(';').next().map(str::to_string))
            .and_then(|pair| pair.split_once('=').map(|(_, v)| v.to_string()))
            .filter(|token| !token.is_empty())
    }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::for_tests())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingDispatcher::new());
        let state = AppState::new(
            store.clone(),
            mailer.clone(),
            Arc::new(MemoryRateLimiter::new()),
            config.clone(),
        );

        Self {
            app: build_router(state),
            store,
            mailer,
            config,
        }
    }

    /// Sends a request and decodes the JSON body (`Null` when empty)
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response: Response<Body> = self.app.clone().call(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, session: Option<&str>) -> TestResponse {
        self.send(build_request("GET", uri, None, session, None)).await
    }

    pub async fn post(&self, uri: &str, body: Value, session: Option<&str>) -> TestResponse {
        self.send(build_request("POST", uri, Some(body), session, None))
            .await
    }

    pub async fn put(&self, uri: &str, body: Value, session: Option<&str>) -> TestResponse {
        self.send(build_request("PUT", uri, Some(body), session, None))
            .await
    }

    pub async fn delete(&self, uri: &str, session: Option<&str>) -> TestResponse {
        self.send(build_request("DELETE", uri, None, session, None))
            .await
    }

    /// POST as if it came from `client`
    pub async fn post_from(&self, client: &str, uri: &str, body: Value) -> TestResponse {
        self.send(build_request("POST", uri, Some(body), None, Some(client)))
            .await
    }

    /// Registers `username` and returns the code that was emailed
    pub async fn start_registration(&self, username: &str) -> String {
        let email = email_for(username);
        let response = self
            .post(
                "/auth/register",
                serde_json::json!({ "username": username, "email": email, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

        self.mailer.last_code_for(&email).unwrap()
    }

    /// Registers and verifies `username`; returns the session token and user id
    pub async fn register_user(&self, username: &str) -> (String, String) {
        let code = self.start_registration(username).await;
        let response = self
            .post(
                "/auth/verify-email",
                serde_json::json!({ "email": email_for(username), "code": code }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);

        let token = response.session_token().unwrap();
        let id = response.body["user"]["id"].as_str().unwrap().to_string();
        (token, id)
    }
}

pub fn email_for(username: &str) -> String {
    format!("{}@nyu.edu", username)
}

/// A 4-digit code different from `code`
pub fn wrong_code(code: &str) -> String {
    let other = if code == "1000" { "1001" } else { "1000" };
    other.to_string()
}

pub fn build_request(
    method: &str,
    uri: &str,
    body: Option<Value>,
    session: Option<&str>,
    client: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = session {
        builder = builder.header(header::COOKIE, format!("techtreks_session={}", token));
    }

    let mut request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    if let Some(client) = client {
        let addr: SocketAddr = format!("{}:40000", client).parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
    }

    request
}
