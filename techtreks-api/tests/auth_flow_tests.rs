/// End-to-end tests of the authentication endpoints
///
/// Every test drives the full router (middleware included) on in-memory
/// backends; see `common`.

mod common;

use axum::http::{header, StatusCode};
use common::{email_for, wrong_code, TestApp, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_health_is_public_and_unlimited() {
    let app = TestApp::new();

    let response = app.get("/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["store"], "connected");
    assert!(response.headers.get("X-RateLimit-Limit").is_none());
    assert_eq!(response.headers.get("X-Content-Type-Options").unwrap(), "nosniff");
}

#[tokio::test]
async fn test_register_sends_code() {
    let app = TestApp::new();

    let response = app
        .post(
            "/auth/register",
            json!({ "username": "alice", "email": "  Alice@NYU.edu ", "password": PASSWORD }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(
        response.body,
        json!({ "ok": true, "msg": "verification code sent to email", "email": "alice@nyu.edu" })
    );
    assert_eq!(response.headers.get("X-RateLimit-Limit").unwrap(), "10");
    assert_eq!(response.headers.get("X-RateLimit-Remaining").unwrap(), "9");

    let code = app.mailer.last_code_for("alice@nyu.edu").unwrap();
    assert_eq!(code.len(), 4);
    assert_eq!(app.store.pending_count().await, 1);
    assert_eq!(app.store.user_count().await, 0);
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = TestApp::new();

    let cases = [
        (
            json!({ "email": "bob@nyu.edu", "password": PASSWORD }),
            "username, email and password are required",
        ),
        (
            json!({ "username": "bob", "email": "bob@gmail.com", "password": PASSWORD }),
            "only NYU email addresses are allowed (@nyu.edu)",
        ),
        (
            json!({ "username": "bob", "email": "bob@nyu.edu", "password": "short" }),
            "password must be at least 8 characters",
        ),
        (
            json!({ "username": "b!", "email": "bob@nyu.edu", "password": PASSWORD }),
            "username must be 3-30 characters",
        ),
    ];

    for (body, message) in cases {
        let response = app.post("/auth/register", body, None).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", message);
        assert_eq!(response.body["message"], message);
    }

    assert_eq!(app.store.pending_count().await, 0);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_register_rejects_malformed_json() {
    let app = TestApp::new();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "bad_request");
}

#[tokio::test]
async fn test_oversized_password_is_rejected_with_details() {
    let app = TestApp::new();

    let response = app
        .post(
            "/auth/register",
            json!({ "username": "alice", "email": "alice@nyu.edu", "password": "Aa1!".repeat(300) }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "validation_error");
    assert_eq!(response.body["details"][0]["field"], "password");
}

#[tokio::test]
async fn test_wrong_code_reports_remaining_attempts() {
    let app = TestApp::new();
    let code = app.start_registration("alice").await;

    let response = app
        .post(
            "/auth/verify-email",
            json!({ "email": "alice@nyu.edu", "code": wrong_code(&code) }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "invalid_code");
    assert_eq!(response.body["message"], "invalid code");
    assert_eq!(response.body["remaining_attempts"], 4);
    assert!(response.set_cookie().is_none());
}

#[tokio::test]
async fn test_verify_creates_user_and_logs_in() {
    let app = TestApp::new();
    let code = app.start_registration("alice").await;

    let response = app
        .post(
            "/auth/verify-email",
            json!({ "email": "alice@nyu.edu", "code": code }),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ok"], true);
    assert_eq!(response.body["msg"], "email verified and account created");
    assert_eq!(response.body["user"]["username"], "alice");
    assert_eq!(response.body["user"]["email"], "alice@nyu.edu");
    assert!(response.body["user"].get("password_hash").is_none());

    let cookie = response.set_cookie().unwrap();
    assert!(cookie.starts_with("techtreks_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=3600"));
    assert!(!cookie.contains("Secure"));

    let token = response.session_token().unwrap();
    let me = app.get("/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["user"]["username"], "alice");

    assert_eq!(app.store.user_count().await, 1);
    assert_eq!(app.store.pending_count().await, 0);
}

#[tokio::test]
async fn test_secure_cookie_when_configured() {
    let mut config = techtreks_api::config::Config::for_tests();
    config.auth.session_cookie_secure = true;
    let app = TestApp::with_config(config);
    let code = app.start_registration("alice").await;

    let response = app
        .post(
            "/auth/verify-email",
            json!({ "email": "alice@nyu.edu", "code": code }),
            None,
        )
        .await;

    assert!(response.set_cookie().unwrap().ends_with("; Secure"));
}

#[tokio::test]
async fn test_fifth_wrong_code_locks_out_registration() {
    let app = TestApp::new();
    let code = app.start_registration("alice").await;
    let wrong = wrong_code(&code);

    for remaining in (0..5).rev() {
        let response = app
            .post(
                "/auth/verify-email",
                json!({ "email": "alice@nyu.edu", "code": wrong }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["remaining_attempts"], remaining);
    }

    // Even the right code is refused once the attempts are used up
    let response = app
        .post(
            "/auth/verify-email",
            json!({ "email": "alice@nyu.edu", "code": code }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body["error"], "too_many_attempts");
    assert_eq!(
        response.body["message"],
        "too many failed attempts, please register again"
    );

    assert_eq!(app.store.pending_count().await, 0);
    assert_eq!(app.store.user_count().await, 0);
}

#[tokio::test]
async fn test_verify_without_pending_record() {
    let app = TestApp::new();

    let response = app
        .post(
            "/auth/verify-email",
            json!({ "email": "ghost@nyu.edu", "code": "1234" }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "no pending verification for this email");

    let response = app
        .post("/auth/verify-email", json!({ "email": "ghost@nyu.edu" }), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "email and code are required");
}

#[tokio::test]
async fn test_resend_issues_working_code() {
    let app = TestApp::new();
    let first = app.start_registration("alice").await;
    let wrong = wrong_code(&first);

    app.post(
        "/auth/verify-email",
        json!({ "email": "alice@nyu.edu", "code": wrong }),
        None,
    )
    .await;

    let response = app
        .post("/auth/resend-code", json!({ "email": "alice@nyu.edu" }), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "ok": true, "msg": "new verification code sent" }));
    assert_eq!(app.mailer.sent().len(), 2);

    let code = app.mailer.last_code_for("alice@nyu.edu").unwrap();
    let response = app
        .post(
            "/auth/verify-email",
            json!({ "email": "alice@nyu.edu", "code": code }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_resend_without_pending_record() {
    let app = TestApp::new();

    let response = app
        .post("/auth/resend-code", json!({ "email": "ghost@nyu.edu" }), None)
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "not_found");
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_delivery_failure_keeps_pending_registration() {
    let app = TestApp::new();
    app.mailer.set_failing(true);

    let response = app
        .post(
            "/auth/register",
            json!({ "username": "alice", "email": "alice@nyu.edu", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["error"], "delivery_failed");
    assert_eq!(response.body["message"], "failed to send verification email");
    assert_eq!(app.store.pending_count().await, 1);

    app.mailer.set_failing(false);
    let response = app
        .post("/auth/resend-code", json!({ "email": "alice@nyu.edu" }), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_conflicts_with_existing_user() {
    let app = TestApp::new();
    app.register_user("alice").await;

    let response = app
        .post(
            "/auth/register",
            json!({ "username": "alice", "email": "other@nyu.edu", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["message"], "username already taken");

    let response = app
        .post(
            "/auth/register",
            json!({ "username": "alice2", "email": "ALICE@nyu.edu", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["message"], "email already registered");
}

#[tokio::test]
async fn test_login_logout_cycle() {
    let app = TestApp::new();
    app.register_user("alice").await;

    let response = app
        .post(
            "/auth/login",
            json!({ "username": "alice", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "ok": true, "msg": "login successful" }));
    let token = response.session_token().unwrap();

    let me = app.get("/auth/me", Some(&token)).await;
    assert_eq!(me.body["user"]["email"], email_for("alice"));

    let response = app.post("/auth/logout", json!({}), Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "ok": true, "msg": "logout successful" }));
    assert!(response.set_cookie().unwrap().contains("Max-Age=0"));
    assert!(response.session_token().is_none());

    let me = app.get("/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert!(me.body["user"].is_null());
}

#[tokio::test]
async fn test_login_failures() {
    let app = TestApp::new();
    app.register_user("alice").await;

    let wrong_password = app
        .post(
            "/auth/login",
            json!({ "username": "alice", "password": "WrongPass123!" }),
            None,
        )
        .await;
    let unknown_user = app
        .post(
            "/auth/login",
            json!({ "username": "mallory", "password": PASSWORD }),
            None,
        )
        .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_user.body);
    assert_eq!(wrong_password.body["message"], "invalid credentials");

    let missing = app
        .post("/auth/login", json!({ "username": "alice" }), None)
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["message"], "missing credentials");
}

#[tokio::test]
async fn test_logout_without_session_still_clears_cookie() {
    let app = TestApp::new();

    let response = app.post("/auth/logout", json!({}), Some("not-a-real-token")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.set_cookie().unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn test_me_without_session() {
    let app = TestApp::new();

    let response = app.get("/auth/me", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "user": null }));
}

#[tokio::test]
async fn test_check_availability() {
    let app = TestApp::new();
    app.register_user("alice").await;

    let response = app
        .post(
            "/auth/check",
            json!({ "username": "alice", "email": "someone@nyu.edu" }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body,
        json!({ "username_available": false, "email_available": true })
    );

    let response = app
        .post("/auth/check", json!({ "email": "ALICE@nyu.edu" }), None)
        .await;
    assert_eq!(response.body, json!({ "email_available": false }));
}

#[tokio::test]
async fn test_resend_is_rate_limited_per_client() {
    let app = TestApp::new();

    for _ in 0..5 {
        let response = app
            .post_from("198.51.100.1", "/auth/resend-code", json!({ "email": "ghost@nyu.edu" }))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    let response = app
        .post_from("198.51.100.1", "/auth/resend-code", json!({ "email": "ghost@nyu.edu" }))
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body["error"], "rate_limit_exceeded");
    let retry_after: u64 = response
        .headers
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 3600);

    // Another client has its own quota
    let response = app
        .post_from("198.51.100.2", "/auth/resend-code", json!({ "email": "ghost@nyu.edu" }))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
