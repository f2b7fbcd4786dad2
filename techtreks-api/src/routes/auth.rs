/// Authentication endpoints
///
/// Registration is a two-step flow: `register` stages the account and emails
/// a 4-digit code, `verify-email` checks the code and creates the user. Login
/// sessions live in the `techtreks_session` cookie.
///
/// # Endpoints
///
/// - `POST /auth/register` - Stage a registration and email its code
/// - `POST /auth/verify-email` - Confirm the code, create the user, log in
/// - `POST /auth/resend-code` - Issue a fresh code for a pending registration
/// - `POST /auth/login` - Open a session
/// - `POST /auth/logout` - Close the session
/// - `GET  /auth/me` - Current user, or null
/// - `POST /auth/check` - Username/email availability

use crate::{
    app::AppState,
    error::ApiResult,
    middleware::session::{session_headers, Session},
    routes::ApiJson,
};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use techtreks_shared::{auth::session::Availability, models::user::PublicUser};
use validator::Validate;

/// Register request
///
/// Missing fields deserialize as empty and are reported by the registration
/// rules.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    #[validate(length(max = 254, message = "email must be at most 254 characters"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(max = 1024, message = "password must be at most 1024 characters"))]
    pub password: String,
}

/// Verify-email request
#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub code: String,
}

/// Resend-code request
#[derive(Debug, Deserialize)]
pub struct ResendCodeRequest {
    #[serde(default)]
    pub email: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(max = 254, message = "username must be at most 254 characters"))]
    pub username: String,

    #[serde(default)]
    #[validate(length(max = 1024, message = "password must be at most 1024 characters"))]
    pub password: String,
}

/// Availability request; either field may be omitted
#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
    pub msg: &'static str,
}

impl OkResponse {
    pub(crate) fn new(msg: &'static str) -> Self {
        Self { ok: true, msg }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub ok: bool,
    pub msg: &'static str,

    /// Normalised address the code was sent to
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyEmailResponse {
    pub ok: bool,
    pub msg: &'static str,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: Option<PublicUser>,
}

/// Stage a registration
///
/// # Endpoint
///
/// ```text
/// POST /auth/register
/// Content-Type: application/json
///
/// { "username": "john.doe", "email": "jd1234@nyu.edu", "password": "SecurePass123!" }
/// ```
///
/// # Response (201)
///
/// ```json
/// { "ok": true, "msg": "verification code sent to email", "email": "jd1234@nyu.edu" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `409 Conflict`: Username or email already registered
/// - `500 Internal Server Error`: Verification email could not be sent
pub async fn register(
    State(state): State<AppState>,
    Session(ctx): Session,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    req.validate()?;

    let started = state
        .registration
        .start(&ctx, &req.username, &req.email, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            ok: true,
            msg: "verification code sent to email",
            email: started.email,
        }),
    ))
}

/// Confirm a verification code
///
/// On success the user is created and logged in: the response carries a
/// `Set-Cookie` for the new session.
///
/// # Errors
///
/// - `400 Bad Request`: Email or code missing
/// - `401 Unauthorized`: Wrong code (with `remaining_attempts`) or expired code
/// - `404 Not Found`: No pending verification for this email
/// - `409 Conflict`: Username or email taken in the meantime
/// - `429 Too Many Requests`: Attempts used up; the registration is discarded
pub async fn verify_email(
    State(state): State<AppState>,
    Session(ctx): Session,
    ApiJson(req): ApiJson<VerifyEmailRequest>,
) -> ApiResult<(axum::http::HeaderMap, Json<VerifyEmailResponse>)> {
    let confirmed = state
        .registration
        .confirm(&ctx, &req.email, &req.code)
        .await?;

    let headers = session_headers(
        &confirmed.session,
        ctx.now,
        state.config.auth.session_cookie_secure,
    )?;

    Ok((
        headers,
        Json(VerifyEmailResponse {
            ok: true,
            msg: "email verified and account created",
            user: confirmed.user,
        }),
    ))
}

/// Send a fresh code for a pending registration
///
/// Resets the 10-minute window and the attempt counter.
///
/// # Errors
///
/// - `400 Bad Request`: Email missing
/// - `404 Not Found`: No pending verification for this email
/// - `500 Internal Server Error`: Verification email could not be sent
pub async fn resend_code(
    State(state): State<AppState>,
    Session(ctx): Session,
    ApiJson(req): ApiJson<ResendCodeRequest>,
) -> ApiResult<Json<OkResponse>> {
    state.registration.resend(&ctx, &req.email).await?;

    Ok(Json(OkResponse::new("new verification code sent")))
}

/// Log in with username and password
///
/// # Errors
///
/// - `400 Bad Request`: Username or password missing
/// - `401 Unauthorized`: Unknown username or wrong password (same answer for both)
pub async fn login(
    State(state): State<AppState>,
    Session(ctx): Session,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<(axum::http::HeaderMap, Json<OkResponse>)> {
    req.validate()?;

    let command = state
        .authenticator
        .login(&ctx, &req.username, &req.password)
        .await?;

    let headers = session_headers(&command, ctx.now, state.config.auth.session_cookie_secure)?;
    Ok((headers, Json(OkResponse::new("login successful"))))
}

/// Log out; always succeeds and always clears the cookie
pub async fn logout(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<(axum::http::HeaderMap, Json<OkResponse>)> {
    let command = state.authenticator.logout(&ctx).await;

    let headers = session_headers(&command, ctx.now, state.config.auth.session_cookie_secure)?;
    Ok((headers, Json(OkResponse::new("logout successful"))))
}

/// Current user
///
/// ```json
/// { "user": { "id": "…", "username": "john.doe", "email": "jd1234@nyu.edu" } }
/// ```
///
/// `user` is `null` without a valid session.
pub async fn me(State(state): State<AppState>, Session(ctx): Session) -> ApiResult<Json<MeResponse>> {
    let user = state.authenticator.current_user(&ctx).await?;
    Ok(Json(MeResponse { user }))
}

/// Username and/or email availability
///
/// Only the fields that were asked about appear in the response.
pub async fn check(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CheckRequest>,
) -> ApiResult<Json<Availability>> {
    let availability = state
        .authenticator
        .check_availability(req.username.as_deref(), req.email.as_deref())
        .await?;

    Ok(Json(availability))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_tolerates_missing_fields() {
        let req: RegisterRequest = serde_json::from_str(r#"{"email": "a@nyu.edu"}"#).unwrap();
        assert_eq!(req.email, "a@nyu.edu");
        assert!(req.username.is_empty());
        assert!(req.password.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_oversized_password_is_rejected_before_hashing() {
        let req = LoginRequest {
            username: "john".to_string(),
            password: "x".repeat(1025),
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn test_ok_response_shape() {
        let json = serde_json::to_value(OkResponse::new("login successful")).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true, "msg": "login successful"}));
    }
}
