/// Direct messaging endpoints
///
/// Both endpoints require a session. The sender of a message is always the
/// logged-in user.
///
/// # Endpoints
///
/// - `POST /messages` - Send a message
/// - `GET  /messages?with=<user id or username>` - Conversation with one user, oldest first

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::session::Session,
    routes::ApiJson,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use techtreks_shared::models::message::Message;
use uuid::Uuid;

/// Send-message request
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: Option<Uuid>,

    #[serde(default)]
    pub body: String,
}

/// Conversation query
#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default)]
    pub with: String,
}

/// Send a message to another user
///
/// # Response (201)
///
/// ```json
/// {
///   "id": "…",
///   "sender_id": "…",
///   "recipient_id": "…",
///   "body": "Is the desk still available?",
///   "created_at": "2024-03-01T12:00:00Z"
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing recipient or body outside 1-2000 characters
/// - `401 Unauthorized`: Not logged in
/// - `404 Not Found`: Unknown recipient
pub async fn send_message(
    State(state): State<AppState>,
    Session(ctx): Session,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let sender = state.authenticator.require_user(&ctx).await?;

    let recipient_id = req
        .recipient_id
        .ok_or_else(|| ApiError::BadRequest("recipient_id is required".to_string()))?;

    let message = state
        .messaging
        .send(&sender, recipient_id, &req.body, ctx.now)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Every message between the caller and one other user
///
/// # Errors
///
/// - `400 Bad Request`: `with` missing
/// - `401 Unauthorized`: Not logged in
/// - `404 Not Found`: Unknown user
pub async fn conversation(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let me = state.authenticator.require_user(&ctx).await?;

    let messages = state.messaging.conversation(&me, &query.with).await?;
    Ok(Json(messages))
}
