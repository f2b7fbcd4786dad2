/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, verification, login and session endpoints
/// - `messages`: Direct messages between users
/// - `products`: Marketplace listings

pub mod auth;
pub mod health;
pub mod messages;
pub mod products;

use axum::extract::FromRequest;

use crate::error::ApiError;

/// JSON body extractor whose rejections use the API error format
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
