use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Notification;

/// JWT claims. Canonical definition, shared by the REST middleware and
/// the gateway upgrade handler so both sides agree on the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub username: String,
    /// Expiry, seconds since the epoch.
    pub exp: usize,
}

// ── auth ──

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// ── users ──

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub user_id: Uuid,
    /// True when the toggle landed on "following".
    pub following: bool,
}

// ── conversations ──

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartConversationRequest {
    /// The caller is added automatically and does not need to list
    /// themselves.
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StartConversationResponse {
    pub conversation_id: Uuid,
    /// True when a conversation with this participant set already existed
    /// and was returned instead of a new one.
    pub existing: bool,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeleteConversationResponse {
    pub deleted: bool,
    /// How many messages went down with the conversation.
    pub messages_removed: u64,
}

// ── messages ──

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub conversation_id: Uuid,
    pub sender: Uuid,
    pub sender_username: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

// ── notifications ──

#[derive(Debug, Serialize)]
pub struct NotificationPage {
    pub page: u32,
    pub total_pages: u32,
    pub total_notifications: u64,
    pub notifications: Vec<Notification>,
}

// ── posts and comments ──

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
