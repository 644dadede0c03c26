use axum::{Extension, Json, extract::{Path, State}, http::StatusCode, response::IntoResponse};
use tracing::warn;
use uuid::Uuid;

use herald_db::StoreError;
use herald_db::models::parse_timestamp;
use herald_types::api::{Claims, MessageResponse, SendMessageRequest};
use herald_types::models::Message;

use crate::AppState;
use crate::error::{ApiError, blocking};

/// POST /conversations/{conversation_id}/messages
///
/// Appends to the thread, then fans out to the other participants. The
/// append is the authoritative effect; fan-out trouble is logged, never
/// surfaced, so a sent message is never reported as failed once stored.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = Message::new(claims.sub, conversation_id, req.content).map_err(StoreError::from)?;

    let db = state.db.clone();
    let stored = message.clone();
    blocking(move || db.append_message(&stored)).await?;

    state.fanout.message_sent(&message, &claims.username).await;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            conversation_id,
            sender: claims.sub,
            sender_username: claims.username,
            content: message.content,
            sent_at: message.sent_at,
        }),
    ))
}

/// GET /conversations/{conversation_id}/messages
///
/// The whole thread, oldest first.
pub async fn read_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let db = state.db.clone();
    let requestor = claims.sub.to_string();
    let id = conversation_id.to_string();

    let rows = blocking(move || db.read_thread(&id, &requestor)).await?;

    let messages = rows
        .into_iter()
        .filter_map(|row| match row.sender_id.parse::<Uuid>() {
            Ok(sender) => Some(MessageResponse {
                conversation_id,
                sender,
                sender_username: row.sender_username,
                content: row.content,
                sent_at: parse_timestamp(&row.sent_at),
            }),
            Err(e) => {
                warn!("Corrupt sender id '{}': {}", row.sender_id, e);
                None
            }
        })
        .collect();

    Ok(Json(messages))
}
