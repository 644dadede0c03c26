use std::collections::HashMap;

use axum::{Extension, Json, extract::{Path, State}, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};
use uuid::Uuid;

use herald_db::StoreError;
use herald_db::models::parse_timestamp;
use herald_types::api::{
    Claims, ConversationResponse, DeleteConversationResponse, StartConversationRequest,
    StartConversationResponse,
};
use herald_types::models::Conversation;

use crate::AppState;
use crate::error::{ApiError, blocking};

/// POST /conversations
///
/// The caller is always included in the participant set, so a client
/// only needs to name the people it wants to talk to. Starting an
/// already-existing set returns that conversation with 200 instead of
/// creating a duplicate.
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut participants = req.participants;
    participants.push(claims.sub);

    let conversation = Conversation::new(participants).map_err(StoreError::from)?;

    let db = state.db.clone();
    let outcome = blocking(move || db.start_conversation(&conversation)).await?;

    if !outcome.existing {
        info!(
            "{} started conversation {}",
            claims.username, outcome.conversation_id
        );
    }

    let status = if outcome.existing {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(StartConversationResponse {
            conversation_id: outcome.conversation_id,
            existing: outcome.existing,
        }),
    ))
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub.to_string();

    let (rows, participant_pairs) = blocking(move || {
        let rows = db.list_conversations(&user_id)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let pairs = db.participants_for_conversations(&ids)?;
        Ok::<_, StoreError>((rows, pairs))
    })
    .await?;

    let mut participants_by_conversation: HashMap<String, Vec<Uuid>> = HashMap::new();
    for (conversation_id, user_id) in participant_pairs {
        match user_id.parse::<Uuid>() {
            Ok(id) => participants_by_conversation
                .entry(conversation_id)
                .or_default()
                .push(id),
            Err(e) => warn!("Corrupt participant id '{}': {}", user_id, e),
        }
    }

    let conversations = rows
        .into_iter()
        .filter_map(|row| match row.id.parse::<Uuid>() {
            Ok(id) => Some(ConversationResponse {
                id,
                participants: participants_by_conversation.remove(&row.id).unwrap_or_default(),
                created_at: parse_timestamp(&row.created_at),
            }),
            Err(e) => {
                warn!("Corrupt conversation id '{}': {}", row.id, e);
                None
            }
        })
        .collect();

    Ok(Json(conversations))
}

/// GET /conversations/{conversation_id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let db = state.db.clone();
    let requestor = claims.sub.to_string();
    let id = conversation_id.to_string();

    let (row, participants) = blocking(move || db.get_conversation(&requestor, &id)).await?;

    let participants = participants
        .into_iter()
        .filter_map(|p| match p.parse::<Uuid>() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Corrupt participant id '{}': {}", p, e);
                None
            }
        })
        .collect();

    Ok(Json(ConversationResponse {
        id: conversation_id,
        participants,
        created_at: parse_timestamp(&row.created_at),
    }))
}

/// DELETE /conversations/{conversation_id}
///
/// Removes the conversation and its whole message log; the response says
/// how many messages went with it.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<DeleteConversationResponse>, ApiError> {
    let db = state.db.clone();
    let requestor = claims.sub.to_string();
    let id = conversation_id.to_string();

    let messages_removed = blocking(move || db.delete_conversation(&requestor, &id)).await?;

    info!(
        "{} deleted conversation {} ({} messages)",
        claims.username, conversation_id, messages_removed
    );

    Ok(Json(DeleteConversationResponse {
        deleted: true,
        messages_removed,
    }))
}
