use axum::{Extension, Json, extract::{Path, State}};
use tracing::info;
use uuid::Uuid;

use herald_db::StoreError;
use herald_db::models::parse_timestamp;
use herald_types::api::{Claims, FollowResponse, UserResponse};

use crate::AppState;
use crate::error::{ApiError, blocking};

/// GET /users/{user_id}
pub async fn get_user(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let db = state.db.clone();
    let id = user_id.to_string();
    let user = blocking(move || {
        db.get_user_by_id(&id)?.ok_or(StoreError::NotFound("user"))
    })
    .await?;

    Ok(Json(UserResponse {
        id: user_id,
        username: user.username,
        created_at: parse_timestamp(&user.created_at),
    }))
}

/// POST /users/{user_id}/follow
///
/// Toggles the follow edge. Only the transition into following produces
/// a notification; unfollowing is silent.
pub async fn toggle_follow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<FollowResponse>, ApiError> {
    let db = state.db.clone();
    let follower = claims.sub.to_string();
    let followed = user_id.to_string();
    let following = blocking(move || db.toggle_follow(&follower, &followed)).await?;

    info!(
        "{} {} {}",
        claims.username,
        if following { "followed" } else { "unfollowed" },
        user_id
    );

    state
        .fanout
        .follow_toggled(claims.sub, &claims.username, user_id, following)
        .await;

    Ok(Json(FollowResponse { user_id, following }))
}
