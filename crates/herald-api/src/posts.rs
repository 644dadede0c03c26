use axum::{Extension, Json, extract::{Path, State}, http::StatusCode, response::IntoResponse};
use tracing::warn;
use uuid::Uuid;

use herald_db::StoreError;
use herald_db::models::parse_timestamp;
use herald_types::api::{
    AddCommentRequest, Claims, CommentResponse, CreatePostRequest, PostResponse,
};

use crate::AppState;
use crate::error::{ApiError, blocking};

/// POST /posts
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = Uuid::new_v4();
    let db = state.db.clone();
    let author = claims.sub.to_string();
    let content = req.content.clone();

    blocking(move || db.create_post(&post_id.to_string(), &author, &content)).await?;

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            id: post_id,
            author_id: claims.sub,
            author_username: claims.username,
            content: req.content,
            created_at: chrono::Utc::now(),
        }),
    ))
}

/// GET /posts/{post_id}
pub async fn get_post(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<PostResponse>, ApiError> {
    let db = state.db.clone();
    let id = post_id.to_string();

    let post = blocking(move || db.get_post(&id)?.ok_or(StoreError::NotFound("post"))).await?;

    let author_id = post.author_id.parse().map_err(|_| {
        warn!("Corrupt author id '{}' on post {}", post.author_id, post_id);
        ApiError::Internal
    })?;

    Ok(Json(PostResponse {
        id: post_id,
        author_id,
        author_username: post.author_username,
        content: post.content,
        created_at: parse_timestamp(&post.created_at),
    }))
}

/// POST /posts/{post_id}/comments
///
/// Stores the comment, then notifies the post's author through the
/// fan-out engine (which skips self-comments).
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<AddCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment_id = Uuid::new_v4();
    let db = state.db.clone();
    let author = claims.sub.to_string();
    let content = req.content.clone();
    let id = post_id.to_string();

    blocking(move || db.add_comment(&comment_id.to_string(), &id, &author, &content)).await?;

    state
        .fanout
        .comment_created(claims.sub, &claims.username, post_id)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            id: comment_id,
            post_id,
            author_id: claims.sub,
            author_username: claims.username,
            content: req.content,
            created_at: chrono::Utc::now(),
        }),
    ))
}

/// GET /posts/{post_id}/comments
pub async fn list_comments(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let db = state.db.clone();
    let id = post_id.to_string();

    let rows = blocking(move || db.comments_on_post(&id)).await?;

    let comments = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.parse::<Uuid>();
            let author_id = row.author_id.parse::<Uuid>();
            match (id, author_id) {
                (Ok(id), Ok(author_id)) => Some(CommentResponse {
                    id,
                    post_id,
                    author_id,
                    author_username: row.author_username,
                    content: row.content,
                    created_at: parse_timestamp(&row.created_at),
                }),
                _ => {
                    warn!("Corrupt comment row {} on post {}", row.id, post_id);
                    None
                }
            }
        })
        .collect();

    Ok(Json(comments))
}
