use axum::{Extension, Json, extract::{Path, Query, State}, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use herald_types::api::{Claims, NotificationPage};
use herald_types::models::Notification;

use crate::AppState;
use crate::error::{ApiError, blocking};

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    50
}

/// GET /notifications?page=&page_size=
///
/// Newest first. Totals count only the caller's notifications; a page
/// past the end comes back empty rather than erroring.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationPage>, ApiError> {
    let db = state.db.clone();
    let recipient = claims.sub.to_string();

    let listing =
        blocking(move || db.list_notifications(&recipient, query.page, query.page_size)).await?;

    let notifications = listing
        .rows
        .into_iter()
        .map(|row| row.into_notification())
        .collect::<Result<Vec<Notification>, _>>()?;

    Ok(Json(NotificationPage {
        page: listing.page,
        total_pages: listing.total_pages,
        total_notifications: listing.total,
        notifications,
    }))
}

/// GET /notifications/{notification_id}
pub async fn get_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    let db = state.db.clone();
    let recipient = claims.sub.to_string();
    let id = notification_id.to_string();

    let row = blocking(move || db.get_notification(&recipient, &id)).await?;
    Ok(Json(row.into_notification()?))
}

/// POST /notifications/{notification_id}/read
///
/// Marks the notification read. Repeating the call is harmless.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let recipient = claims.sub.to_string();
    let id = notification_id.to_string();

    blocking(move || db.mark_notification_read(&recipient, &id)).await?;
    Ok(Json(json!({ "read": true })))
}

/// DELETE /notifications/{notification_id}
pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let recipient = claims.sub.to_string();
    let id = notification_id.to_string();

    blocking(move || db.delete_notification(&recipient, &id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
