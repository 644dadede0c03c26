//! Row types mapping 1:1 onto SQLite rows. Stringly typed at the SQL
//! boundary; conversion into the `herald-types` domain models happens at
//! the edges, with corrupt values logged rather than panicking.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use herald_types::models::{Notification, NotificationType};

use crate::error::StoreError;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct ConversationRow {
    pub id: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub sent_at: String,
}

#[derive(Debug)]
pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub message: String,
    pub kind: String,
    pub content_redirect: String,
    pub created_at: String,
    pub read: bool,
}

impl NotificationRow {
    pub fn into_notification(self) -> Result<Notification, StoreError> {
        let kind = self.kind.parse::<NotificationType>().map_err(|e| {
            warn!("Corrupt notification kind '{}': {}", self.kind, e);
            StoreError::Unavailable("corrupt notification kind in storage".into())
        })?;

        Ok(Notification {
            id: parse_id("notification id", &self.id)?,
            recipient_id: parse_id("recipient id", &self.recipient_id)?,
            message: self.message,
            kind,
            content_redirect: parse_id("content redirect", &self.content_redirect)?,
            created_at: parse_timestamp(&self.created_at),
            read: self.read,
        })
    }
}

pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}

pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}

/// Parse a stored timestamp. Rows we write carry RFC 3339; rows stamped
/// by a column DEFAULT carry SQLite's own "YYYY-MM-DD HH:MM:SS" (UTC, no
/// zone), so fall back to that before giving up.
pub fn parse_timestamp(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}

/// Parse a stored uuid, surfacing corruption as `Unavailable`.
pub(crate) fn parse_id(field: &'static str, value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| {
        warn!("Corrupt {} '{}': {}", field, value, e);
        StoreError::Unavailable(format!("corrupt {field} in storage"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_sqlite_default_formats() {
        let rfc = parse_timestamp("2026-03-01T09:30:00+00:00");
        assert_eq!(rfc.to_rfc3339(), "2026-03-01T09:30:00+00:00");

        let sqlite = parse_timestamp("2026-03-01 09:30:00");
        assert_eq!(sqlite, rfc);
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_epoch() {
        assert_eq!(parse_timestamp("yesterday-ish"), DateTime::<Utc>::default());
    }
}
