use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A domain value could not be built from the given inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Canonical identity of a participant set: the ids sorted and joined,
/// so the same set of users always produces the same key regardless of
/// the order they were listed in.
pub fn participant_key(participants: &[Uuid]) -> String {
    let mut ids: Vec<String> = participants.iter().map(Uuid::to_string).collect();
    ids.sort();
    ids.join(":")
}

/// A set of users allowed to exchange messages.
///
/// Built through [`Conversation::new`], which enforces the participant
/// rules, so any value of this type is well formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Distinct participants, first occurrence order preserved.
    pub participants: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Build a conversation from a participant list.
    ///
    /// Duplicate ids collapse (first occurrence wins); fewer than two
    /// distinct participants is an error.
    pub fn new(participants: Vec<Uuid>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        let distinct: Vec<Uuid> = participants
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();

        if distinct.len() < 2 {
            return Err(ValidationError(
                "a conversation needs at least two distinct participants".into(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            participants: distinct,
            created_at: Utc::now(),
        })
    }

    /// Order-independent identity of this conversation's participant set.
    pub fn participant_key(&self) -> String {
        participant_key(&self.participants)
    }
}

/// One entry in a conversation's append-only log.
///
/// Messages carry no id of their own. Their identity is their place in
/// the thread: ordered by `sent_at`, with storage insertion order
/// breaking ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: Uuid,
    pub conversation_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Build a message, stamping `sent_at` with the current time.
    pub fn new(sender: Uuid, conversation_id: Uuid, content: String) -> Result<Self, ValidationError> {
        if content.trim().is_empty() {
            return Err(ValidationError("message content cannot be empty".into()));
        }

        Ok(Self {
            sender,
            conversation_id,
            content,
            sent_at: Utc::now(),
        })
    }
}

/// The closed set of actions that produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Follow,
    Message,
    Comment,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Follow => "follow",
            NotificationType::Message => "message",
            NotificationType::Comment => "comment",
        }
    }
}

impl FromStr for NotificationType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "follow" => Ok(NotificationType::Follow),
            "message" => Ok(NotificationType::Message),
            "comment" => Ok(NotificationType::Comment),
            other => Err(ValidationError(format!("unknown notification kind: {other}"))),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable record of something that happened for a user, kept so it
/// survives the recipient being offline at the time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    /// Human-readable text, e.g. "ada sent you a message".
    pub message: String,
    pub kind: NotificationType,
    /// What the notification points back at: the conversation for a
    /// message, the follower for a follow, the post for a comment.
    pub content_redirect: Uuid,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    /// Build an unread notification with a fresh id.
    pub fn new(
        recipient_id: Uuid,
        message: String,
        kind: NotificationType,
        content_redirect: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            message,
            kind,
            content_redirect,
            created_at: Utc::now(),
            read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_requires_two_distinct_participants() {
        let a = Uuid::new_v4();

        assert!(Conversation::new(vec![a]).is_err());
        assert!(Conversation::new(vec![a, a, a]).is_err());
        assert!(Conversation::new(vec![]).is_err());
    }

    #[test]
    fn conversation_collapses_duplicates_keeping_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let conversation = Conversation::new(vec![a, b, a, c, b]).unwrap();
        assert_eq!(conversation.participants, vec![a, b, c]);
    }

    #[test]
    fn participant_key_ignores_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        assert_eq!(participant_key(&[a, b, c]), participant_key(&[c, a, b]));
        assert_ne!(participant_key(&[a, b]), participant_key(&[a, c]));
    }

    #[test]
    fn message_rejects_empty_content() {
        let sender = Uuid::new_v4();
        let conversation = Uuid::new_v4();

        assert!(Message::new(sender, conversation, String::new()).is_err());
        assert!(Message::new(sender, conversation, "   ".into()).is_err());
        assert!(Message::new(sender, conversation, "hi".into()).is_ok());
    }

    #[test]
    fn notification_starts_unread() {
        let n = Notification::new(
            Uuid::new_v4(),
            "ada sent you a message".into(),
            NotificationType::Message,
            Uuid::new_v4(),
        );
        assert!(!n.read);
    }

    #[test]
    fn notification_kind_round_trips_through_str() {
        for kind in [
            NotificationType::Follow,
            NotificationType::Message,
            NotificationType::Comment,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationType>().unwrap(), kind);
        }
        assert!("reaction".parse::<NotificationType>().is_err());
    }
}
