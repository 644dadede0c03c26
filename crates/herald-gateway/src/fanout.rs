use std::sync::Arc;

use tokio::task;
use tracing::{debug, warn};
use uuid::Uuid;

use herald_db::{Database, StoreError};
use herald_types::events::GatewayEvent;
use herald_types::models::{Message, Notification, NotificationType};

use crate::registry::PresenceRegistry;

/// Turns triggering actions into durable notifications plus best-effort
/// live events for whoever is connected.
///
/// The notification write is attempted first; its failure is logged and
/// never blocks the live push. Live delivery is at-most-once and a dead
/// connection just means the recipient reads the durable record later.
#[derive(Clone)]
pub struct Fanout {
    db: Arc<Database>,
    registry: PresenceRegistry,
}

impl Fanout {
    pub fn new(db: Arc<Database>, registry: PresenceRegistry) -> Self {
        Self { db, registry }
    }

    /// Fan a freshly appended message out to the other participants:
    /// a durable `message` notification each, plus `new_message` and
    /// `new_notification` events for those connected.
    pub async fn message_sent(&self, message: &Message, sender_username: &str) {
        let recipients = match self
            .recipients_of(message.conversation_id, message.sender)
            .await
        {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(
                    "Fan-out aborted for conversation {}: {}",
                    message.conversation_id, e
                );
                return;
            }
        };

        for recipient in recipients {
            let notification = Notification::new(
                recipient,
                format!("{sender_username} sent you a message"),
                NotificationType::Message,
                message.conversation_id,
            );

            if let Err(e) = self.persist(&notification).await {
                warn!("Failed to store message notification for {}: {}", recipient, e);
            }

            if let Some(conn) = self.registry.lookup(recipient).await {
                let delivered = conn.send(GatewayEvent::NewMessage {
                    conversation_id: message.conversation_id,
                    sender: message.sender,
                    sender_username: sender_username.to_string(),
                    content: message.content.clone(),
                    sent_at: message.sent_at,
                }) && conn.send(GatewayEvent::NewNotification { notification });

                if !delivered {
                    debug!("Live push to {} failed; durable record stands", recipient);
                }
            }
        }
    }

    /// A follow toggle ran. Only the transition into following notifies;
    /// an unfollow is silent.
    pub async fn follow_toggled(
        &self,
        follower_id: Uuid,
        follower_username: &str,
        followed_id: Uuid,
        now_following: bool,
    ) {
        if !now_following {
            return;
        }

        let notification = Notification::new(
            followed_id,
            format!("{follower_username} started following you"),
            NotificationType::Follow,
            follower_id,
        );

        if let Err(e) = self.persist(&notification).await {
            warn!("Failed to store follow notification for {}: {}", followed_id, e);
        }
        self.push_notification(followed_id, notification).await;
    }

    /// A comment landed on a post. Notifies the post's author, unless
    /// they commented on their own post.
    pub async fn comment_created(
        &self,
        commenter_id: Uuid,
        commenter_username: &str,
        post_id: Uuid,
    ) {
        let author = {
            let db = self.db.clone();
            let id = post_id.to_string();
            match task::spawn_blocking(move || db.post_author(&id)).await {
                Ok(Ok(author)) => author,
                Ok(Err(e)) => {
                    warn!("Fan-out aborted for post {}: {}", post_id, e);
                    return;
                }
                Err(e) => {
                    warn!("Fan-out aborted for post {}: join error: {}", post_id, e);
                    return;
                }
            }
        };

        let Some(author) = author else { return };
        let Ok(author_id) = author.parse::<Uuid>() else {
            warn!("Corrupt author id '{}' on post {}", author, post_id);
            return;
        };
        if author_id == commenter_id {
            return;
        }

        let notification = Notification::new(
            author_id,
            format!("{commenter_username} commented on your post"),
            NotificationType::Comment,
            post_id,
        );

        if let Err(e) = self.persist(&notification).await {
            warn!("Failed to store comment notification for {}: {}", author_id, e);
        }
        self.push_notification(author_id, notification).await;
    }

    /// Typing is ephemeral: no durable record, connected participants
    /// only, silently dropped when the sender is not in the conversation.
    pub async fn typing(&self, conversation_id: Uuid, sender: Uuid, sender_username: &str) {
        let Ok(recipients) = self.recipients_of(conversation_id, sender).await else {
            return;
        };

        for recipient in recipients {
            if let Some(conn) = self.registry.lookup(recipient).await {
                conn.send(GatewayEvent::Typing {
                    conversation_id,
                    sender,
                    sender_username: sender_username.to_string(),
                });
            }
        }
    }

    /// Everyone in the conversation except the sender. Errors when the
    /// conversation is unknown or the sender is not in it.
    async fn recipients_of(
        &self,
        conversation_id: Uuid,
        sender: Uuid,
    ) -> Result<Vec<Uuid>, StoreError> {
        let db = self.db.clone();
        let id = conversation_id.to_string();
        let participants = task::spawn_blocking(move || db.participants(&id))
            .await
            .map_err(|e| StoreError::Unavailable(format!("join error: {e}")))??;

        if participants.is_empty() {
            return Err(StoreError::NotFound("conversation"));
        }

        let sender_id = sender.to_string();
        if !participants.iter().any(|p| p == &sender_id) {
            return Err(StoreError::Forbidden("sender is not a participant"));
        }

        Ok(participants
            .into_iter()
            .filter(|p| p != &sender_id)
            .filter_map(|p| match p.parse::<Uuid>() {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Corrupt participant id '{}': {}", p, e);
                    None
                }
            })
            .collect())
    }

    async fn persist(&self, notification: &Notification) -> Result<(), StoreError> {
        let db = self.db.clone();
        let notification = notification.clone();
        task::spawn_blocking(move || db.create_notification(&notification))
            .await
            .map_err(|e| StoreError::Unavailable(format!("join error: {e}")))?
    }

    async fn push_notification(&self, recipient: Uuid, notification: Notification) {
        if let Some(conn) = self.registry.lookup(recipient).await {
            if !conn.send(GatewayEvent::NewNotification { notification }) {
                debug!("Live push to {} failed; durable record stands", recipient);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_types::models::Conversation;
    use tempfile::TempDir;

    fn open_test_db() -> (TempDir, Arc<Database>) {
        let dir = TempDir::new().expect("tempdir");
        let db = Database::open(&dir.path().join("herald.db")).expect("open test db");
        (dir, Arc::new(db))
    }

    fn seed_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), username, "not-a-real-hash")
            .expect("seed user");
        id
    }

    fn conversation_between(db: &Database, users: Vec<Uuid>) -> Uuid {
        db.start_conversation(&Conversation::new(users).unwrap())
            .unwrap()
            .conversation_id
    }

    #[tokio::test]
    async fn message_fanout_reaches_everyone_but_the_sender() {
        let (_dir, db) = open_test_db();
        let registry = PresenceRegistry::new();
        let fanout = Fanout::new(db.clone(), registry.clone());

        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");
        let eve = seed_user(&db, "eve");
        let conversation = conversation_between(&db, vec![ada, bob, eve]);

        let (_ada_conn, mut ada_rx) = registry.register(ada).await;
        let (_bob_conn, mut bob_rx) = registry.register(bob).await;

        let message = Message::new(ada, conversation, "hello".into()).unwrap();
        db.append_message(&message).unwrap();
        fanout.message_sent(&message, "ada").await;

        // bob gets the message event then the notification event
        assert!(matches!(
            bob_rx.recv().await,
            Some(GatewayEvent::NewMessage { ref content, .. }) if content == "hello"
        ));
        assert!(matches!(
            bob_rx.recv().await,
            Some(GatewayEvent::NewNotification { .. })
        ));

        // the sender hears nothing
        assert!(ada_rx.try_recv().is_err());

        // both recipients got durable records, connected or not
        for user in [bob, eve] {
            let listing = db.list_notifications(&user.to_string(), 1, 50).unwrap();
            assert_eq!(listing.total, 1);
            let n = listing.rows.into_iter().next().unwrap().into_notification().unwrap();
            assert_eq!(n.kind, NotificationType::Message);
            assert_eq!(n.content_redirect, conversation);
            assert!(!n.read);
        }
        assert_eq!(db.list_notifications(&ada.to_string(), 1, 50).unwrap().total, 0);
    }

    #[tokio::test]
    async fn follow_cycle_notifies_each_follow_but_never_unfollow() {
        let (_dir, db) = open_test_db();
        let registry = PresenceRegistry::new();
        let fanout = Fanout::new(db.clone(), registry.clone());

        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");

        // follow, unfollow, follow again
        for _ in 0..3 {
            let now_following = db.toggle_follow(&ada.to_string(), &bob.to_string()).unwrap();
            fanout.follow_toggled(ada, "ada", bob, now_following).await;
        }

        let listing = db.list_notifications(&bob.to_string(), 1, 50).unwrap();
        assert_eq!(listing.total, 2);
        for row in listing.rows {
            let n = row.into_notification().unwrap();
            assert_eq!(n.kind, NotificationType::Follow);
            assert_eq!(n.content_redirect, ada);
        }
    }

    #[tokio::test]
    async fn comment_notifies_the_author_but_not_on_self_comments() {
        let (_dir, db) = open_test_db();
        let registry = PresenceRegistry::new();
        let fanout = Fanout::new(db.clone(), registry.clone());

        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");

        let post_id = Uuid::new_v4();
        db.create_post(&post_id.to_string(), &ada.to_string(), "first post")
            .unwrap();

        fanout.comment_created(bob, "bob", post_id).await;
        fanout.comment_created(ada, "ada", post_id).await;

        let listing = db.list_notifications(&ada.to_string(), 1, 50).unwrap();
        assert_eq!(listing.total, 1);
        let n = listing.rows.into_iter().next().unwrap().into_notification().unwrap();
        assert_eq!(n.kind, NotificationType::Comment);
        assert_eq!(n.content_redirect, post_id);
        assert_eq!(n.message, "bob commented on your post");
    }

    #[tokio::test]
    async fn typing_reaches_connected_participants_and_leaves_no_record() {
        let (_dir, db) = open_test_db();
        let registry = PresenceRegistry::new();
        let fanout = Fanout::new(db.clone(), registry.clone());

        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");
        let conversation = conversation_between(&db, vec![ada, bob]);

        let (_bob_conn, mut bob_rx) = registry.register(bob).await;

        fanout.typing(conversation, ada, "ada").await;

        assert!(matches!(
            bob_rx.recv().await,
            Some(GatewayEvent::Typing { conversation_id, .. }) if conversation_id == conversation
        ));
        assert_eq!(db.list_notifications(&bob.to_string(), 1, 50).unwrap().total, 0);
    }

    #[tokio::test]
    async fn typing_from_an_outsider_is_dropped() {
        let (_dir, db) = open_test_db();
        let registry = PresenceRegistry::new();
        let fanout = Fanout::new(db.clone(), registry.clone());

        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");
        let eve = seed_user(&db, "eve");
        let conversation = conversation_between(&db, vec![ada, bob]);

        let (_bob_conn, mut bob_rx) = registry.register(bob).await;

        fanout.typing(conversation, eve, "eve").await;

        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_recipients_still_get_durable_notifications() {
        let (_dir, db) = open_test_db();
        let registry = PresenceRegistry::new();
        let fanout = Fanout::new(db.clone(), registry.clone());

        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");
        let conversation = conversation_between(&db, vec![ada, bob]);

        // nobody is registered
        let message = Message::new(ada, conversation, "while you were out".into()).unwrap();
        db.append_message(&message).unwrap();
        fanout.message_sent(&message, "ada").await;

        let listing = db.list_notifications(&bob.to_string(), 1, 50).unwrap();
        assert_eq!(listing.total, 1);
        assert!(!listing.rows[0].read);
    }
}
