use herald_types::models::Message;

use crate::Database;
use crate::error::StoreError;
use crate::models::MessageRow;

impl Database {
    /// Append a message to its conversation's log. The conversation must
    /// exist and the sender must be a participant.
    pub fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let conversation_id = message.conversation_id.to_string();
        let sender_id = message.sender.to_string();

        let participants = self.participants(&conversation_id)?;
        if participants.is_empty() {
            return Err(StoreError::NotFound("conversation"));
        }
        if !participants.iter().any(|p| p == &sender_id) {
            return Err(StoreError::Forbidden(
                "only participants can message a conversation",
            ));
        }

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (conversation_id, sender_id, content, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    &conversation_id,
                    &sender_id,
                    &message.content,
                    &message.sent_at.to_rfc3339(),
                ),
            )?;
            Ok(())
        })
    }

    /// The full thread, oldest first; rowid breaks sent_at ties so
    /// ordering is stable. The requestor must be a participant.
    pub fn read_thread(
        &self,
        conversation_id: &str,
        requestor_id: &str,
    ) -> Result<Vec<MessageRow>, StoreError> {
        let participants = self.participants(conversation_id)?;
        if participants.is_empty() {
            return Err(StoreError::NotFound("conversation"));
        }
        if !participants.iter().any(|p| p == requestor_id) {
            return Err(StoreError::Forbidden(
                "only participants can read a conversation",
            ));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.conversation_id, m.sender_id, u.username, m.content, m.sent_at
                 FROM messages m
                 LEFT JOIN users u ON m.sender_id = u.id
                 WHERE m.conversation_id = ?1
                 ORDER BY m.sent_at ASC, m.rowid ASC",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(MessageRow {
                        conversation_id: row.get(0)?,
                        sender_id: row.get(1)?,
                        sender_username: row
                            .get::<_, Option<String>>(2)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        content: row.get(3)?,
                        sent_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use herald_types::models::{Conversation, Message};
    use uuid::Uuid;

    use crate::Database;
    use crate::error::StoreError;
    use crate::testutil::{open_test_db, seed_user};

    fn conversation_between(db: &Database, a: Uuid, b: Uuid) -> Uuid {
        db.start_conversation(&Conversation::new(vec![a, b]).unwrap())
            .unwrap()
            .conversation_id
    }

    #[test]
    fn thread_reads_back_oldest_first() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");
        let id = conversation_between(&db, ada, bob);

        for content in ["first", "second", "third"] {
            db.append_message(&Message::new(ada, id, content.into()).unwrap())
                .unwrap();
        }

        let thread = db.read_thread(&id.to_string(), &bob.to_string()).unwrap();
        let contents: Vec<&str> = thread.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);

        for pair in thread.windows(2) {
            assert!(pair[0].sent_at <= pair[1].sent_at);
        }
    }

    #[test]
    fn outsiders_cannot_append_or_read() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");
        let eve = seed_user(&db, "eve");
        let id = conversation_between(&db, ada, bob);

        assert!(matches!(
            db.append_message(&Message::new(eve, id, "hi".into()).unwrap())
                .unwrap_err(),
            StoreError::Forbidden(_)
        ));
        assert!(matches!(
            db.read_thread(&id.to_string(), &eve.to_string()).unwrap_err(),
            StoreError::Forbidden(_)
        ));
    }

    #[test]
    fn unknown_conversation_is_not_found() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");

        let err = db
            .append_message(&Message::new(ada, Uuid::new_v4(), "hi".into()).unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn sender_username_is_joined_in() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");
        let id = conversation_between(&db, ada, bob);

        db.append_message(&Message::new(ada, id, "hello".into()).unwrap())
            .unwrap();

        let thread = db.read_thread(&id.to_string(), &ada.to_string()).unwrap();
        assert_eq!(thread[0].sender_username, "ada");
    }
}
