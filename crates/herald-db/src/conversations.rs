use rusqlite::OptionalExtension;
use rusqlite::types::ToSql;
use uuid::Uuid;

use herald_types::models::Conversation;

use crate::Database;
use crate::error::{StoreError, is_unique_violation};
use crate::models::{ConversationRow, parse_id};

/// Outcome of a start-conversation call: the id to use, and whether it
/// belonged to a conversation that already existed for this participant
/// set.
#[derive(Debug)]
pub struct StartOutcome {
    pub conversation_id: Uuid,
    pub existing: bool,
}

impl Database {
    /// Start a conversation, unless one with the same unordered
    /// participant set already exists, in which case that one is
    /// returned.
    ///
    /// Dedup is anchored on the UNIQUE participant_key column: two racing
    /// calls with the same set both end up holding the same id, because
    /// the loser's insert bounces and it re-reads the winner.
    pub fn start_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<StartOutcome, StoreError> {
        let participant_ids: Vec<String> = conversation
            .participants
            .iter()
            .map(Uuid::to_string)
            .collect();
        self.ensure_users_exist(&participant_ids)?;

        let key = conversation.participant_key();

        if let Some(existing) = self.conversation_id_by_key(&key)? {
            return Ok(StartOutcome {
                conversation_id: existing,
                existing: true,
            });
        }

        let id = conversation.id.to_string();
        let inserted = self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let inserted = match tx.execute(
                "INSERT INTO conversations (id, participant_key, created_at) VALUES (?1, ?2, ?3)",
                (&id, &key, &conversation.created_at.to_rfc3339()),
            ) {
                Ok(_) => true,
                // lost the race; the concurrent insert with this key wins
                Err(e) if is_unique_violation(&e) => false,
                Err(e) => return Err(e.into()),
            };

            if inserted {
                for user_id in &participant_ids {
                    tx.execute(
                        "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
                        (&id, user_id),
                    )?;
                }
            }

            tx.commit()?;
            Ok(inserted)
        })?;

        if inserted {
            Ok(StartOutcome {
                conversation_id: conversation.id,
                existing: false,
            })
        } else {
            let winner = self
                .conversation_id_by_key(&key)?
                .ok_or_else(|| StoreError::Unavailable("conversation vanished during dedup".into()))?;
            Ok(StartOutcome {
                conversation_id: winner,
                existing: true,
            })
        }
    }

    fn conversation_id_by_key(&self, key: &str) -> Result<Option<Uuid>, StoreError> {
        let id: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id FROM conversations WHERE participant_key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        id.as_deref()
            .map(|s| parse_id("conversation id", s))
            .transpose()
    }

    /// Participant ids of a conversation, in the order they were listed
    /// at creation. Empty means the conversation does not exist.
    pub fn participants(&self, conversation_id: &str) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM conversation_participants
                 WHERE conversation_id = ?1
                 ORDER BY rowid ASC",
            )?;
            let ids = stmt
                .query_map([conversation_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// (conversation_id, user_id) pairs for a batch of conversations, so
    /// a listing does not need one query per conversation.
    pub fn participants_for_conversations(
        &self,
        conversation_ids: &[String],
    ) -> Result<Vec<(String, String)>, StoreError> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=conversation_ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT conversation_id, user_id FROM conversation_participants
                 WHERE conversation_id IN ({})
                 ORDER BY conversation_id, rowid ASC",
                placeholders.join(", ")
            );

            let params: Vec<&dyn ToSql> =
                conversation_ids.iter().map(|id| id as &dyn ToSql).collect();
            let mut stmt = conn.prepare(&sql)?;
            let pairs = stmt
                .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(pairs)
        })
    }

    /// A single conversation plus its participants. The requestor must be
    /// one of them.
    pub fn get_conversation(
        &self,
        requestor_id: &str,
        conversation_id: &str,
    ) -> Result<(ConversationRow, Vec<String>), StoreError> {
        let row = self
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, created_at FROM conversations WHERE id = ?1",
                        [conversation_id],
                        |row| {
                            Ok(ConversationRow {
                                id: row.get(0)?,
                                created_at: row.get(1)?,
                            })
                        },
                    )
                    .optional()?)
            })?
            .ok_or(StoreError::NotFound("conversation"))?;

        let participants = self.participants(conversation_id)?;
        if !participants.iter().any(|p| p == requestor_id) {
            return Err(StoreError::Forbidden(
                "only participants can read a conversation",
            ));
        }

        Ok((row, participants))
    }

    /// Conversations the user participates in, oldest first.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.created_at
                 FROM conversations c
                 JOIN conversation_participants cp ON cp.conversation_id = c.id
                 WHERE cp.user_id = ?1
                 ORDER BY c.created_at ASC, c.rowid ASC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete a conversation and, through the FK cascade, its
    /// participants and messages. Returns how many messages went with it.
    pub fn delete_conversation(
        &self,
        requestor_id: &str,
        conversation_id: &str,
    ) -> Result<u64, StoreError> {
        let participants = self.participants(conversation_id)?;
        if participants.is_empty() {
            return Err(StoreError::NotFound("conversation"));
        }
        if !participants.iter().any(|p| p == requestor_id) {
            return Err(StoreError::Forbidden(
                "only participants can delete a conversation",
            ));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let removed: i64 = tx.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?;
            let deleted = tx.execute(
                "DELETE FROM conversations WHERE id = ?1",
                [conversation_id],
            )?;

            tx.commit()?;

            if deleted == 0 {
                return Err(StoreError::NotFound("conversation"));
            }
            Ok(removed as u64)
        })
    }
}
