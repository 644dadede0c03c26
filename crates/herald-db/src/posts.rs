use rusqlite::OptionalExtension;

use crate::Database;
use crate::error::StoreError;
use crate::models::{CommentRow, PostRow};

impl Database {
    pub fn create_post(&self, id: &str, author_id: &str, content: &str) -> Result<(), StoreError> {
        if content.trim().is_empty() {
            return Err(StoreError::InvalidInput("post content cannot be empty".into()));
        }

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (id, author_id, content) VALUES (?1, ?2, ?3)",
                (id, author_id, content),
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT p.id, p.author_id, u.username, p.content, p.created_at
                     FROM posts p
                     LEFT JOIN users u ON p.author_id = u.id
                     WHERE p.id = ?1",
                    [id],
                    |row| {
                        Ok(PostRow {
                            id: row.get(0)?,
                            author_id: row.get(1)?,
                            author_username: row
                                .get::<_, Option<String>>(2)?
                                .unwrap_or_else(|| "unknown".to_string()),
                            content: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    /// Author id of a post, for comment notification routing.
    pub fn post_author(&self, post_id: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT author_id FROM posts WHERE id = ?1",
                    [post_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn add_comment(
        &self,
        id: &str,
        post_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        if content.trim().is_empty() {
            return Err(StoreError::InvalidInput("comment content cannot be empty".into()));
        }
        if self.post_author(post_id)?.is_none() {
            return Err(StoreError::NotFound("post"));
        }

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, author_id, content) VALUES (?1, ?2, ?3, ?4)",
                (id, post_id, author_id, content),
            )?;
            Ok(())
        })
    }

    /// Comments on a post, oldest first.
    pub fn comments_on_post(&self, post_id: &str) -> Result<Vec<CommentRow>, StoreError> {
        if self.post_author(post_id)?.is_none() {
            return Err(StoreError::NotFound("post"));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.author_id, u.username, c.content, c.created_at
                 FROM comments c
                 LEFT JOIN users u ON c.author_id = u.id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at ASC, c.rowid ASC",
            )?;
            let rows = stmt
                .query_map([post_id], |row| {
                    Ok(CommentRow {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        author_id: row.get(2)?,
                        author_username: row
                            .get::<_, Option<String>>(3)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::error::StoreError;
    use crate::testutil::{open_test_db, seed_user};

    #[test]
    fn comments_require_an_existing_post() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada").to_string();

        let err = db
            .add_comment(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &ada,
                "hello",
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn post_and_comments_round_trip() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada").to_string();
        let bob = seed_user(&db, "bob").to_string();

        let post_id = Uuid::new_v4().to_string();
        db.create_post(&post_id, &ada, "first post").unwrap();

        assert_eq!(db.post_author(&post_id).unwrap(), Some(ada.clone()));

        db.add_comment(&Uuid::new_v4().to_string(), &post_id, &bob, "nice")
            .unwrap();
        db.add_comment(&Uuid::new_v4().to_string(), &post_id, &ada, "thanks")
            .unwrap();

        let comments = db.comments_on_post(&post_id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].content, "nice");
        assert_eq!(comments[0].author_username, "bob");
    }

    #[test]
    fn empty_content_is_rejected() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada").to_string();

        assert!(matches!(
            db.create_post(&Uuid::new_v4().to_string(), &ada, "  ")
                .unwrap_err(),
            StoreError::InvalidInput(_)
        ));
    }
}
