use rusqlite::OptionalExtension;
use rusqlite::types::ToSql;

use crate::Database;
use crate::error::{StoreError, is_unique_violation};
use crate::models::UserRow;

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            match conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            ) {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    Err(StoreError::Conflict("username is already taken"))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, username, password, created_at FROM users WHERE username = ?1",
                    [username],
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            password: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, username, password, created_at FROM users WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            password: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    /// Confirm every id references an existing user.
    pub fn ensure_users_exist(&self, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT COUNT(DISTINCT id) FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let params: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
            let found: i64 = conn.query_row(&sql, params.as_slice(), |row| row.get(0))?;

            if (found as usize) != ids.len() {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    /// Toggle the follow edge follower -> followed. Returns true when the
    /// edge now exists (a follow), false when it was removed (an
    /// unfollow).
    pub fn toggle_follow(&self, follower_id: &str, followed_id: &str) -> Result<bool, StoreError> {
        if follower_id == followed_id {
            return Err(StoreError::InvalidInput("you cannot follow yourself".into()));
        }

        self.with_conn_mut(|conn| {
            let followed_exists: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [followed_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if followed_exists.is_none() {
                return Err(StoreError::NotFound("user"));
            }

            let existing: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                    (follower_id, followed_id),
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                conn.execute(
                    "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                    (follower_id, followed_id),
                )?;
                Ok(false)
            } else {
                conn.execute(
                    "INSERT INTO follows (follower_id, followed_id) VALUES (?1, ?2)",
                    (follower_id, followed_id),
                )?;
                Ok(true)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::testutil::{open_test_db, seed_user};

    #[test]
    fn duplicate_username_conflicts() {
        let (_dir, db) = open_test_db();
        seed_user(&db, "ada");

        let err = db
            .create_user(&uuid::Uuid::new_v4().to_string(), "ada", "hash")
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn toggle_follow_flips_the_edge() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada").to_string();
        let bob = seed_user(&db, "bob").to_string();

        assert!(db.toggle_follow(&ada, &bob).unwrap());
        assert!(!db.toggle_follow(&ada, &bob).unwrap());
        assert!(db.toggle_follow(&ada, &bob).unwrap());
    }

    #[test]
    fn follow_rejects_self_and_unknown_targets() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada").to_string();

        assert!(matches!(
            db.toggle_follow(&ada, &ada).unwrap_err(),
            StoreError::InvalidInput(_)
        ));
        assert!(matches!(
            db.toggle_follow(&ada, &uuid::Uuid::new_v4().to_string())
                .unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn ensure_users_exist_spots_missing_ids() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada").to_string();

        db.ensure_users_exist(&[ada.clone()]).unwrap();

        let missing = vec![ada, uuid::Uuid::new_v4().to_string()];
        assert!(matches!(
            db.ensure_users_exist(&missing).unwrap_err(),
            StoreError::NotFound(_)
        ));
    }
}
