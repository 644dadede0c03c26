use rusqlite::OptionalExtension;

use herald_types::models::Notification;

use crate::Database;
use crate::error::{StoreError, is_unique_violation};
use crate::models::NotificationRow;

/// Upper bound on client-supplied page sizes.
const MAX_PAGE_SIZE: u32 = 200;

/// One page of a recipient's notifications plus the totals that drive
/// pagination. Totals count only this recipient's rows.
pub struct NotificationListing {
    pub page: u32,
    pub total_pages: u32,
    pub total: u64,
    pub rows: Vec<NotificationRow>,
}

impl Database {
    /// Insert a notification. Ids are expected to be fresh per event, so
    /// a collision is rejected and the stored row stays untouched.
    pub fn create_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            match conn.execute(
                "INSERT INTO notifications (id, recipient_id, message, kind, content_redirect, created_at, read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    notification.id.to_string(),
                    notification.recipient_id.to_string(),
                    notification.message,
                    notification.kind.as_str(),
                    notification.content_redirect.to_string(),
                    notification.created_at.to_rfc3339(),
                    notification.read,
                ],
            ) {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    Err(StoreError::Conflict("notification id already exists"))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// A single notification; only its recipient may read it.
    pub fn get_notification(
        &self,
        recipient_id: &str,
        notification_id: &str,
    ) -> Result<NotificationRow, StoreError> {
        let row = self
            .notification_by_id(notification_id)?
            .ok_or(StoreError::NotFound("notification"))?;
        if row.recipient_id != recipient_id {
            return Err(StoreError::Forbidden(
                "notifications belong to their recipient",
            ));
        }
        Ok(row)
    }

    /// Page through a recipient's notifications, newest first. Pages are
    /// 1-indexed; a page past the end is empty, not an error.
    pub fn list_notifications(
        &self,
        recipient_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NotificationListing, StoreError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page as u64 - 1) * page_size as u64;

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1",
                [recipient_id],
                |row| row.get(0),
            )?;
            let total = total as u64;

            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, message, kind, content_redirect, created_at, read
                 FROM notifications
                 WHERE recipient_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![recipient_id, page_size as i64, offset as i64],
                    |row| {
                        Ok(NotificationRow {
                            id: row.get(0)?,
                            recipient_id: row.get(1)?,
                            message: row.get(2)?,
                            kind: row.get(3)?,
                            content_redirect: row.get(4)?,
                            created_at: row.get(5)?,
                            read: row.get(6)?,
                        })
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;

            let total_pages = total.div_ceil(page_size as u64) as u32;

            Ok(NotificationListing {
                page,
                total_pages,
                total,
                rows,
            })
        })
    }

    /// Flip the read flag on. Safe to repeat; an already-read
    /// notification stays read.
    pub fn mark_notification_read(
        &self,
        recipient_id: &str,
        notification_id: &str,
    ) -> Result<(), StoreError> {
        // ownership check first so the error taxonomy holds
        self.get_notification(recipient_id, notification_id)?;

        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1",
                [notification_id],
            )?;
            Ok(())
        })
    }

    /// Remove a notification; only its recipient may.
    pub fn delete_notification(
        &self,
        recipient_id: &str,
        notification_id: &str,
    ) -> Result<(), StoreError> {
        self.get_notification(recipient_id, notification_id)?;

        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM notifications WHERE id = ?1",
                [notification_id],
            )?;
            Ok(())
        })
    }

    fn notification_by_id(&self, id: &str) -> Result<Option<NotificationRow>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, recipient_id, message, kind, content_redirect, created_at, read
                     FROM notifications WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(NotificationRow {
                            id: row.get(0)?,
                            recipient_id: row.get(1)?,
                            message: row.get(2)?,
                            kind: row.get(3)?,
                            content_redirect: row.get(4)?,
                            created_at: row.get(5)?,
                            read: row.get(6)?,
                        })
                    },
                )
                .optional()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use herald_types::models::{Notification, NotificationType};
    use uuid::Uuid;

    use crate::Database;
    use crate::error::StoreError;
    use crate::testutil::{open_test_db, seed_user};

    fn seed_notification(db: &Database, recipient: Uuid, text: &str) -> Notification {
        let n = Notification::new(
            recipient,
            text.into(),
            NotificationType::Message,
            Uuid::new_v4(),
        );
        db.create_notification(&n).unwrap();
        n
    }

    #[test]
    fn duplicate_id_conflicts_and_keeps_the_original() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");

        let original = seed_notification(&db, ada, "original");

        let mut clash = Notification::new(
            ada,
            "impostor".into(),
            NotificationType::Follow,
            Uuid::new_v4(),
        );
        clash.id = original.id;

        assert!(matches!(
            db.create_notification(&clash).unwrap_err(),
            StoreError::Conflict(_)
        ));

        let stored = db
            .get_notification(&ada.to_string(), &original.id.to_string())
            .unwrap();
        assert_eq!(stored.message, "original");
    }

    #[test]
    fn five_notifications_page_size_two_gives_three_pages() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");

        for i in 0..5 {
            seed_notification(&db, ada, &format!("n{i}"));
        }

        let listing = db.list_notifications(&ada.to_string(), 1, 2).unwrap();
        assert_eq!(listing.total, 5);
        assert_eq!(listing.total_pages, 3);
        assert_eq!(listing.rows.len(), 2);

        let last = db.list_notifications(&ada.to_string(), 3, 2).unwrap();
        assert_eq!(last.rows.len(), 1);

        // past the end: still well-formed, just empty
        let past = db.list_notifications(&ada.to_string(), 4, 2).unwrap();
        assert!(past.rows.is_empty());
        assert_eq!(past.total_pages, 3);
    }

    #[test]
    fn totals_count_only_the_recipient() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob");

        seed_notification(&db, ada, "for ada");
        for i in 0..3 {
            seed_notification(&db, bob, &format!("for bob {i}"));
        }

        let listing = db.list_notifications(&ada.to_string(), 1, 50).unwrap();
        assert_eq!(listing.total, 1);
        assert_eq!(listing.total_pages, 1);
    }

    #[test]
    fn listing_is_newest_first() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");

        seed_notification(&db, ada, "older");
        seed_notification(&db, ada, "newer");

        let listing = db.list_notifications(&ada.to_string(), 1, 50).unwrap();
        assert_eq!(listing.rows[0].message, "newer");
        assert_eq!(listing.rows[1].message, "older");
    }

    #[test]
    fn page_zero_is_treated_as_page_one() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");
        seed_notification(&db, ada, "only");

        let listing = db.list_notifications(&ada.to_string(), 0, 50).unwrap();
        assert_eq!(listing.page, 1);
        assert_eq!(listing.rows.len(), 1);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");
        let n = seed_notification(&db, ada, "ping");
        let (ada, id) = (ada.to_string(), n.id.to_string());

        db.mark_notification_read(&ada, &id).unwrap();
        db.mark_notification_read(&ada, &id).unwrap();

        assert!(db.get_notification(&ada, &id).unwrap().read);
    }

    #[test]
    fn other_recipients_are_locked_out() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");
        let bob = seed_user(&db, "bob").to_string();
        let n = seed_notification(&db, ada, "private");
        let id = n.id.to_string();

        assert!(matches!(
            db.get_notification(&bob, &id).unwrap_err(),
            StoreError::Forbidden(_)
        ));
        assert!(matches!(
            db.mark_notification_read(&bob, &id).unwrap_err(),
            StoreError::Forbidden(_)
        ));
        assert!(matches!(
            db.delete_notification(&bob, &id).unwrap_err(),
            StoreError::Forbidden(_)
        ));
    }

    #[test]
    fn missing_notifications_are_not_found() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada").to_string();
        let ghost = Uuid::new_v4().to_string();

        assert!(matches!(
            db.get_notification(&ada, &ghost).unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            db.delete_notification(&ada, &ghost).unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn delete_removes_the_row() {
        let (_dir, db) = open_test_db();
        let ada = seed_user(&db, "ada");
        let n = seed_notification(&db, ada, "gone soon");
        let (ada, id) = (ada.to_string(), n.id.to_string());

        db.delete_notification(&ada, &id).unwrap();

        assert!(matches!(
            db.get_notification(&ada, &id).unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert_eq!(db.list_notifications(&ada, 1, 50).unwrap().total, 0);
    }
}
