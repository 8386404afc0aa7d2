use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, params};
use tracing::debug;
use vista_types::api::NotificationView;
use vista_types::models::NotificationKind;

use crate::error::Result;
use crate::models::{summary_at, summary_columns};
use crate::{Database, new_id};

pub const MAX_PAGE: u32 = 100;

/// Optional references a notification can point at.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Target<'a> {
    pub post_id: Option<&'a str>,
    pub comment_id: Option<&'a str>,
    pub conversation_id: Option<&'a str>,
}

/// Append one notification row. Must run inside the transaction of the
/// mutation that caused it.
pub(crate) fn notify(
    conn: &Connection,
    recipient_id: &str,
    actor_id: &str,
    kind: NotificationKind,
    target: Target<'_>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (id, user_id, actor_id, kind, post_id, comment_id, conversation_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new_id(),
            recipient_id,
            actor_id,
            kind.as_str(),
            target.post_id,
            target.comment_id,
            target.conversation_id,
            Utc::now(),
        ],
    )?;
    debug!("Notification {} {} -> {}", kind, actor_id, recipient_id);
    Ok(())
}

impl Database {
    // -- Notifications --

    pub fn list_notifications(&self, user_id: &str, limit: u32) -> Result<Vec<NotificationView>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT n.id, n.kind, n.post_id, n.comment_id, n.conversation_id, n.is_read, n.created_at, {}
                 FROM notifications n
                 JOIN users a ON a.id = n.actor_id
                 WHERE n.user_id = ?1
                 ORDER BY n.created_at DESC, n.rowid DESC
                 LIMIT ?2",
                summary_columns("a")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, limit.min(MAX_PAGE)], |row| {
                    let kind: String = row.get(1)?;
                    Ok(NotificationView {
                        id: row.get(0)?,
                        kind: kind.parse().map_err(|e: String| {
                            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into())
                        })?,
                        post_id: row.get(2)?,
                        comment_id: row.get(3)?,
                        conversation_id: row.get(4)?,
                        is_read: row.get(5)?,
                        created_at: row.get(6)?,
                        actor: summary_at(row, 7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |r| r.get(0),
            )?)
        })
    }

    /// Flip the read flag on the given notifications, or all of them when
    /// `ids` is empty. Ids belonging to someone else are ignored.
    pub fn mark_notifications_read(&self, user_id: &str, ids: &[String]) -> Result<usize> {
        self.with_tx(|tx| {
            if ids.is_empty() {
                return Ok(tx.execute(
                    "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                    [user_id],
                )?);
            }

            let mut updated = 0;
            for id in ids {
                updated += tx.execute(
                    "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2 AND is_read = 0",
                    params![id, user_id],
                )?;
            }
            Ok(updated)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil;
    use vista_types::models::NotificationKind;

    #[test]
    fn mark_read_only_touches_own_rows() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        db.toggle_follow(&alice, "bob").unwrap();
        db.toggle_follow(&bob, "alice").unwrap();

        let bobs = db.list_notifications(&bob, 50).unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].kind, NotificationKind::Follow);
        assert_eq!(bobs[0].actor.username, "alice");

        // Alice cannot mark Bob's notification.
        assert_eq!(db.mark_notifications_read(&alice, &[bobs[0].id.clone()]).unwrap(), 0);
        assert_eq!(db.unread_notification_count(&bob).unwrap(), 1);

        assert_eq!(db.mark_notifications_read(&bob, &[]).unwrap(), 1);
        assert_eq!(db.unread_notification_count(&bob).unwrap(), 0);
        assert!(db.list_notifications(&bob, 50).unwrap()[0].is_read);
    }
}
