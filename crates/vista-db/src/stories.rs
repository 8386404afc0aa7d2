use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;
use vista_types::api::StoryView;
use vista_types::models::media_url;

use crate::error::{Error, Result};
use crate::media::require_owned;
use crate::models::summary_at;
use crate::{Database, new_id};

pub const STORY_LIFETIME_HOURS: i64 = 24;
const MAX_STORY_TEXT: usize = 200;

const STORY_SELECT: &str = "SELECT s.id, s.media_id, s.text, s.created_at, s.expires_at, \
     u.id, u.username, u.full_name, u.avatar_media_id \
     FROM stories s JOIN users u ON u.id = s.user_id";

impl Database {
    // -- Stories --

    pub fn create_story(&self, user_id: &str, media_id: &str, text: &str) -> Result<StoryView> {
        let text = text.trim();
        if text.chars().count() > MAX_STORY_TEXT {
            return Err(Error::Invalid(format!(
                "story text is longer than {} characters",
                MAX_STORY_TEXT
            )));
        }

        let id = new_id();
        let now = Utc::now();
        let expires_at = now + Duration::hours(STORY_LIFETIME_HOURS);
        self.with_tx(|tx| {
            require_owned(tx, media_id, user_id, None)?;
            tx.execute(
                "INSERT INTO stories (id, user_id, media_id, text, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, user_id, media_id, text, now, expires_at],
            )?;
            let sql = format!("{} WHERE s.id = ?1", STORY_SELECT);
            Ok(tx.query_row(&sql, [&id], story_from_row)?)
        })
    }

    /// Unexpired stories from the viewer and the people they follow, newest first.
    pub fn active_stories(&self, viewer_id: &str) -> Result<Vec<StoryView>> {
        self.active_stories_at(viewer_id, Utc::now())
    }

    pub(crate) fn active_stories_at(&self, viewer_id: &str, now: DateTime<Utc>) -> Result<Vec<StoryView>> {
        self.with_conn(|conn| query_active(conn, viewer_id, now))
    }

    pub fn delete_story(&self, user_id: &str, story_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM stories WHERE id = ?1 AND user_id = ?2",
                params![story_id, user_id],
            )?;
            if removed == 0 {
                return Err(Error::NotFound("story"));
            }
            Ok(())
        })
    }

    /// Drop expired stories. Listing already hides them; this only reclaims rows.
    pub fn purge_expired_stories(&self) -> Result<usize> {
        self.purge_expired_stories_at(Utc::now())
    }

    pub(crate) fn purge_expired_stories_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let purged = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM stories WHERE expires_at <= ?1", [now])?)
        })?;
        if purged > 0 {
            info!("Purged {} expired stories", purged);
        }
        Ok(purged)
    }

    pub fn get_story(&self, story_id: &str) -> Result<Option<StoryView>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE s.id = ?1", STORY_SELECT);
            Ok(conn.query_row(&sql, [story_id], story_from_row).optional()?)
        })
    }
}

fn query_active(conn: &Connection, viewer_id: &str, now: DateTime<Utc>) -> Result<Vec<StoryView>> {
    let sql = format!(
        "{} WHERE s.expires_at > ?2
           AND (s.user_id = ?1
                OR s.user_id IN (SELECT following_id FROM follows WHERE follower_id = ?1))
         ORDER BY s.created_at DESC, s.rowid DESC",
        STORY_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![viewer_id, now], story_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<StoryView> {
    let media_id: String = row.get(1)?;
    Ok(StoryView {
        id: row.get(0)?,
        media_url: media_url(&media_id),
        text: row.get(2)?,
        created_at: row.get(3)?,
        expires_at: row.get(4)?,
        author: summary_at(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::STORY_LIFETIME_HOURS;
    use crate::{Error, testutil};

    #[test]
    fn stories_expire_after_a_day() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let story = db
            .create_story(&bob, &testutil::image(&db, &bob), "hello")
            .unwrap();
        assert_eq!(story.expires_at - story.created_at, Duration::hours(STORY_LIFETIME_HOURS));

        // Not followed yet: invisible to Alice.
        assert!(db.active_stories(&alice).unwrap().is_empty());
        db.toggle_follow(&alice, "bob").unwrap();
        assert_eq!(db.active_stories(&alice).unwrap().len(), 1);

        let later = Utc::now() + Duration::hours(STORY_LIFETIME_HOURS + 1);
        assert!(db.active_stories_at(&alice, later).unwrap().is_empty());
        assert_eq!(db.purge_expired_stories_at(later).unwrap(), 1);
        assert!(db.get_story(&story.id).unwrap().is_none());
    }

    #[test]
    fn only_the_author_deletes_a_story() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let story = db.create_story(&bob, &testutil::image(&db, &bob), "").unwrap();

        assert!(matches!(db.delete_story(&alice, &story.id), Err(Error::NotFound("story"))));
        db.delete_story(&bob, &story.id).unwrap();
        assert!(db.get_story(&story.id).unwrap().is_none());
    }

    #[test]
    fn long_story_text_is_rejected() {
        let db = testutil::db();
        let bob = testutil::user(&db, "bob");
        let media = testutil::image(&db, &bob);
        assert!(matches!(
            db.create_story(&bob, &media, &"x".repeat(201)),
            Err(Error::Invalid(_))
        ));
    }
}
