use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use vista_types::api::UserSummary;
use vista_types::models::MediaKind;

use crate::error::{Error, Result};
use crate::models::{ProfileUpdate, USER_COLUMNS, UserRow, summary_at, summary_columns};
use crate::{Database, new_id};

const MAX_BIO: usize = 500;
const MAX_PHONE: usize = 15;
const MAX_FULL_NAME: usize = 150;
const MAX_WEBSITE: usize = 200;

/// Searches shorter than this return nothing.
pub const MIN_QUERY_LEN: usize = 2;

impl Database {
    // -- Identity --

    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<UserRow> {
        validate_username(username)?;
        if !email.contains('@') {
            return Err(Error::Invalid("invalid email address".into()));
        }

        let id = new_id();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, username, email, password_hash, Utc::now()],
            )?;
            query_user(conn, "id", &id)?.ok_or(Error::NotFound("user"))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn email_taken(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT 1 FROM users WHERE email = ?1", [email], |_| Ok(()))
                .optional()?
                .is_some())
        })
    }

    pub fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<UserRow> {
        check_len("full name", &update.full_name, MAX_FULL_NAME)?;
        check_len("bio", &update.bio, MAX_BIO)?;
        check_len("website", &update.website, MAX_WEBSITE)?;
        check_len("phone number", &update.phone_number, MAX_PHONE)?;

        self.with_tx(|tx| {
            if let Some(media_id) = &update.avatar_media_id {
                crate::media::require_owned(tx, media_id, user_id, Some(MediaKind::Image))?;
                tx.execute(
                    "UPDATE users SET avatar_media_id = ?2 WHERE id = ?1",
                    params![user_id, media_id],
                )?;
            }

            let changed = tx.execute(
                "UPDATE users SET full_name = ?2, bio = ?3, website = ?4, phone_number = ?5, is_private = ?6
                 WHERE id = ?1",
                params![
                    user_id,
                    update.full_name.trim(),
                    update.bio.trim(),
                    update.website.trim(),
                    update.phone_number.trim(),
                    update.is_private,
                ],
            )?;
            if changed == 0 {
                return Err(Error::NotFound("user"));
            }

            debug!("Profile updated for {}", user_id);
            query_user(tx, "id", user_id)?.ok_or(Error::NotFound("user"))
        })
    }

    /// Handle or full-name substring search, excluding the viewer.
    pub fn search_users(&self, viewer_id: &str, query: &str, limit: u32) -> Result<Vec<UserSummary>> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users u
                 WHERE u.id <> ?1
                   AND (u.username LIKE ?2 ESCAPE '\\' OR u.full_name LIKE ?2 ESCAPE '\\')
                 ORDER BY u.username
                 LIMIT ?3",
                summary_columns("u")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![viewer_id, like_pattern(query), limit], |row| {
                    summary_at(row, 0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Users the viewer does not follow yet, newest accounts first.
    pub fn suggested_users(&self, viewer_id: &str, limit: u32) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users u
                 WHERE u.id <> ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM follows f WHERE f.follower_id = ?1 AND f.following_id = u.id
                   )
                 ORDER BY u.created_at DESC
                 LIMIT ?2",
                summary_columns("u")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![viewer_id, limit], |row| summary_at(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is only ever one of our own literals.
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let row = conn
        .query_row(&sql, [value], UserRow::from_row)
        .optional()?;
    Ok(row)
}

pub(crate) fn require_user_by_username(conn: &Connection, username: &str) -> Result<UserRow> {
    query_user(conn, "username", username)?.ok_or(Error::NotFound("user"))
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=30).contains(&len) {
        return Err(Error::Invalid("username must be 3 to 30 characters".into()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(Error::Invalid(
            "username may only contain letters, digits, '_' and '.'".into(),
        ));
    }
    Ok(())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().chars().count() > max {
        return Err(Error::Invalid(format!("{} is longer than {} characters", field, max)));
    }
    Ok(())
}

/// `%query%` with LIKE wildcards in the input escaped.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use crate::testutil;
    use crate::{Error, models::ProfileUpdate};

    #[test]
    fn duplicate_username_is_rejected() {
        let db = testutil::db();
        testutil::user(&db, "alice");
        assert!(matches!(
            db.create_user("ALICE", "other@example.com", "hash"),
            Err(Error::AlreadyExists)
        ));
    }

    #[test]
    fn bad_usernames_are_rejected() {
        let db = testutil::db();
        assert!(matches!(db.create_user("al", "a@x.io", "h"), Err(Error::Invalid(_))));
        assert!(matches!(db.create_user("al ice", "a@x.io", "h"), Err(Error::Invalid(_))));
    }

    #[test]
    fn search_excludes_viewer_and_short_queries() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        testutil::user(&db, "alicia");
        testutil::user(&db, "bob");

        let hits = db.search_users(&alice, "ali", 10).unwrap();
        let names: Vec<_> = hits.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alicia"]);

        assert!(db.search_users(&alice, "a", 10).unwrap().is_empty());
        // Wildcards in the query are literal.
        assert!(db.search_users(&alice, "%%", 10).unwrap().is_empty());
    }

    #[test]
    fn profile_update_validates_lengths_and_avatar_owner() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let bobs_image = testutil::image(&db, &bob);

        let too_long = ProfileUpdate {
            bio: "x".repeat(501),
            ..Default::default()
        };
        assert!(matches!(db.update_profile(&alice, &too_long), Err(Error::Invalid(_))));

        let stolen = ProfileUpdate {
            avatar_media_id: Some(bobs_image),
            ..Default::default()
        };
        assert!(matches!(db.update_profile(&alice, &stolen), Err(Error::NotFound(_))));

        let own = testutil::image(&db, &alice);
        let updated = db
            .update_profile(
                &alice,
                &ProfileUpdate {
                    full_name: " Alice Liddell ".into(),
                    avatar_media_id: Some(own.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.full_name, "Alice Liddell");
        assert_eq!(updated.avatar_media_id.as_deref(), Some(own.as_str()));
    }

    #[test]
    fn suggestions_skip_followed_users() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        testutil::user(&db, "bob");
        testutil::user(&db, "carol");
        db.toggle_follow(&alice, "bob").unwrap();

        let names: Vec<_> = db
            .suggested_users(&alice, 5)
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["carol"]);
    }
}
