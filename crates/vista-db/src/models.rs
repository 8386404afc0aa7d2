//! Row types for tables whose columns should not leave the store as-is
//! (password hashes, blob metadata). Everything else is mapped straight
//! into the `vista-types` views.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use vista_types::api::{Profile, UserSummary};
use vista_types::models::{MediaKind, media_url};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub bio: String,
    pub website: String,
    pub phone_number: String,
    pub avatar_media_id: Option<String>,
    pub is_private: bool,
    pub followers_count: i64,
    pub following_count: i64,
    pub posts_count: i64,
    pub created_at: DateTime<Utc>,
}

pub(crate) const USER_COLUMNS: &str = "id, username, email, password, full_name, bio, website, \
     phone_number, avatar_media_id, is_private, followers_count, following_count, posts_count, created_at";

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            full_name: row.get(4)?,
            bio: row.get(5)?,
            website: row.get(6)?,
            phone_number: row.get(7)?,
            avatar_media_id: row.get(8)?,
            is_private: row.get(9)?,
            followers_count: row.get(10)?,
            following_count: row.get(11)?,
            posts_count: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            avatar_url: self.avatar_media_id.as_deref().map(media_url),
        }
    }

    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            bio: self.bio.clone(),
            website: self.website.clone(),
            phone_number: self.phone_number.clone(),
            avatar_url: self.avatar_media_id.as_deref().map(media_url),
            is_private: self.is_private,
            followers_count: self.followers_count,
            following_count: self.following_count,
            posts_count: self.posts_count,
            created_at: self.created_at,
        }
    }
}

/// Columns for a [`UserSummary`] read from the users table aliased as `alias`.
pub(crate) fn summary_columns(alias: &str) -> String {
    format!(
        "{a}.id, {a}.username, {a}.full_name, {a}.avatar_media_id",
        a = alias
    )
}

/// Read a [`UserSummary`] from four consecutive columns starting at `start`.
pub(crate) fn summary_at(row: &Row<'_>, start: usize) -> rusqlite::Result<UserSummary> {
    let avatar: Option<String> = row.get(start + 3)?;
    Ok(UserSummary {
        id: row.get(start)?,
        username: row.get(start + 1)?,
        full_name: row.get(start + 2)?,
        avatar_url: avatar.as_deref().map(media_url),
    })
}

pub struct MediaRow {
    pub id: String,
    pub owner_id: String,
    pub kind: MediaKind,
    pub content_type: String,
    pub byte_size: i64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

/// Editable profile fields. `avatar_media_id` of `None` keeps the current avatar.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub bio: String,
    pub website: String,
    pub phone_number: String,
    pub avatar_media_id: Option<String>,
    pub is_private: bool,
}
