use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use vista_types::models::MediaKind;

use crate::error::{Error, Result};
use crate::models::MediaRow;
use crate::{Database, new_id};

impl Database {
    // -- Media metadata (bytes live in the blob store) --

    pub fn insert_media(
        &self,
        owner_id: &str,
        kind: MediaKind,
        content_type: &str,
        byte_size: i64,
        sha256: &str,
    ) -> Result<String> {
        let id = new_id();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO media (id, owner_id, kind, content_type, byte_size, sha256, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, owner_id, kind.as_str(), content_type, byte_size, sha256, Utc::now()],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    pub fn get_media(&self, id: &str) -> Result<Option<MediaRow>> {
        self.with_conn(|conn| query_media(conn, id))
    }

    /// Forget an upload whose bytes never reached the blob store.
    pub fn delete_media(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM media WHERE id = ?1", [id])?;
            Ok(())
        })
    }
}

fn query_media(conn: &Connection, id: &str) -> Result<Option<MediaRow>> {
    let row = conn
        .query_row(
            "SELECT id, owner_id, kind, content_type, byte_size, sha256, created_at FROM media WHERE id = ?1",
            [id],
            media_from_row,
        )
        .optional()?;
    Ok(row)
}

fn media_from_row(row: &Row<'_>) -> rusqlite::Result<MediaRow> {
    let kind: String = row.get(2)?;
    Ok(MediaRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        kind: kind.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
        })?,
        content_type: row.get(3)?,
        byte_size: row.get(4)?,
        sha256: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// The media must exist, belong to `owner_id` and, when given, be of `kind`.
/// Someone else's upload is reported as missing.
pub(crate) fn require_owned(
    conn: &Connection,
    media_id: &str,
    owner_id: &str,
    kind: Option<MediaKind>,
) -> Result<MediaRow> {
    let media = query_media(conn, media_id)?
        .filter(|m| m.owner_id == owner_id)
        .ok_or(Error::NotFound("media"))?;

    if let Some(kind) = kind {
        if media.kind != kind {
            return Err(Error::Invalid(format!("expected {} media", kind.as_str())));
        }
    }
    Ok(media)
}
