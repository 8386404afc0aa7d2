use chrono::Utc;
use rusqlite::{Connection, params};

use crate::error::{Error, Result};

/// Which way a toggle went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Toggled {
    On,
    Off,
}

impl Toggled {
    pub fn is_on(self) -> bool {
        self == Toggled::On
    }

    /// Counter adjustment that goes with this transition.
    pub fn delta(self) -> i64 {
        match self {
            Toggled::On => 1,
            Toggled::Off => -1,
        }
    }
}

/// A two-column relation table with a `(left, right)` primary key and a
/// `created_at` column. Names are compile-time literals.
pub(crate) struct Relation {
    pub table: &'static str,
    pub left: &'static str,
    pub right: &'static str,
}

pub(crate) const FOLLOWS: Relation = Relation {
    table: "follows",
    left: "follower_id",
    right: "following_id",
};

pub(crate) const LIKES: Relation = Relation {
    table: "likes",
    left: "user_id",
    right: "post_id",
};

pub(crate) const COMMENT_LIKES: Relation = Relation {
    table: "comment_likes",
    left: "user_id",
    right: "comment_id",
};

pub(crate) const SAVED_POSTS: Relation = Relation {
    table: "saved_posts",
    left: "user_id",
    right: "post_id",
};

impl Relation {
    /// Insert the row; if the primary key says it already exists, delete it
    /// instead. A losing racer on the insert therefore ends up removing.
    pub fn toggle(&self, conn: &Connection, left: &str, right: &str) -> Result<Toggled> {
        match self.insert(conn, left, right) {
            Ok(()) => Ok(Toggled::On),
            Err(Error::AlreadyExists) => {
                let sql = format!(
                    "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
                    self.table, self.left, self.right
                );
                conn.execute(&sql, params![left, right])?;
                Ok(Toggled::Off)
            }
            Err(e) => Err(e),
        }
    }

    pub fn insert(&self, conn: &Connection, left: &str, right: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}, {}, created_at) VALUES (?1, ?2, ?3)",
            self.table, self.left, self.right
        );
        conn.execute(&sql, params![left, right, Utc::now()])?;
        Ok(())
    }

    pub fn exists(&self, conn: &Connection, left: &str, right: &str) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = ?1 AND {} = ?2)",
            self.table, self.left, self.right
        );
        Ok(conn.query_row(&sql, params![left, right], |r| r.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn second_insert_reports_already_exists() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");

        db.with_conn(|conn| {
            FOLLOWS.insert(conn, &alice, &bob)?;
            assert!(matches!(FOLLOWS.insert(conn, &alice, &bob), Err(Error::AlreadyExists)));
            assert!(FOLLOWS.exists(conn, &alice, &bob)?);
            assert_eq!(FOLLOWS.toggle(conn, &alice, &bob)?, Toggled::Off);
            assert!(!FOLLOWS.exists(conn, &alice, &bob)?);
            Ok(())
        })
        .unwrap();
    }
}
