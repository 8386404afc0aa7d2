use rusqlite::{Connection, params};
use tracing::debug;
use vista_types::api::FollowState;
use vista_types::models::NotificationKind;

use crate::error::{Error, Result};
use crate::notifications::{Target, notify};
use crate::relation::FOLLOWS;
use crate::users::require_user_by_username;
use crate::Database;

impl Database {
    // -- Social graph --

    /// Follow `username`, or unfollow if already following. Counters on both
    /// users move in the same transaction; only a new follow notifies.
    pub fn toggle_follow(&self, follower_id: &str, username: &str) -> Result<FollowState> {
        self.with_tx(|tx| {
            let target = require_user_by_username(tx, username)?;
            if target.id == follower_id {
                return Err(Error::CannotFollowSelf);
            }

            let toggled = FOLLOWS.toggle(tx, follower_id, &target.id)?;
            tx.execute(
                "UPDATE users SET followers_count = followers_count + ?2 WHERE id = ?1",
                params![target.id, toggled.delta()],
            )?;
            tx.execute(
                "UPDATE users SET following_count = following_count + ?2 WHERE id = ?1",
                params![follower_id, toggled.delta()],
            )?;

            if toggled.is_on() {
                notify(tx, &target.id, follower_id, NotificationKind::Follow, Target::default())?;
            }

            debug!("{} follow {} -> {:?}", follower_id, target.id, toggled);
            Ok(FollowState {
                following: toggled.is_on(),
                followers_count: followers_count(tx, &target.id)?,
            })
        })
    }
}

fn followers_count(conn: &Connection, user_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT followers_count FROM users WHERE id = ?1",
        [user_id],
        |r| r.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use crate::relation::FOLLOWS;
    use crate::testutil;
    use crate::{Database, Error};

    fn is_following(db: &Database, follower: &str, following: &str) -> bool {
        db.with_conn(|conn| FOLLOWS.exists(conn, follower, following)).unwrap()
    }

    #[test]
    fn follow_twice_restores_state_and_counters() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");

        let on = db.toggle_follow(&alice, "bob").unwrap();
        assert!(on.following);
        assert_eq!(on.followers_count, 1);
        assert!(is_following(&db, &alice, &bob));
        assert_eq!(db.get_user_by_id(&alice).unwrap().unwrap().following_count, 1);

        let off = db.toggle_follow(&alice, "bob").unwrap();
        assert!(!off.following);
        assert_eq!(off.followers_count, 0);
        assert!(!is_following(&db, &alice, &bob));
        assert_eq!(db.get_user_by_id(&alice).unwrap().unwrap().following_count, 0);

        // Only the creating transition notified.
        assert_eq!(db.list_notifications(&bob, 10).unwrap().len(), 1);
    }

    #[test]
    fn cannot_follow_self_or_unknown() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        assert!(matches!(db.toggle_follow(&alice, "alice"), Err(Error::CannotFollowSelf)));
        assert!(matches!(db.toggle_follow(&alice, "ghost"), Err(Error::NotFound("user"))));
    }
}
