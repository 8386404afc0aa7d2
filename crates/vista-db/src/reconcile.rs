use tracing::warn;

use crate::error::Result;
use crate::Database;

/// Each statement rewrites one denormalised counter from its relation and
/// only touches rows that disagree.
const REPAIRS: &[(&str, &str)] = &[
    (
        "users.followers_count",
        "UPDATE users SET followers_count = c.n
         FROM (SELECT u.id, (SELECT COUNT(*) FROM follows WHERE following_id = u.id) AS n FROM users u) c
         WHERE users.id = c.id AND users.followers_count <> c.n",
    ),
    (
        "users.following_count",
        "UPDATE users SET following_count = c.n
         FROM (SELECT u.id, (SELECT COUNT(*) FROM follows WHERE follower_id = u.id) AS n FROM users u) c
         WHERE users.id = c.id AND users.following_count <> c.n",
    ),
    (
        "users.posts_count",
        "UPDATE users SET posts_count = c.n
         FROM (SELECT u.id, (SELECT COUNT(*) FROM posts WHERE user_id = u.id) AS n FROM users u) c
         WHERE users.id = c.id AND users.posts_count <> c.n",
    ),
    (
        "posts.likes_count",
        "UPDATE posts SET likes_count = c.n
         FROM (SELECT p.id, (SELECT COUNT(*) FROM likes WHERE post_id = p.id) AS n FROM posts p) c
         WHERE posts.id = c.id AND posts.likes_count <> c.n",
    ),
    (
        "posts.comments_count",
        "UPDATE posts SET comments_count = c.n
         FROM (SELECT p.id, (SELECT COUNT(*) FROM comments WHERE post_id = p.id) AS n FROM posts p) c
         WHERE posts.id = c.id AND posts.comments_count <> c.n",
    ),
    (
        "comments.likes_count",
        "UPDATE comments SET likes_count = c.n
         FROM (SELECT m.id, (SELECT COUNT(*) FROM comment_likes WHERE comment_id = m.id) AS n FROM comments m) c
         WHERE comments.id = c.id AND comments.likes_count <> c.n",
    ),
];

impl Database {
    /// Recompute every counter from its relation in one transaction.
    /// Returns how many rows were corrected.
    pub fn reconcile_counters(&self) -> Result<usize> {
        self.with_tx(|tx| {
            let mut fixed = 0;
            for (counter, sql) in REPAIRS {
                let changed = tx.execute(sql, [])?;
                if changed > 0 {
                    warn!("Corrected {} drifted {} value(s)", changed, counter);
                }
                fixed += changed;
            }
            Ok(fixed)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil;

    #[test]
    fn drifted_counters_are_rewritten() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let post = db.create_post(&bob, &testutil::image(&db, &bob), "").unwrap();
        db.toggle_follow(&alice, "bob").unwrap();
        db.toggle_like(&alice, &post.id).unwrap();

        assert_eq!(db.reconcile_counters().unwrap(), 0);

        db.with_conn(|conn| {
            conn.execute("UPDATE users SET followers_count = 7 WHERE id = ?1", [&bob])?;
            conn.execute("UPDATE posts SET likes_count = 0 WHERE id = ?1", [&post.id])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.reconcile_counters().unwrap(), 2);
        assert_eq!(db.get_user_by_id(&bob).unwrap().unwrap().followers_count, 1);
        let detail = db.post_detail(&alice, &post.id).unwrap();
        assert_eq!(detail.post.likes_count, 1);
    }
}
