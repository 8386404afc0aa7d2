use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use vista_types::api::{CommentView, LikeState, PostDetail, PostView, ProfilePage, SaveState};
use vista_types::models::{NotificationKind, media_url};

use crate::error::{Error, Result};
use crate::media::require_owned;
use crate::models::{summary_at, summary_columns};
use crate::notifications::{Target, notify};
use crate::relation::{COMMENT_LIKES, FOLLOWS, LIKES, SAVED_POSTS};
use crate::users::require_user_by_username;
use crate::{Database, new_id};

const MAX_CAPTION: usize = 2200;

/// Which posts a listing selects. `?1` is always the viewer, `?2` the argument.
enum PostFilter<'a> {
    Feed,
    Explore,
    ByUser(&'a str),
    Saved,
    One(&'a str),
}

impl PostFilter<'_> {
    fn clause(&self) -> &'static str {
        match self {
            Self::Feed => {
                "p.user_id = ?1 OR p.user_id IN (SELECT following_id FROM follows WHERE follower_id = ?1)"
            }
            Self::Explore => "1 = 1",
            Self::ByUser(_) => "p.user_id = ?2",
            Self::Saved => "p.id IN (SELECT post_id FROM saved_posts WHERE user_id = ?1)",
            Self::One(_) => "p.id = ?2",
        }
    }

    fn arg(&self) -> &str {
        match self {
            Self::ByUser(v) | Self::One(v) => v,
            _ => "",
        }
    }
}

impl Database {
    // -- Posts --

    pub fn create_post(&self, owner_id: &str, media_id: &str, caption: &str) -> Result<PostView> {
        let caption = caption.trim();
        if caption.chars().count() > MAX_CAPTION {
            return Err(Error::Invalid(format!("caption is longer than {} characters", MAX_CAPTION)));
        }

        let post_id = new_id();
        self.with_tx(|tx| {
            require_owned(tx, media_id, owner_id, None)?;
            tx.execute(
                "INSERT INTO posts (id, user_id, media_id, caption, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![post_id, owner_id, media_id, caption, Utc::now()],
            )?;
            tx.execute(
                "UPDATE users SET posts_count = posts_count + 1 WHERE id = ?1",
                [owner_id],
            )?;

            info!("Post {} created by {}", post_id, owner_id);
            query_posts(tx, owner_id, PostFilter::One(&post_id), 1)?
                .pop()
                .ok_or(Error::NotFound("post"))
        })
    }

    /// Only the owner may delete; anyone else sees `NotFound`.
    pub fn delete_post(&self, owner_id: &str, post_id: &str) -> Result<()> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM posts WHERE id = ?1 AND user_id = ?2",
                params![post_id, owner_id],
            )?;
            if removed == 0 {
                return Err(Error::NotFound("post"));
            }
            tx.execute(
                "UPDATE users SET posts_count = posts_count - 1 WHERE id = ?1",
                [owner_id],
            )?;
            info!("Post {} deleted by {}", post_id, owner_id);
            Ok(())
        })
    }

    pub fn post_detail(&self, viewer_id: &str, post_id: &str) -> Result<PostDetail> {
        self.with_conn(|conn| {
            let post = query_posts(conn, viewer_id, PostFilter::One(post_id), 1)?
                .pop()
                .ok_or(Error::NotFound("post"))?;
            let comments = query_comments(conn, post_id)?;
            Ok(PostDetail { post, comments })
        })
    }

    /// Posts by the viewer and everyone they follow, newest first.
    pub fn feed(&self, viewer_id: &str, limit: u32) -> Result<Vec<PostView>> {
        self.with_conn(|conn| query_posts(conn, viewer_id, PostFilter::Feed, limit))
    }

    pub fn explore(&self, viewer_id: &str, limit: u32) -> Result<Vec<PostView>> {
        self.with_conn(|conn| query_posts(conn, viewer_id, PostFilter::Explore, limit))
    }

    pub fn saved_posts(&self, viewer_id: &str, limit: u32) -> Result<Vec<PostView>> {
        self.with_conn(|conn| query_posts(conn, viewer_id, PostFilter::Saved, limit))
    }

    pub fn profile_page(&self, viewer_id: &str, username: &str, limit: u32) -> Result<ProfilePage> {
        self.with_conn(|conn| {
            let user = require_user_by_username(conn, username)?;
            let posts = query_posts(conn, viewer_id, PostFilter::ByUser(&user.id), limit)?;
            let is_following = FOLLOWS.exists(conn, viewer_id, &user.id)?;
            Ok(ProfilePage {
                profile: user.profile(),
                posts,
                is_following,
            })
        })
    }

    // -- Likes --

    pub fn toggle_like(&self, user_id: &str, post_id: &str) -> Result<LikeState> {
        self.with_tx(|tx| {
            let owner_id = post_owner(tx, post_id)?;
            let toggled = LIKES.toggle(tx, user_id, post_id)?;
            tx.execute(
                "UPDATE posts SET likes_count = likes_count + ?2 WHERE id = ?1",
                params![post_id, toggled.delta()],
            )?;

            if toggled.is_on() && owner_id != user_id {
                let target = Target {
                    post_id: Some(post_id),
                    ..Default::default()
                };
                notify(tx, &owner_id, user_id, NotificationKind::Like, target)?;
            }

            debug!("{} like post {} -> {:?}", user_id, post_id, toggled);
            Ok(LikeState {
                liked: toggled.is_on(),
                likes_count: tx.query_row(
                    "SELECT likes_count FROM posts WHERE id = ?1",
                    [post_id],
                    |r| r.get(0),
                )?,
            })
        })
    }

    pub fn toggle_comment_like(&self, user_id: &str, comment_id: &str) -> Result<LikeState> {
        self.with_tx(|tx| {
            let exists = tx
                .query_row("SELECT 1 FROM comments WHERE id = ?1", [comment_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Err(Error::NotFound("comment"));
            }

            let toggled = COMMENT_LIKES.toggle(tx, user_id, comment_id)?;
            tx.execute(
                "UPDATE comments SET likes_count = likes_count + ?2 WHERE id = ?1",
                params![comment_id, toggled.delta()],
            )?;

            Ok(LikeState {
                liked: toggled.is_on(),
                likes_count: tx.query_row(
                    "SELECT likes_count FROM comments WHERE id = ?1",
                    [comment_id],
                    |r| r.get(0),
                )?,
            })
        })
    }

    // -- Saves --

    pub fn toggle_save(&self, user_id: &str, post_id: &str) -> Result<SaveState> {
        self.with_tx(|tx| {
            post_owner(tx, post_id)?;
            let toggled = SAVED_POSTS.toggle(tx, user_id, post_id)?;
            Ok(SaveState {
                saved: toggled.is_on(),
            })
        })
    }

    // -- Comments --

    pub fn add_comment(&self, user_id: &str, post_id: &str, text: &str) -> Result<CommentView> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyContent);
        }

        let comment_id = new_id();
        self.with_tx(|tx| {
            let owner_id = post_owner(tx, post_id)?;
            tx.execute(
                "INSERT INTO comments (id, user_id, post_id, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![comment_id, user_id, post_id, text, Utc::now()],
            )?;
            tx.execute(
                "UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?1",
                [post_id],
            )?;

            if owner_id != user_id {
                let target = Target {
                    post_id: Some(post_id),
                    comment_id: Some(&comment_id),
                    ..Default::default()
                };
                notify(tx, &owner_id, user_id, NotificationKind::Comment, target)?;
            }

            query_comment(tx, &comment_id)
        })
    }

    /// The comment's author or the post's owner may delete it.
    pub fn delete_comment(&self, user_id: &str, comment_id: &str) -> Result<()> {
        self.with_tx(|tx| {
            let (author_id, post_id, post_owner_id): (String, String, String) = tx
                .query_row(
                    "SELECT c.user_id, c.post_id, p.user_id FROM comments c
                     JOIN posts p ON p.id = c.post_id
                     WHERE c.id = ?1",
                    [comment_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()?
                .ok_or(Error::NotFound("comment"))?;

            if author_id != user_id && post_owner_id != user_id {
                return Err(Error::NotFound("comment"));
            }

            tx.execute("DELETE FROM comments WHERE id = ?1", [comment_id])?;
            tx.execute(
                "UPDATE posts SET comments_count = comments_count - 1 WHERE id = ?1",
                [&post_id],
            )?;
            Ok(())
        })
    }
}

fn post_owner(conn: &Connection, post_id: &str) -> Result<String> {
    conn.query_row("SELECT user_id FROM posts WHERE id = ?1", [post_id], |r| r.get(0))
        .optional()?
        .ok_or(Error::NotFound("post"))
}

fn query_posts(
    conn: &Connection,
    viewer_id: &str,
    filter: PostFilter<'_>,
    limit: u32,
) -> Result<Vec<PostView>> {
    let sql = format!(
        "SELECT p.id, p.media_id, p.caption, p.likes_count, p.comments_count, p.created_at,
                EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?1),
                EXISTS (SELECT 1 FROM saved_posts s WHERE s.post_id = p.id AND s.user_id = ?1),
                {}
         FROM posts p
         JOIN users u ON u.id = p.user_id
         WHERE {}
         ORDER BY p.created_at DESC, p.rowid DESC
         LIMIT ?3",
        summary_columns("u"),
        filter.clause()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![viewer_id, filter.arg(), limit], post_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostView> {
    let media_id: String = row.get(1)?;
    Ok(PostView {
        id: row.get(0)?,
        media_url: media_url(&media_id),
        caption: row.get(2)?,
        likes_count: row.get(3)?,
        comments_count: row.get(4)?,
        created_at: row.get(5)?,
        liked_by_me: row.get(6)?,
        saved_by_me: row.get(7)?,
        author: summary_at(row, 8)?,
    })
}

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.text, c.likes_count, c.created_at, \
     u.id, u.username, u.full_name, u.avatar_media_id \
     FROM comments c JOIN users u ON u.id = c.user_id";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentView> {
    Ok(CommentView {
        id: row.get(0)?,
        post_id: row.get(1)?,
        text: row.get(2)?,
        likes_count: row.get(3)?,
        created_at: row.get(4)?,
        author: summary_at(row, 5)?,
    })
}

fn query_comments(conn: &Connection, post_id: &str) -> Result<Vec<CommentView>> {
    let sql = format!(
        "{} WHERE c.post_id = ?1 ORDER BY c.created_at, c.rowid",
        COMMENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([post_id], comment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn query_comment(conn: &Connection, comment_id: &str) -> Result<CommentView> {
    let sql = format!("{} WHERE c.id = ?1", COMMENT_SELECT);
    conn.query_row(&sql, [comment_id], comment_from_row)
        .optional()?
        .ok_or(Error::NotFound("comment"))
}

#[cfg(test)]
mod tests {
    use crate::testutil;
    use crate::{Database, Error};
    use vista_types::models::NotificationKind;

    fn live_likes(db: &Database, post_id: &str) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM likes WHERE post_id = ?1", [post_id], |r| {
                r.get(0)
            })?)
        })
        .unwrap()
    }

    #[test]
    fn like_count_tracks_like_rows() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let carol = testutil::user(&db, "carol");
        let media = testutil::image(&db, &alice);
        let post = db.create_post(&alice, &media, "sunset").unwrap();

        for (who, expect) in [(&bob, 1), (&carol, 2), (&bob, 1), (&alice, 2), (&carol, 1)] {
            let state = db.toggle_like(who, &post.id).unwrap();
            assert_eq!(state.likes_count, expect);
            assert_eq!(state.likes_count, live_likes(&db, &post.id));
        }

        // Bob's and Carol's first likes notified Alice; her own like did not.
        let notes = db.list_notifications(&alice, 10).unwrap();
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().all(|n| n.kind == NotificationKind::Like));
        assert_eq!(notes[0].post_id.as_deref(), Some(post.id.as_str()));
    }

    #[test]
    fn comments_update_counter_and_notify_owner() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let media = testutil::image(&db, &alice);
        let post = db.create_post(&alice, &media, "").unwrap();

        assert!(matches!(db.add_comment(&bob, &post.id, "   "), Err(Error::EmptyContent)));
        let comment = db.add_comment(&bob, &post.id, "  nice  ").unwrap();
        assert_eq!(comment.text, "nice");
        assert_eq!(comment.author.username, "bob");
        db.add_comment(&alice, &post.id, "thanks").unwrap();

        let detail = db.post_detail(&bob, &post.id).unwrap();
        assert_eq!(detail.post.comments_count, 2);
        assert_eq!(detail.comments.len(), 2);
        assert_eq!(detail.comments[0].text, "nice");

        let notes = db.list_notifications(&alice, 10).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].comment_id.as_deref(), Some(comment.id.as_str()));

        // A stranger cannot delete it; the post owner can.
        let carol = testutil::user(&db, "carol");
        assert!(matches!(db.delete_comment(&carol, &comment.id), Err(Error::NotFound(_))));
        db.delete_comment(&alice, &comment.id).unwrap();
        assert_eq!(db.post_detail(&bob, &post.id).unwrap().post.comments_count, 1);
    }

    #[test]
    fn comment_likes_toggle_without_notifying() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let media = testutil::image(&db, &alice);
        let post = db.create_post(&alice, &media, "").unwrap();
        let comment = db.add_comment(&alice, &post.id, "first").unwrap();

        assert!(db.toggle_comment_like(&bob, &comment.id).unwrap().liked);
        let off = db.toggle_comment_like(&bob, &comment.id).unwrap();
        assert!(!off.liked);
        assert_eq!(off.likes_count, 0);
        assert!(db.list_notifications(&alice, 10).unwrap().is_empty());
        assert!(matches!(db.toggle_comment_like(&bob, "nope"), Err(Error::NotFound("comment"))));
    }

    #[test]
    fn feed_shows_followed_and_own_posts_with_viewer_flags() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let carol = testutil::user(&db, "carol");
        let a = db.create_post(&alice, &testutil::image(&db, &alice), "a").unwrap();
        let b = db.create_post(&bob, &testutil::image(&db, &bob), "b").unwrap();
        db.create_post(&carol, &testutil::image(&db, &carol), "c").unwrap();

        db.toggle_follow(&alice, "bob").unwrap();
        db.toggle_like(&alice, &b.id).unwrap();
        assert!(db.toggle_save(&alice, &b.id).unwrap().saved);

        let feed = db.feed(&alice, 20).unwrap();
        let ids: Vec<_> = feed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str(), a.id.as_str()]);
        assert!(feed[0].liked_by_me && feed[0].saved_by_me);
        assert!(!feed[1].liked_by_me);

        assert_eq!(db.explore(&alice, 20).unwrap().len(), 3);
        assert_eq!(db.saved_posts(&alice, 20).unwrap()[0].id, b.id);
        assert!(!db.toggle_save(&alice, &b.id).unwrap().saved);
        assert!(db.saved_posts(&alice, 20).unwrap().is_empty());
    }

    #[test]
    fn post_counter_follows_create_and_delete() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let post = db.create_post(&alice, &testutil::image(&db, &alice), "x").unwrap();

        let page = db.profile_page(&bob, "alice", 10).unwrap();
        assert_eq!(page.profile.posts_count, 1);
        assert_eq!(page.posts.len(), 1);
        assert!(!page.is_following);

        assert!(matches!(db.delete_post(&bob, &post.id), Err(Error::NotFound("post"))));
        db.delete_post(&alice, &post.id).unwrap();
        assert_eq!(db.get_user_by_id(&alice).unwrap().unwrap().posts_count, 0);
        assert!(matches!(db.post_detail(&bob, &post.id), Err(Error::NotFound("post"))));
    }

    #[test]
    fn cannot_post_someone_elses_media() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        let bob = testutil::user(&db, "bob");
        let bobs = testutil::image(&db, &bob);
        assert!(matches!(db.create_post(&alice, &bobs, ""), Err(Error::NotFound("media"))));
    }
}
