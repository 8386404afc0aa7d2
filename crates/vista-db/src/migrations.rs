use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
            r.get(0)
        })?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE media (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind            TEXT NOT NULL CHECK (kind IN ('image', 'video')),
                content_type    TEXT NOT NULL,
                byte_size       INTEGER NOT NULL,
                sha256          TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE COLLATE NOCASE,
                email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password        TEXT NOT NULL,
                full_name       TEXT NOT NULL DEFAULT '',
                bio             TEXT NOT NULL DEFAULT '',
                website         TEXT NOT NULL DEFAULT '',
                phone_number    TEXT NOT NULL DEFAULT '',
                avatar_media_id TEXT REFERENCES media(id) ON DELETE SET NULL,
                is_private      INTEGER NOT NULL DEFAULT 0,
                followers_count INTEGER NOT NULL DEFAULT 0 CHECK (followers_count >= 0),
                following_count INTEGER NOT NULL DEFAULT 0 CHECK (following_count >= 0),
                posts_count     INTEGER NOT NULL DEFAULT 0 CHECK (posts_count >= 0),
                created_at      TEXT NOT NULL
            );

            CREATE TABLE follows (
                follower_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                following_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL,
                PRIMARY KEY (follower_id, following_id),
                CHECK (follower_id <> following_id)
            );

            CREATE INDEX idx_follows_following ON follows(following_id);

            CREATE TABLE posts (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                media_id        TEXT NOT NULL REFERENCES media(id),
                caption         TEXT NOT NULL DEFAULT '',
                likes_count     INTEGER NOT NULL DEFAULT 0 CHECK (likes_count >= 0),
                comments_count  INTEGER NOT NULL DEFAULT 0 CHECK (comments_count >= 0),
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_posts_user ON posts(user_id, created_at);

            CREATE TABLE likes (
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL,
                PRIMARY KEY (user_id, post_id)
            );

            CREATE INDEX idx_likes_post ON likes(post_id);

            CREATE TABLE comments (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                text            TEXT NOT NULL,
                likes_count     INTEGER NOT NULL DEFAULT 0 CHECK (likes_count >= 0),
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);

            CREATE TABLE comment_likes (
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                comment_id      TEXT NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL,
                PRIMARY KEY (user_id, comment_id)
            );

            CREATE TABLE saved_posts (
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL,
                PRIMARY KEY (user_id, post_id)
            );

            CREATE TABLE stories (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                media_id        TEXT NOT NULL REFERENCES media(id),
                text            TEXT NOT NULL DEFAULT '',
                created_at      TEXT NOT NULL,
                expires_at      TEXT NOT NULL
            );

            CREATE INDEX idx_stories_expiry ON stories(expires_at);

            CREATE TABLE conversations (
                id                   TEXT PRIMARY KEY,
                is_group             INTEGER NOT NULL DEFAULT 0,
                group_name           TEXT NOT NULL DEFAULT '',
                group_image_media_id TEXT REFERENCES media(id) ON DELETE SET NULL,
                admin_id             TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at           TEXT NOT NULL,
                updated_at           TEXT NOT NULL,
                CHECK (is_group = 1 OR admin_id IS NULL)
            );

            -- rowid order is join order; admin hand-over relies on it.
            CREATE TABLE conversation_members (
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                joined_at       TEXT NOT NULL,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX idx_members_user ON conversation_members(user_id);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text            TEXT NOT NULL DEFAULT '',
                media_id        TEXT REFERENCES media(id) ON DELETE SET NULL,
                shared_post_id  TEXT REFERENCES posts(id) ON DELETE SET NULL,
                is_system       INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation ON messages(conversation_id, created_at);

            -- One row per (message, reader). Senders never get a row for their own messages.
            CREATE TABLE message_reads (
                message_id      TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                read_at         TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE shares (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                message_id      TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                actor_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind            TEXT NOT NULL CHECK (kind IN ('like', 'comment', 'follow', 'message')),
                post_id         TEXT REFERENCES posts(id) ON DELETE CASCADE,
                comment_id      TEXT REFERENCES comments(id) ON DELETE CASCADE,
                conversation_id TEXT REFERENCES conversations(id) ON DELETE CASCADE,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
