use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use vista_types::api::{ConversationDetail, ConversationSummary, MessageView, UserSummary};
use vista_types::models::{NotificationKind, media_url};

use crate::conversation::{ConversationState, Effect, Group, Member};
use crate::error::{Error, Result};
use crate::media::require_owned;
use crate::models::{summary_at, summary_columns};
use crate::notifications::{Target, notify};
use crate::users::{MIN_QUERY_LEN, like_pattern, query_user, require_user_by_username};
use crate::{Database, new_id};

const MAX_GROUP_NAME: usize = 100;
const GROUP_SEARCH_LIMIT: u32 = 10;

/// Message columns as seen by the viewer bound at `viewer`. `is_read` means
/// "I have read it" for others' messages and "someone has read it" for
/// the viewer's own.
fn message_select(viewer: &str) -> String {
    format!(
        "SELECT m.id, m.conversation_id, m.text, m.media_id, m.shared_post_id, m.is_system, \
         CASE WHEN m.sender_id = {v} \
              THEN EXISTS (SELECT 1 FROM message_reads r WHERE r.message_id = m.id) \
              ELSE EXISTS (SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.user_id = {v}) \
         END, \
         m.created_at, u.id, u.username, u.full_name, u.avatar_media_id \
         FROM messages m JOIN users u ON u.id = m.sender_id",
        v = viewer
    )
}

/// Content of an outgoing message.
#[derive(Debug, Default)]
struct Outgoing<'a> {
    text: &'a str,
    media_id: Option<&'a str>,
    shared_post_id: Option<&'a str>,
    is_system: bool,
}

impl Database {
    // -- Conversation lifecycle --

    /// Start a conversation with `usernames`. Unknown handles are dropped.
    /// A two-person conversation is reused if one already exists.
    pub fn create_conversation(&self, requester_id: &str, usernames: &[String]) -> Result<String> {
        self.with_tx(|tx| {
            let requester = require_member(tx, requester_id)?;
            let targets = resolve_members(tx, usernames)?;
            let state = ConversationState::from_participants(requester, targets)?;

            if let ConversationState::Direct(pair) = &state {
                let (a, b) = pair.user_ids();
                if let Some(existing) = find_direct(tx, a, b)? {
                    debug!("Reusing direct conversation {}", existing);
                    return Ok(existing);
                }
            }

            insert_conversation(tx, &state, "", None)
        })
    }

    /// Create a group administered by the requester. Unknown handles are skipped.
    pub fn create_group(
        &self,
        requester_id: &str,
        name: &str,
        usernames: &[String],
        image_media_id: Option<&str>,
    ) -> Result<String> {
        let name: String = name.trim().chars().take(MAX_GROUP_NAME).collect();
        self.with_tx(|tx| {
            let requester = require_member(tx, requester_id)?;
            if let Some(media_id) = image_media_id {
                require_owned(tx, media_id, requester_id, None)?;
            }
            let others = resolve_members(tx, usernames)?;
            let state = ConversationState::GroupActive(Group::new(requester, others));
            insert_conversation(tx, &state, &name, image_media_id)
        })
    }

    pub fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
        media_id: Option<&str>,
    ) -> Result<MessageView> {
        let text = text.trim();
        self.with_tx(|tx| {
            let state = load_state(tx, conversation_id)?;
            state.check_sender(sender_id)?;
            if text.is_empty() && media_id.is_none() {
                return Err(Error::EmptyContent);
            }
            if let Some(media_id) = media_id {
                require_owned(tx, media_id, sender_id, None)?;
            }

            let outgoing = Outgoing {
                text,
                media_id,
                ..Default::default()
            };
            let message_id = insert_message(tx, conversation_id, sender_id, &outgoing)?;
            fan_out(tx, &state, conversation_id, sender_id)?;
            query_message(tx, &message_id, sender_id)
        })
    }

    /// Drop a post into a conversation as a message that references it.
    pub fn share_post(&self, sender_id: &str, post_id: &str, conversation_id: &str) -> Result<MessageView> {
        self.with_tx(|tx| {
            let state = load_state(tx, conversation_id)?;
            state.check_sender(sender_id)?;
            let post_exists = tx
                .query_row("SELECT 1 FROM posts WHERE id = ?1", [post_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !post_exists {
                return Err(Error::NotFound("post"));
            }

            let outgoing = Outgoing {
                shared_post_id: Some(post_id),
                ..Default::default()
            };
            let message_id = insert_message(tx, conversation_id, sender_id, &outgoing)?;
            tx.execute(
                "INSERT INTO shares (id, user_id, post_id, conversation_id, message_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![new_id(), sender_id, post_id, conversation_id, message_id, Utc::now()],
            )?;
            fan_out(tx, &state, conversation_id, sender_id)?;

            info!("Post {} shared into {} by {}", post_id, conversation_id, sender_id);
            query_message(tx, &message_id, sender_id)
        })
    }

    pub fn remove_group_member(&self, conversation_id: &str, actor_id: &str, username: &str) -> Result<()> {
        self.with_tx(|tx| {
            let state = load_state(tx, conversation_id)?;
            state.check_admin(actor_id)?;
            let target = member_of(&require_user_by_username(tx, username)?);
            let transition = state.remove_member(actor_id, &target)?;
            apply(tx, conversation_id, &transition.effects)?;
            info!("{} removed {} from {}", actor_id, target.user_id, conversation_id);
            Ok(())
        })
    }

    /// Returns true when the leaver was the last member and the group is gone.
    pub fn leave_group(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let state = load_state(tx, conversation_id)?;
            let transition = state.leave(user_id)?;
            apply(tx, conversation_id, &transition.effects)?;

            let deleted = transition.state == ConversationState::Deleted;
            info!("{} left {} (deleted: {})", user_id, conversation_id, deleted);
            Ok(deleted)
        })
    }

    pub fn delete_group(&self, conversation_id: &str, actor_id: &str) -> Result<()> {
        self.with_tx(|tx| {
            let state = load_state(tx, conversation_id)?;
            let transition = state.delete(actor_id)?;
            apply(tx, conversation_id, &transition.effects)?;
            info!("{} deleted group {}", actor_id, conversation_id);
            Ok(())
        })
    }

    /// Returns the handles actually added.
    pub fn add_group_members(
        &self,
        conversation_id: &str,
        actor_id: &str,
        usernames: &[String],
    ) -> Result<Vec<String>> {
        self.with_tx(|tx| {
            let state = load_state(tx, conversation_id)?;
            state.check_admin(actor_id)?;
            let candidates = resolve_members(tx, usernames)?;
            let transition = state.add_members(actor_id, candidates)?;
            apply(tx, conversation_id, &transition.effects)?;

            let added: Vec<String> = transition.added().map(|m| m.username.clone()).collect();
            if !added.is_empty() {
                info!("{} added {:?} to {}", actor_id, added, conversation_id);
            }
            Ok(added)
        })
    }

    /// Current state of a conversation, mainly for inspection and tests.
    pub fn conversation_state(&self, conversation_id: &str) -> Result<ConversationState> {
        self.with_conn(|conn| match load_state(conn, conversation_id) {
            Err(Error::NotFound(_)) => Ok(ConversationState::Deleted),
            other => other,
        })
    }

    // -- Conversation reads --

    /// Conversations `user_id` belongs to, most recently active first.
    pub fn list_conversations(&self, user_id: &str, limit: u32) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id FROM conversations c
                 JOIN conversation_members cm ON cm.conversation_id = c.id
                 WHERE cm.user_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC
                 LIMIT ?2",
            )?;
            let ids = stmt
                .query_map(params![user_id, limit], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            ids.iter()
                .map(|id| summarize(conn, id, user_id))
                .collect()
        })
    }

    /// Members plus the latest `limit` messages, oldest first. Messages from
    /// others are marked read for the viewer.
    pub fn conversation_detail(
        &self,
        conversation_id: &str,
        viewer_id: &str,
        limit: u32,
    ) -> Result<ConversationDetail> {
        self.with_tx(|tx| {
            let state = load_state(tx, conversation_id)?;
            if !state.is_member(viewer_id) {
                return Err(Error::NotAMember);
            }

            let marked = tx.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                 SELECT id, ?2, ?3 FROM messages
                 WHERE conversation_id = ?1 AND sender_id <> ?2",
                params![conversation_id, viewer_id, Utc::now()],
            )?;
            if marked > 0 {
                debug!("Marked {} messages read in {}", marked, conversation_id);
            }

            let sql = format!(
                "{} WHERE m.conversation_id = ?1 ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?2",
                message_select("?3")
            );
            let mut stmt = tx.prepare(&sql)?;
            let mut messages = stmt
                .query_map(params![conversation_id, limit, viewer_id], |row| message_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            messages.reverse();

            Ok(ConversationDetail {
                conversation: summarize(tx, conversation_id, viewer_id)?,
                messages,
            })
        })
    }

    /// Candidates to add to a group: handle/full-name matches who are not
    /// already members.
    pub fn search_users_for_group(
        &self,
        conversation_id: &str,
        viewer_id: &str,
        query: &str,
    ) -> Result<Vec<UserSummary>> {
        let query = query.trim();
        self.with_conn(|conn| {
            let state = load_state(conn, conversation_id)?;
            if !state.is_group() {
                return Err(Error::NotFound("group"));
            }
            if !state.is_member(viewer_id) {
                return Err(Error::NotAMember);
            }
            if query.chars().count() < MIN_QUERY_LEN {
                return Ok(vec![]);
            }

            let sql = format!(
                "SELECT {} FROM users u
                 WHERE (u.username LIKE ?2 ESCAPE '\\' OR u.full_name LIKE ?2 ESCAPE '\\')
                   AND u.id NOT IN (SELECT user_id FROM conversation_members WHERE conversation_id = ?1)
                 ORDER BY u.username
                 LIMIT ?3",
                summary_columns("u")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![conversation_id, like_pattern(query), GROUP_SEARCH_LIMIT],
                    |row| summary_at(row, 0),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

fn member_of(user: &crate::models::UserRow) -> Member {
    Member::new(user.id.clone(), user.username.clone())
}

fn require_member(conn: &Connection, user_id: &str) -> Result<Member> {
    query_user(conn, "id", user_id)?
        .map(|u| member_of(&u))
        .ok_or(Error::NotFound("user"))
}

/// Look up each handle, silently dropping the ones that do not exist.
fn resolve_members(conn: &Connection, usernames: &[String]) -> Result<Vec<Member>> {
    let mut members = Vec::with_capacity(usernames.len());
    for username in usernames {
        let username = username.trim();
        if username.is_empty() {
            continue;
        }
        match query_user(conn, "username", username)? {
            Some(user) => members.push(member_of(&user)),
            None => debug!("Skipping unknown user '{}'", username),
        }
    }
    Ok(members)
}

pub(crate) fn load_state(conn: &Connection, conversation_id: &str) -> Result<ConversationState> {
    let (is_group, admin_id): (bool, Option<String>) = conn
        .query_row(
            "SELECT is_group, admin_id FROM conversations WHERE id = ?1",
            [conversation_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
        .ok_or(Error::NotFound("conversation"))?;

    let mut stmt = conn.prepare(
        "SELECT u.id, u.username FROM conversation_members cm
         JOIN users u ON u.id = cm.user_id
         WHERE cm.conversation_id = ?1
         ORDER BY cm.rowid",
    )?;
    let members = stmt
        .query_map([conversation_id], |r| Ok(Member::new(r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    ConversationState::load(is_group, admin_id.as_deref(), members)
}

fn find_direct(conn: &Connection, a: &str, b: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT c.id FROM conversations c
             WHERE c.is_group = 0
               AND EXISTS (SELECT 1 FROM conversation_members WHERE conversation_id = c.id AND user_id = ?1)
               AND EXISTS (SELECT 1 FROM conversation_members WHERE conversation_id = c.id AND user_id = ?2)
               AND (SELECT COUNT(*) FROM conversation_members WHERE conversation_id = c.id) = 2
             ORDER BY c.created_at
             LIMIT 1",
            params![a, b],
            |r| r.get(0),
        )
        .optional()?)
}

fn insert_conversation(
    conn: &Connection,
    state: &ConversationState,
    group_name: &str,
    image_media_id: Option<&str>,
) -> Result<String> {
    let id = new_id();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO conversations (id, is_group, group_name, group_image_media_id, admin_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id,
            state.is_group(),
            group_name,
            image_media_id,
            state.admin().map(|m| m.user_id.as_str()),
            now,
        ],
    )?;
    for member in state.members() {
        add_member(conn, &id, &member.user_id)?;
    }

    info!(
        "Conversation {} created (group: {}, members: {})",
        id,
        state.is_group(),
        state.members().len()
    );
    Ok(id)
}

fn add_member(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO conversation_members (conversation_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        params![conversation_id, user_id, Utc::now()],
    )?;
    Ok(())
}

/// Persist the effects of one transition, in order.
fn apply(conn: &Connection, conversation_id: &str, effects: &[Effect]) -> Result<()> {
    for effect in effects {
        match effect {
            Effect::AddMember(member) => add_member(conn, conversation_id, &member.user_id)?,
            Effect::RemoveMember(user_id) => {
                conn.execute(
                    "DELETE FROM conversation_members WHERE conversation_id = ?1 AND user_id = ?2",
                    params![conversation_id, user_id],
                )?;
            }
            Effect::SetAdmin(user_id) => {
                conn.execute(
                    "UPDATE conversations SET admin_id = ?2 WHERE id = ?1",
                    params![conversation_id, user_id],
                )?;
            }
            Effect::SystemMessage { sender_id, text } => {
                let outgoing = Outgoing {
                    text: text.as_str(),
                    is_system: true,
                    ..Default::default()
                };
                insert_message(conn, conversation_id, sender_id, &outgoing)?;
            }
            Effect::DeleteConversation => {
                conn.execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
            }
        }
    }
    Ok(())
}

/// Append a message and bump the conversation's activity timestamp.
fn insert_message(
    conn: &Connection,
    conversation_id: &str,
    sender_id: &str,
    outgoing: &Outgoing<'_>,
) -> Result<String> {
    let id = new_id();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, text, media_id, shared_post_id, is_system, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            conversation_id,
            sender_id,
            outgoing.text,
            outgoing.media_id,
            outgoing.shared_post_id,
            outgoing.is_system,
            now,
        ],
    )?;
    conn.execute(
        "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
        params![conversation_id, now],
    )?;
    Ok(id)
}

/// One `message` notification per current member other than the sender.
fn fan_out(conn: &Connection, state: &ConversationState, conversation_id: &str, sender_id: &str) -> Result<()> {
    let target = Target {
        conversation_id: Some(conversation_id),
        ..Default::default()
    };
    for member in state.members().iter().filter(|m| m.user_id != sender_id) {
        notify(conn, &member.user_id, sender_id, NotificationKind::Message, target)?;
    }
    Ok(())
}

fn message_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<MessageView> {
    let media_id: Option<String> = row.get(start + 3)?;
    Ok(MessageView {
        id: row.get(start)?,
        conversation_id: row.get(start + 1)?,
        text: row.get(start + 2)?,
        media_url: media_id.as_deref().map(media_url),
        shared_post_id: row.get(start + 4)?,
        is_system: row.get(start + 5)?,
        is_read: row.get(start + 6)?,
        created_at: row.get(start + 7)?,
        sender: summary_at(row, start + 8)?,
    })
}

fn query_message(conn: &Connection, message_id: &str, viewer_id: &str) -> Result<MessageView> {
    let sql = format!("{} WHERE m.id = ?1", message_select("?2"));
    conn.query_row(&sql, [message_id, viewer_id], |row| message_from_row(row, 0))
        .optional()?
        .ok_or(Error::NotFound("message"))
}

fn summarize(conn: &Connection, conversation_id: &str, viewer_id: &str) -> Result<ConversationSummary> {
    let (is_group, group_name, image, admin_id, updated_at): (
        bool,
        String,
        Option<String>,
        Option<String>,
        chrono::DateTime<Utc>,
    ) = conn
        .query_row(
            "SELECT is_group, group_name, group_image_media_id, admin_id, updated_at
             FROM conversations WHERE id = ?1",
            [conversation_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?
        .ok_or(Error::NotFound("conversation"))?;

    let sql = format!(
        "SELECT {} FROM conversation_members cm JOIN users u ON u.id = cm.user_id
         WHERE cm.conversation_id = ?1
         ORDER BY cm.rowid",
        summary_columns("u")
    );
    let mut stmt = conn.prepare(&sql)?;
    let members = stmt
        .query_map([conversation_id], |row| summary_at(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let admin = admin_id.and_then(|id| members.iter().find(|m| m.id == id).cloned());

    let sql = format!(
        "{} WHERE m.conversation_id = ?1 ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1",
        message_select("?2")
    );
    let last_message = conn
        .query_row(&sql, [conversation_id, viewer_id], |row| message_from_row(row, 0))
        .optional()?;

    let has_unread: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM messages m
                        WHERE m.conversation_id = ?1 AND m.sender_id <> ?2
                          AND NOT EXISTS (SELECT 1 FROM message_reads r
                                          WHERE r.message_id = m.id AND r.user_id = ?2))",
        params![conversation_id, viewer_id],
        |r| r.get(0),
    )?;

    Ok(ConversationSummary {
        id: conversation_id.to_string(),
        is_group,
        group_name,
        group_image_url: image.as_deref().map(media_url),
        admin,
        members,
        last_message,
        has_unread,
        updated_at,
    })
}
