//! Follow edges and likes.

use std::collections::HashSet;

use rusqlite::Connection;

use warbler_types::models::{Follow, Like};

use crate::models::{FollowRow, LikeRow, MessageRow, UserRow};
use crate::queries::{MESSAGE_SELECT, OptionalExt, USER_COLUMNS, query_messages, user_from_row};
use crate::{Database, Result};

impl Database {
    // -- Follows --

    /// Record that `follower_id` follows `followed_id`. An existing edge is
    /// rejected by the composite key as an integrity error.
    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<()> {
        self.with_conn(|conn| insert_follow(conn, follower_id, followed_id))
    }

    /// Returns false when there was no edge to remove.
    pub fn stop_following(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM follows WHERE user_following_id = ?1 AND user_being_followed_id = ?2",
                [follower_id, followed_id],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Does `user_id` follow `other_id`?
    pub fn is_following(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| query_follow_exists(conn, user_id, other_id))
    }

    /// Is `user_id` followed by `other_id`?
    pub fn is_followed_by(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| query_follow_exists(conn, other_id, user_id))
    }

    /// Users that `user_id` follows.
    pub fn following(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM follows f
                 JOIN users u ON u.id = f.user_being_followed_id
                 WHERE f.user_following_id = ?1
                 ORDER BY u.username"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users following `user_id`.
    pub fn followers(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM follows f
                 JOIN users u ON u.id = f.user_following_id
                 WHERE f.user_being_followed_id = ?1
                 ORDER BY u.username"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn following_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT user_being_followed_id FROM follows WHERE user_following_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<HashSet<i64>, _>>()?;
            Ok(ids)
        })
    }

    pub fn get_follows(&self) -> Result<Vec<Follow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_being_followed_id, user_following_id FROM follows")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(FollowRow {
                        user_being_followed_id: row.get(0)?,
                        user_following_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(Follow::from).collect())
        })
    }

    // -- Likes --

    pub fn add_like(&self, user_id: i64, message_id: i64) -> Result<Like> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)",
                [user_id, message_id],
            )?;
            Ok(Like::from(LikeRow {
                id: conn.last_insert_rowid(),
                user_id,
                message_id,
            }))
        })
    }

    /// Like the message if not yet liked, otherwise remove the like.
    /// Returns whether the message is liked afterwards.
    pub fn toggle_like(&self, user_id: i64, message_id: i64) -> Result<bool> {
        self.transaction(|tx| {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM likes WHERE user_id = ?1 AND message_id = ?2",
                    [user_id, message_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(like_id) = existing {
                tx.execute("DELETE FROM likes WHERE id = ?1", [like_id])?;
                Ok(false)
            } else {
                tx.execute(
                    "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)",
                    [user_id, message_id],
                )?;
                Ok(true)
            }
        })
    }

    pub fn has_liked(&self, user_id: i64, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM likes WHERE user_id = ?1 AND message_id = ?2",
                    [user_id, message_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn likes_for_message(&self, message_id: i64) -> Result<Vec<Like>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, user_id, message_id FROM likes WHERE message_id = ?1")?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(LikeRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        message_id: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(Like::from).collect())
        })
    }

    /// Messages `user_id` has liked, newest message first.
    pub fn liked_messages(&self, user_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 JOIN likes l ON l.message_id = m.id
                 WHERE l.user_id = ?1
                 ORDER BY m.timestamp DESC, m.id DESC"
            );
            query_messages(conn, &sql, [user_id])
        })
    }

    pub fn liked_message_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT message_id FROM likes WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<HashSet<i64>, _>>()?;
            Ok(ids)
        })
    }
}

pub fn insert_follow(conn: &Connection, follower_id: i64, followed_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO follows (user_being_followed_id, user_following_id) VALUES (?1, ?2)",
        [followed_id, follower_id],
    )?;
    Ok(())
}

fn query_follow_exists(conn: &Connection, follower_id: i64, followed_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM follows WHERE user_following_id = ?1 AND user_being_followed_id = ?2",
            [follower_id, followed_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
