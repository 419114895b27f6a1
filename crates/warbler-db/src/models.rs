//! Database row types. These map directly to SQLite rows.
//! Distinct from warbler-types API models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use warbler_types::models::{Follow, Like, Message, User};

#[cfg_attr(test, derive(Debug))]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub password: String,
}

impl UserRow {
    pub fn into_model(self) -> User {
        User {
            id: self.id,
            email: self.email,
            username: self.username,
            image_url: self.image_url,
            header_image_url: self.header_image_url,
            bio: self.bio,
            location: self.location,
        }
    }
}

pub struct MessageRow {
    pub id: i64,
    pub text: String,
    pub timestamp: String,
    pub user_id: i64,
    pub author_username: String,
    pub author_image_url: String,
}

impl MessageRow {
    pub fn to_model(&self) -> Message {
        Message {
            id: self.id,
            text: self.text.clone(),
            timestamp: parse_timestamp(&self.timestamp).unwrap_or_else(|| {
                warn!("Corrupt timestamp '{}' on message {}", self.timestamp, self.id);
                DateTime::default()
            }),
            user_id: self.user_id,
        }
    }
}

pub struct FollowRow {
    pub user_being_followed_id: i64,
    pub user_following_id: i64,
}

impl From<FollowRow> for Follow {
    fn from(row: FollowRow) -> Self {
        Follow {
            user_being_followed_id: row.user_being_followed_id,
            user_following_id: row.user_following_id,
        }
    }
}

pub struct LikeRow {
    pub id: i64,
    pub user_id: i64,
    pub message_id: i64,
}

impl From<LikeRow> for Like {
    fn from(row: LikeRow) -> Self {
        Like {
            id: row.id,
            user_id: row.user_id,
            message_id: row.message_id,
        }
    }
}

/// Insert payload for `users`. `id` is normally left to SQLite.
pub struct NewUser<'a> {
    pub id: Option<i64>,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub image_url: Option<&'a str>,
}

/// Insert payload for `messages`. A `None` text is passed through as NULL
/// so the NOT NULL constraint rejects it.
pub struct NewMessage<'a> {
    pub id: Option<i64>,
    pub text: Option<&'a str>,
    pub user_id: i64,
}

pub struct ProfileUpdate<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub image_url: Option<&'a str>,
    pub header_image_url: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub location: Option<&'a str>,
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok().or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|ndt| ndt.and_utc())
    })
}
