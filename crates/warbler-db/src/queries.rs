use rusqlite::{Connection, Row};
use warbler_types::models::{DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL, UserCounts};

use crate::models::{MessageRow, NewMessage, NewUser, ProfileUpdate, UserRow};
use crate::{Database, DbError, Result};

/// Timeline length on the home page.
pub const TIMELINE_LIMIT: u32 = 100;

pub(crate) const USER_COLUMNS: &str =
    "u.id, u.email, u.username, u.image_url, u.header_image_url, u.bio, u.location, u.password";

// JOIN users to fetch the author in a single query
pub(crate) const MESSAGE_SELECT: &str = "SELECT m.id, m.text, m.timestamp, m.user_id, u.username, u.image_url
     FROM messages m
     JOIN users u ON m.user_id = u.id";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<UserRow> {
        self.with_conn(|conn| {
            let id = insert_user(conn, user)?;
            query_user_by_id(conn, id)?.ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Users whose username contains `q`; every user when `q` is empty.
    pub fn search_users(&self, q: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let pattern = format!("%{}%", escape_like(q));
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 WHERE u.username LIKE ?1 ESCAPE '\\'
                 ORDER BY u.username"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([pattern], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_user(&self, id: i64, update: &ProfileUpdate<'_>) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET username = ?1, email = ?2, image_url = ?3,
                    header_image_url = ?4, bio = ?5, location = ?6
                 WHERE id = ?7",
                rusqlite::params![
                    update.username,
                    update.email,
                    update.image_url.unwrap_or(DEFAULT_IMAGE_URL),
                    update.header_image_url.unwrap_or(DEFAULT_HEADER_IMAGE_URL),
                    update.bio,
                    update.location,
                    id,
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user_by_id(conn, id)
        })
    }

    /// Deletes the user; messages, follow edges and likes go with it.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn user_counts(&self, id: i64) -> Result<UserCounts> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM messages WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_following_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_being_followed_id = ?1),
                    (SELECT COUNT(*) FROM likes WHERE user_id = ?1)",
                [id],
                |row| {
                    Ok(UserCounts {
                        messages: row.get(0)?,
                        following: row.get(1)?,
                        followers: row.get(2)?,
                        likes: row.get(3)?,
                    })
                },
            )?;
            Ok(counts)
        })
    }

    // -- Messages --

    pub fn create_message(&self, message: &NewMessage<'_>) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let id = insert_message(conn, message)?;
            query_message(conn, id)?.ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    pub fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    /// Messages posted by `user_id`, newest first.
    pub fn messages_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.user_id = ?1
                 ORDER BY m.timestamp DESC, m.id DESC
                 LIMIT ?2"
            );
            query_messages(conn, &sql, rusqlite::params![user_id, limit])
        })
    }

    /// Home feed: messages by `user_id` and everyone they follow, newest first.
    pub fn timeline(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.user_id = ?1
                    OR m.user_id IN (
                        SELECT user_being_followed_id FROM follows WHERE user_following_id = ?1
                    )
                 ORDER BY m.timestamp DESC, m.id DESC
                 LIMIT ?2"
            );
            query_messages(conn, &sql, rusqlite::params![user_id, limit])
        })
    }

    pub fn count_messages(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
    }
}

// -- Connection-level helpers, usable inside `Database::transaction` --

pub fn insert_user(conn: &Connection, user: &NewUser<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (id, username, email, password, image_url) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            user.id,
            user.username,
            user.email,
            user.password_hash,
            user.image_url.unwrap_or(DEFAULT_IMAGE_URL),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_message(conn: &Connection, message: &NewMessage<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (id, text, user_id) VALUES (?1, ?2, ?3)",
        rusqlite::params![message.id, message.text, message.user_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([username], user_from_row).optional()
}

pub fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id], user_from_row).optional()
}

pub fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id], message_from_row).optional()
}

pub(crate) fn query_messages(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        image_url: row.get(3)?,
        header_image_url: row.get(4)?,
        bio: row.get(5)?,
        location: row.get(6)?,
        password: row.get(7)?,
    })
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        timestamp: row.get(2)?,
        user_id: row.get(3)?,
        author_username: row.get(4)?,
        author_image_url: row.get(5)?,
    })
}

fn escape_like(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn new_user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            id: None,
            username,
            email,
            password_hash: "HASHED_PASSWORD",
            image_url: None,
        }
    }

    pub(crate) fn post(db: &Database, user_id: i64, text: &str) -> MessageRow {
        db.create_message(&NewMessage {
            id: None,
            text: Some(text),
            user_id,
        })
        .unwrap()
    }

    #[test]
    fn new_user_has_no_messages_or_followers() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("testuser", "test@test.com")).unwrap();

        assert_eq!(user.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(user.header_image_url, DEFAULT_HEADER_IMAGE_URL);
        assert_eq!(db.user_counts(user.id).unwrap(), UserCounts::default());
        assert!(db.messages_for_user(user.id, 10).unwrap().is_empty());
    }

    #[test]
    fn explicit_user_id_is_kept() {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .create_user(&NewUser {
                id: Some(5000),
                ..new_user("test", "test@test.com")
            })
            .unwrap();
        assert_eq!(user.id, 5000);
        assert_eq!(user.username, "test");
        assert!(db.get_user_by_id(5000).unwrap().is_some());
    }

    #[test]
    fn duplicate_username_is_integrity_error() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("test", "test@test.com")).unwrap();

        let err = db
            .create_user(&new_user("test", "other@test.com"))
            .err()
            .unwrap();
        assert!(err.is_integrity(), "got {err:?}");
    }

    #[test]
    fn duplicate_email_is_integrity_error() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("test", "test@test.com")).unwrap();

        let err = db
            .create_user(&new_user("other", "test@test.com"))
            .err()
            .unwrap();
        assert!(err.is_integrity(), "got {err:?}");
    }

    #[test]
    fn conflicting_signups_in_one_transaction_roll_back() {
        let db = Database::open_in_memory().unwrap();

        let result = db.transaction(|tx| {
            insert_user(tx, &new_user("test", "test@test.com"))?;
            insert_user(tx, &new_user("test", "test@test.com"))?;
            Ok(())
        });

        assert!(result.unwrap_err().is_integrity());
        assert!(db.get_user_by_username("test").unwrap().is_none());
    }

    #[test]
    fn transaction_commits_on_success() {
        let db = Database::open_in_memory().unwrap();
        let ids = db
            .transaction(|tx| {
                let a = insert_user(tx, &new_user("a", "a@test.com"))?;
                let b = insert_user(tx, &new_user("b", "b@test.com"))?;
                Ok((a, b))
            })
            .unwrap();
        assert_ne!(ids.0, ids.1);
        assert!(db.get_user_by_username("a").unwrap().is_some());
        assert!(db.get_user_by_username("b").unwrap().is_some());
    }

    #[test]
    fn message_without_text_is_integrity_error() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("testuser", "test@test.com")).unwrap();

        let err = db
            .create_message(&NewMessage {
                id: None,
                text: None,
                user_id: user.id,
            })
            .err()
            .unwrap();
        assert!(err.is_integrity(), "got {err:?}");
        assert_eq!(db.count_messages().unwrap(), 0);
    }

    #[test]
    fn blank_message_is_integrity_error() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("testuser", "test@test.com")).unwrap();

        for blank in ["", "   "] {
            let err = db
                .create_message(&NewMessage {
                    id: None,
                    text: Some(blank),
                    user_id: user.id,
                })
                .err()
                .unwrap();
            assert!(err.is_integrity(), "got {err:?}");
        }
        assert_eq!(db.count_messages().unwrap(), 0);
    }

    #[test]
    fn overlong_message_is_integrity_error() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("testuser", "test@test.com")).unwrap();
        let text = "x".repeat(141);

        let err = db
            .create_message(&NewMessage {
                id: None,
                text: Some(&text),
                user_id: user.id,
            })
            .err()
            .unwrap();
        assert!(err.is_integrity());

        let text = "x".repeat(140);
        assert_eq!(post(&db, user.id, &text).text.len(), 140);
    }

    #[test]
    fn message_for_missing_user_is_integrity_error() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .create_message(&NewMessage {
                id: None,
                text: Some("orphan"),
                user_id: 42,
            })
            .err()
            .unwrap();
        assert!(err.is_integrity());
    }

    #[test]
    fn message_roundtrip_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("testuser", "test@test.com")).unwrap();
        let msg = post(&db, user.id, "Hello!");

        let fetched = db.get_message(msg.id).unwrap().unwrap();
        assert_eq!(fetched.text, "Hello!");
        assert_eq!(fetched.author_username, "testuser");
        assert_eq!(fetched.to_model().user_id, user.id);

        assert!(db.delete_message(msg.id).unwrap());
        assert!(!db.delete_message(msg.id).unwrap());
        assert!(db.get_message(msg.id).unwrap().is_none());
    }

    #[test]
    fn messages_for_user_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("testuser", "test@test.com")).unwrap();
        post(&db, user.id, "first");
        post(&db, user.id, "second");

        let texts: Vec<String> = db
            .messages_for_user(user.id, 10)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["second", "first"]);
    }

    #[test]
    fn search_matches_substring_and_escapes_wildcards() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("alice", "a@test.com")).unwrap();
        db.create_user(&new_user("malik", "m@test.com")).unwrap();
        db.create_user(&new_user("bob", "b@test.com")).unwrap();

        let names = |q: &str| -> Vec<String> {
            db.search_users(q)
                .unwrap()
                .into_iter()
                .map(|u| u.username)
                .collect()
        };
        assert_eq!(names("li"), vec!["alice", "malik"]);
        assert_eq!(names(""), vec!["alice", "bob", "malik"]);
        assert!(names("%").is_empty());
    }

    #[test]
    fn update_user_enforces_uniqueness() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user(&new_user("a", "a@test.com")).unwrap();
        db.create_user(&new_user("b", "b@test.com")).unwrap();

        let update = ProfileUpdate {
            username: "a2",
            email: "a@test.com",
            image_url: None,
            header_image_url: Some("/static/images/other.jpg"),
            bio: Some("hi"),
            location: None,
        };
        let updated = db.update_user(a.id, &update).unwrap().unwrap();
        assert_eq!(updated.username, "a2");
        assert_eq!(updated.bio.as_deref(), Some("hi"));
        assert_eq!(updated.header_image_url, "/static/images/other.jpg");

        let clash = ProfileUpdate {
            username: "b",
            ..update
        };
        assert!(db.update_user(a.id, &clash).unwrap_err().is_integrity());
        assert!(db.update_user(999, &update).unwrap().is_none());
    }
}
