use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// A UNIQUE, NOT NULL, CHECK or FOREIGN KEY constraint rejected the write.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("database lock poisoned: {0}")]
    Poisoned(String),

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl DbError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Self::Integrity(msg.unwrap_or_else(|| err.to_string()))
            }
            other => Self::Sqlite(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
