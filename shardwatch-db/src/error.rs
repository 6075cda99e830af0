use thiserror::Error;
use tokio_rusqlite::rusqlite::{self, ErrorCode};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("could not move unreadable database aside: {0}")]
    Quarantine(#[from] std::io::Error),

    #[error("timestamp for server {server:?} is outside the storable range")]
    TimestampOutOfRange { server: String },
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// The file exists but is not a usable SQLite database. Anything else (permissions,
    /// I/O, read-only media) says nothing about the file's contents.
    pub fn is_corrupt_file(&self) -> bool {
        let sqlite = match self {
            DbError::Sqlite(err) => err,
            DbError::Connection(tokio_rusqlite::Error::Error(err)) => err,
            _ => return false,
        };
        matches!(
            sqlite.sqlite_error_code(),
            Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
        )
    }
}
