/// Errors raised by the SQLite persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {message}")]
    Sqlite { message: String },

    #[error("migration v{version:03} failed: {reason}")]
    MigrationFailed { version: u32, reason: String },

    #[error("backup failed: {0}")]
    BackupFailed(String),

    #[error("accessor is closed")]
    Closed,

    #[error("vector index unavailable: {0}")]
    VectorUnavailable(String),

    #[error("row not found: {table}/{id}")]
    NotFound { table: &'static str, id: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite {
            message: e.to_string(),
        }
    }
}
