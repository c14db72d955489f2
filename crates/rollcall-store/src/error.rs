use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("student id '{0}' is already enrolled")]
    Duplicate(String),
    #[error("student not found: {0}")]
    NotFound(i64),
    #[error("photo missing: {0}")]
    PhotoMissing(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
