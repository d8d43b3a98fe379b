//! All possible errors when working with SQLite databases

// missing_docs allowed here since the errors already have self-descriptive strings
#![allow(missing_docs)]

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database directory does not exist and could not be created: {0}")]
    EnvironmentMissing(PathBuf),

    #[error("Database {0} has schema version {1}, newer than this build understands")]
    SchemaTooNew(String, usize),

    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Database task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
