use hdht_hash::EntryHash;
use hdht_sqlite::error::DatabaseError;
use hdht_types::error::SerializationError;
use thiserror::Error;

/// Errors from the store. The first group is the part callers branch on;
/// the rest wrap failures of the underlying machinery.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("hash not found")]
    HashNotFound,

    #[error("hash deleted")]
    HashDeleted,

    /// Carries the hash that replaced the requested one.
    #[error("hash modified, replaced by {0}")]
    HashModified(EntryHash),

    #[error("hash rejected")]
    HashRejected,

    #[error("link not found")]
    LinkNotFound,

    /// Not raised: re-adding a deleted link resurrects it.
    #[error("put link over deleted link")]
    PutLinkOverDeleted,

    #[error("no change at index {0}")]
    NoSuchChangeIndex(u64),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Hash(#[from] hdht_hash::error::HashError),

    #[error("stored status {0} is not a valid status flag")]
    BadStatus(i64),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<hdht_sqlite::rusqlite::Error> for StateError {
    fn from(e: hdht_sqlite::rusqlite::Error) -> Self {
        StateError::Database(e.into())
    }
}

pub type StateResult<T> = Result<T, StateError>;
