//! # hdht_sqlite
//!
//! The embedded database behind the hdht store. One [`db::DbWrite`] owns one
//! SQLite connection; every write runs inside an exclusive transaction on
//! tokio's blocking pool, so all write paths serialize on it.

pub mod db;
pub mod error;
pub mod schema;
pub mod sql;

pub use rusqlite;

pub mod prelude {
    //! Common imports
    pub use crate::db::{DbKind, DbWrite};
    pub use crate::error::{DatabaseError, DatabaseResult};
    pub use crate::sql::sql_dht;
    pub use rusqlite::{named_params, OptionalExtension, Transaction};
}
