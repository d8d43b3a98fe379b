//! The status-tagged DHT store.
//!
//! Holds entries with their status and source, an append-only link event
//! log, the monotonic change log that gossip replays from, the message
//! fingerprint index, gossip cursors and peer lists. All reads and writes
//! go through [`store::DhtStore`].

pub mod dump;
pub mod error;
pub mod mutations;
pub mod query;
pub mod store;

pub mod prelude {
    //! Common imports
    pub use crate::dump::*;
    pub use crate::error::*;
    pub use crate::store::*;
    pub use hdht_sqlite::prelude::{DbKind, DbWrite};
    pub use hdht_types::prelude::*;
}
