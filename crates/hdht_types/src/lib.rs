//! Types shared by the hdht store and the hdht network layer:
//! status flags and masks, the request message envelope, links and peers.

#![deny(missing_docs)]

pub mod change;
pub mod error;
pub mod get;
pub mod link;
pub mod message;
pub mod peer;
pub mod status;
pub mod timestamp;

/// Common imports
pub mod prelude {
    pub use crate::change::*;
    pub use crate::error::*;
    pub use crate::get::*;
    pub use crate::link::*;
    pub use crate::message::*;
    pub use crate::peer::*;
    pub use crate::status::*;
    pub use crate::timestamp::*;
    pub use hdht_hash::*;
}
