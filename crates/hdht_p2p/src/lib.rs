//! The hdht network layer.
//!
//! A [`Dht`] node ties a [`hdht_state::prelude::DhtStore`] to the network:
//! it keeps a Kademlia [`RoutingTable`], finds the peers nearest a key with
//! an iterative [`Lookup`], pushes local changes to those peers, answers
//! their requests, and converges with them through [`DhtGossip`] rounds
//! over the change log.

mod types;
pub use types::*;

mod timeout;
pub use timeout::*;

pub mod config;
pub mod dht;
pub mod gossip;
pub mod host;
pub mod identity;
pub mod lookup;
pub mod routing;
pub mod transport;
pub mod transport_mem;
pub mod wire;

pub use config::{HdhtConfig, HdhtTuningParams};
pub use dht::{ChangeReport, Dht, RetryOutcome};
pub use gossip::{DhtGossip, GossipReport};
pub use lookup::{Lookup, QueryStep};
pub use routing::{RoutingTable, RoutingUpdate};

pub mod prelude {
    //! Common imports
    pub use crate::config::*;
    pub use crate::dht::*;
    pub use crate::gossip::*;
    pub use crate::host::*;
    pub use crate::identity::*;
    pub use crate::lookup::*;
    pub use crate::routing::*;
    pub use crate::transport::*;
    pub use crate::transport_mem::*;
    pub use crate::types::*;
    pub use crate::wire::*;
    pub use crate::HdhtTimeout;
    pub use hdht_state::prelude::*;
}
