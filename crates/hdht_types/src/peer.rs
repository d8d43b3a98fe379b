//! Peer addressing and peer list records.

use hdht_hash::PeerId;
use serde::{Deserialize, Serialize};
use url2::Url2;

/// A peer id with the addresses it can be reached at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    /// The peer's id.
    pub id: PeerId,
    /// Transport addresses.
    pub addrs: Vec<Url2>,
}

impl PeerInfo {
    /// Construct.
    pub fn new(id: PeerId, addrs: Vec<Url2>) -> Self {
        Self { id, addrs }
    }
}

/// The kinds of peer list a node keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerListType {
    /// Peers whose requests are refused and who are never gossiped with.
    Blocked,
}

impl PeerListType {
    /// Stable name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerListType::Blocked => "blockedlist",
        }
    }
}

/// One entry in a peer list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerRecord {
    /// The listed peer.
    pub id: PeerId,
    /// Justification for the listing, opaque to the DHT.
    pub warrant: String,
}
