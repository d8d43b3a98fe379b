//! Type aliases for the concrete DhtHash types

use crate::hash_type;
use crate::DhtHash;

/// The hash of an entry or link entry stored in the DHT.
pub type EntryHash = DhtHash<hash_type::Entry>;

/// Identity of a node. This is the blake2b hash of the node's public signing key.
pub type PeerId = DhtHash<hash_type::Peer>;

/// Deterministic digest of an encoded message, used to skip duplicate replays.
pub type MessageFingerprint = DhtHash<hash_type::Fingerprint>;

/// Any hash with a DHT position; the target of a lookup.
pub type AnyDhtHash = DhtHash<hash_type::AnyDht>;

impl From<EntryHash> for AnyDhtHash {
    fn from(h: EntryHash) -> Self {
        h.retype(hash_type::AnyDht::Entry)
    }
}

impl From<PeerId> for AnyDhtHash {
    fn from(h: PeerId) -> Self {
        h.retype(hash_type::AnyDht::Peer)
    }
}

impl From<&EntryHash> for AnyDhtHash {
    fn from(h: &EntryHash) -> Self {
        h.retype(hash_type::AnyDht::Entry)
    }
}

impl From<&PeerId> for AnyDhtHash {
    fn from(h: &PeerId) -> Self {
        h.retype(hash_type::AnyDht::Peer)
    }
}
