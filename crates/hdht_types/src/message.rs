//! The request message every node exchanges, and its typed bodies.

use crate::error::{decode, encode, SerializationResult};
use crate::status::{GetMask, StatusMask};
use crate::timestamp::Timestamp;
use hdht_hash::{AnyDhtHash, EntryHash, MessageFingerprint, PeerId};
use serde::{Deserialize, Serialize};

/// Discriminant of a [`Body`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum MsgType {
    /// Store a new entry.
    Put,
    /// Mark an entry deleted.
    Del,
    /// Mark an entry replaced by another.
    Mod,
    /// Add or remove a link.
    Link,
    /// Read an entry.
    Get,
    /// Read the links under a base.
    GetLinks,
    /// Exchange change log ranges.
    Gossip,
    /// Find peers closer to a target.
    FindNode,
}

impl MsgType {
    /// True for the types that mutate the store and are held by the DHT.
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Put | Self::Del | Self::Mod | Self::Link)
    }
}

/// Body of a change request.
///
/// - Put: `entry_hash` is the new entry.
/// - Del: `entry_hash` is the deleted entry, `related_hash` the deletion entry if any.
/// - Mod: `entry_hash` is the replaced entry, `related_hash` its replacement.
/// - Link: `entry_hash` is the link entry, `related_hash` the link base.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldReq {
    /// The entry the change is about.
    pub entry_hash: EntryHash,
    /// Secondary hash, meaning depends on the message type.
    pub related_hash: Option<EntryHash>,
}

/// Body of a GET request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GetReq {
    /// The entry to read.
    pub hash: EntryHash,
    /// Which statuses are acceptable.
    pub status_mask: StatusMask,
    /// Which fields to return.
    pub field_mask: GetMask,
}

/// Body of a GETLINKS request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkQuery {
    /// The base the links hang off.
    pub base: EntryHash,
    /// Tag to select; empty means all tags.
    pub tag: String,
    /// Which link statuses are acceptable.
    pub status_mask: StatusMask,
}

/// Body of a GOSSIP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GossipReq {
    /// The initiator's own latest change index.
    pub my_idx: u64,
    /// First change index the initiator wants from the responder.
    pub your_idx: u64,
}

/// Body of a FINDNODE request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FindNodeReq {
    /// The position in the DHT to find peers near.
    pub target: AnyDhtHash,
}

/// Typed request bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum Body {
    /// Store a new entry.
    Put(HoldReq),
    /// Mark an entry deleted.
    Del(HoldReq),
    /// Mark an entry replaced.
    Mod(HoldReq),
    /// Add or remove a link.
    Link(HoldReq),
    /// Read an entry.
    Get(GetReq),
    /// Read links.
    GetLinks(LinkQuery),
    /// Exchange change log ranges.
    Gossip(GossipReq),
    /// Find closer peers.
    FindNode(FindNodeReq),
}

impl Body {
    /// The discriminant of this body.
    pub fn msg_type(&self) -> MsgType {
        match self {
            Body::Put(_) => MsgType::Put,
            Body::Del(_) => MsgType::Del,
            Body::Mod(_) => MsgType::Mod,
            Body::Link(_) => MsgType::Link,
            Body::Get(_) => MsgType::Get,
            Body::GetLinks(_) => MsgType::GetLinks,
            Body::Gossip(_) => MsgType::Gossip,
            Body::FindNode(_) => MsgType::FindNode,
        }
    }

    /// The hold request of a change body.
    pub fn as_hold(&self) -> Option<&HoldReq> {
        match self {
            Body::Put(h) | Body::Del(h) | Body::Mod(h) | Body::Link(h) => Some(h),
            _ => None,
        }
    }
}

/// A request sent from one node to another, and the unit recorded in the
/// change log for every mutation it causes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// The node that originated the message.
    pub from: PeerId,
    /// When the message was created.
    pub time: Timestamp,
    /// What is being asked.
    pub body: Body,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(from: PeerId, body: Body) -> Self {
        Self {
            from,
            time: Timestamp::now(),
            body,
        }
    }

    /// The discriminant of the body.
    pub fn msg_type(&self) -> MsgType {
        self.body.msg_type()
    }

    /// Encode to msgpack.
    pub fn encode(&self) -> SerializationResult<Vec<u8>> {
        encode(self)
    }

    /// Decode from msgpack.
    pub fn decode(bytes: &[u8]) -> SerializationResult<Self> {
        decode(bytes)
    }

    /// Deterministic digest of the encoded message.
    pub fn fingerprint(&self) -> SerializationResult<MessageFingerprint> {
        Ok(MessageFingerprint::with_data(&self.encode()?))
    }
}
