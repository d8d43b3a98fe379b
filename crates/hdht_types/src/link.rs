//! Links between entries.

use crate::error::{decode, encode, SerializationResult};
use crate::status::EntryStatus;
use hdht_hash::{EntryHash, PeerId};
use serde::{Deserialize, Serialize};

/// Tag of the implicit link a Mod writes from the old entry to its replacement.
pub const SYS_TAG_REPLACED_BY: &str = "__replacedBy";

/// Entry type under which link entries are authored.
pub const LINK_ENTRY_TYPE: &str = "%link";

/// One link returned by a links query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaggedHash {
    /// The link target.
    pub hash: EntryHash,
    /// The link tag.
    pub tag: String,
    /// The peer that caused the latest event on this link.
    pub source: Option<PeerId>,
}

/// One appended event in a link's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEvent {
    /// Live for an add, Deleted for a removal.
    pub status: EntryStatus,
    /// The peer that caused it.
    pub source: Option<PeerId>,
    /// The entry (link entry, or replacement for replacedBy links) that caused it.
    pub link_hash: Option<EntryHash>,
}

/// Whether a link entry adds or removes its link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkAction {
    /// Add the link.
    Add,
    /// Remove the link.
    Del,
}

/// Content of a link entry: the thing a LINK change asks holders to apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Entry the link hangs off.
    pub base: EntryHash,
    /// Entry the link points to.
    pub target: EntryHash,
    /// Link tag.
    pub tag: String,
    /// Add or remove.
    pub action: LinkAction,
}

impl LinkSpec {
    /// Encode as link entry content.
    pub fn encode(&self) -> SerializationResult<Vec<u8>> {
        encode(self)
    }

    /// Decode link entry content.
    pub fn decode(bytes: &[u8]) -> SerializationResult<Self> {
        decode(bytes)
    }

    /// The hash of the link entry carrying this spec.
    pub fn entry_hash(&self) -> SerializationResult<EntryHash> {
        Ok(EntryHash::with_data(&self.encode()?))
    }
}
