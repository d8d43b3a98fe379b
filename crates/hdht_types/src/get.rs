//! Result of reading an entry.

use crate::status::EntryStatus;
use hdht_hash::PeerId;
use serde::{Deserialize, Serialize};

/// The fields of an entry selected by a [`crate::status::GetMask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResult {
    /// The value, when requested.
    #[serde(with = "serde_bytes")]
    pub entry: Option<Vec<u8>>,
    /// The entry type, when requested.
    pub entry_type: Option<String>,
    /// The peers the entry came from, when requested.
    pub sources: Vec<PeerId>,
    /// The entry's current status.
    pub status: EntryStatus,
}
