//! Entry status flags and the masks used to select them.

use serde::{Deserialize, Serialize};

/// Status of an entry held in the DHT. Each status is a single bit so that
/// callers can ask for "any of" several with a [`StatusMask`].
///
/// Transitions are forward only: `Live -> Deleted`, `Live -> Modified`.
/// `Rejected` is only ever assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryStatus {
    /// Valid and current.
    Live = 0x01,
    /// Failed validation.
    Rejected = 0x02,
    /// Removed by a Del.
    Deleted = 0x04,
    /// Replaced by a Mod.
    Modified = 0x08,
}

impl EntryStatus {
    /// The single bit for this status.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Inverse of [`EntryStatus::bits`].
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x01 => Some(Self::Live),
            0x02 => Some(Self::Rejected),
            0x04 => Some(Self::Deleted),
            0x08 => Some(Self::Modified),
            _ => None,
        }
    }
}

/// A set of [`EntryStatus`] bits. [`StatusMask::DEFAULT`] is a sentinel,
/// not an empty set: reads with it resolve Deleted, Modified and Rejected
/// entries into distinct errors.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::BitOr,
    derive_more::From,
)]
pub struct StatusMask(pub u8);

impl StatusMask {
    /// Sentinel for "resolve as a normal read".
    pub const DEFAULT: StatusMask = StatusMask(0x00);
    /// Live entries.
    pub const LIVE: StatusMask = StatusMask(0x01);
    /// Rejected entries.
    pub const REJECTED: StatusMask = StatusMask(0x02);
    /// Deleted entries.
    pub const DELETED: StatusMask = StatusMask(0x04);
    /// Modified entries.
    pub const MODIFIED: StatusMask = StatusMask(0x08);
    /// Any status.
    pub const ANY: StatusMask = StatusMask(0xFF);

    /// Is this the default sentinel?
    pub fn is_default(&self) -> bool {
        self.0 == 0
    }

    /// Does the mask include this status?
    pub fn matches(&self, status: EntryStatus) -> bool {
        self.0 & status.bits() != 0
    }
}

impl From<EntryStatus> for StatusMask {
    fn from(s: EntryStatus) -> Self {
        StatusMask(s.bits())
    }
}

impl std::fmt::Debug for StatusMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StatusMask({:#04x})", self.0)
    }
}

/// Which fields a read should return. [`GetMask::DEFAULT`] means entry only.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::BitOr,
    derive_more::From,
)]
pub struct GetMask(pub u8);

impl GetMask {
    /// The entry value.
    pub const DEFAULT: GetMask = GetMask(0x00);
    /// The entry value.
    pub const ENTRY: GetMask = GetMask(0x01);
    /// The entry type.
    pub const ENTRY_TYPE: GetMask = GetMask(0x02);
    /// The peers that provided the entry.
    pub const SOURCES: GetMask = GetMask(0x04);
    /// Everything.
    pub const ALL: GetMask = GetMask(0xFF);

    fn effective(&self) -> u8 {
        if self.0 == 0 {
            Self::ENTRY.0
        } else {
            self.0
        }
    }

    /// Should the value be returned?
    pub fn entry(&self) -> bool {
        self.effective() & Self::ENTRY.0 != 0
    }

    /// Should the entry type be returned?
    pub fn entry_type(&self) -> bool {
        self.effective() & Self::ENTRY_TYPE.0 != 0
    }

    /// Should the sources be returned?
    pub fn sources(&self) -> bool {
        self.effective() & Self::SOURCES.0 != 0
    }
}

impl std::fmt::Debug for GetMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GetMask({:#04x})", self.0)
    }
}
