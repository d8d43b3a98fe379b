//! Defines the prefixes for the various HashTypes, as well as the traits
//! which unify them

use crate::error::{HashError, HashResult};
use crate::HASH_PREFIX_LEN;

pub(crate) const ENTRY_PREFIX: &[u8] = &[0x84, 0x21, 0x24]; // uhCEk [132, 33, 36]
pub(crate) const PEER_PREFIX: &[u8] = &[0x84, 0x20, 0x24]; // uhCAk [132, 32, 36]
pub(crate) const FINGERPRINT_PREFIX: &[u8] = &[0x84, 0x24, 0x24]; // uhCQk [132, 36, 36]

/// Every DhtHash is parameterized by a HashType, which determines its prefix
/// and the name it is printed with.
pub trait HashType:
    Copy + Clone + std::fmt::Debug + Send + Sync + PartialEq + Eq + PartialOrd + Ord + std::hash::Hash
{
    /// Get the 3 byte prefix for the underlying primitive hash type
    fn get_prefix(self) -> &'static [u8];

    /// Given a 3-byte prefix, return the HashType, or an error
    fn try_from_prefix(prefix: &[u8]) -> HashResult<Self>;

    /// Get a Display-worthy name for this hash type
    fn hash_name(self) -> &'static str;
}

/// A PrimitiveHashType is one with a single, statically known prefix
pub trait PrimitiveHashType: HashType {
    /// Constructor
    fn new() -> Self;

    /// Get the 3 byte prefix, which is statically known for primitive hash types
    fn static_prefix() -> &'static [u8];
}

fn bad_prefix(name: &str, prefix: &[u8]) -> HashError {
    let mut p = [0; HASH_PREFIX_LEN];
    for (i, b) in prefix.iter().take(HASH_PREFIX_LEN).enumerate() {
        p[i] = *b;
    }
    HashError::BadPrefix(name.to_string(), p)
}

macro_rules! primitive_hash_type {
    ($name: ident, $display: ident, $prefix: ident, $doc: expr) => {
        #[doc = $doc]
        #[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
        pub struct $name;

        impl PrimitiveHashType for $name {
            fn new() -> Self {
                Self
            }

            fn static_prefix() -> &'static [u8] {
                $prefix
            }
        }

        impl HashType for $name {
            fn get_prefix(self) -> &'static [u8] {
                $prefix
            }

            fn try_from_prefix(prefix: &[u8]) -> HashResult<Self> {
                if prefix == $prefix {
                    Ok(Self)
                } else {
                    Err(bad_prefix(stringify!($display), prefix))
                }
            }

            fn hash_name(self) -> &'static str {
                stringify!($display)
            }
        }
    };
}

primitive_hash_type!(Entry, EntryHash, ENTRY_PREFIX, "The hash of an entry");
primitive_hash_type!(Peer, PeerId, PEER_PREFIX, "The id of a peer");
primitive_hash_type!(
    Fingerprint,
    MessageFingerprint,
    FINGERPRINT_PREFIX,
    "The fingerprint of a message"
);

/// The AnyDht (composite) HashType: any hash that has a position in the
/// DHT's metric space. Used as a lookup target.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnyDht {
    /// The hash of an entry
    Entry,
    /// The id of a peer
    Peer,
    /// The fingerprint of a message
    Fingerprint,
}

impl HashType for AnyDht {
    fn get_prefix(self) -> &'static [u8] {
        match self {
            AnyDht::Entry => ENTRY_PREFIX,
            AnyDht::Peer => PEER_PREFIX,
            AnyDht::Fingerprint => FINGERPRINT_PREFIX,
        }
    }

    fn try_from_prefix(prefix: &[u8]) -> HashResult<Self> {
        match prefix {
            ENTRY_PREFIX => Ok(AnyDht::Entry),
            PEER_PREFIX => Ok(AnyDht::Peer),
            FINGERPRINT_PREFIX => Ok(AnyDht::Fingerprint),
            _ => Err(bad_prefix("AnyDhtHash", prefix)),
        }
    }

    fn hash_name(self) -> &'static str {
        "AnyDhtHash"
    }
}
