use crate::error::{HashError, HashResult};
use crate::{Distance, HashType, PrimitiveHashType};

/// Length of the type prefix
pub const HASH_PREFIX_LEN: usize = 3;

/// Length of the blake2b core
pub const HASH_CORE_LEN: usize = 32;

/// Length of the location bytes
pub const HASH_LOC_LEN: usize = 4;

/// Length of the full DhtHash bytes (39 = 3 + 32 + 4)
pub const DHT_HASH_RAW_LEN: usize = HASH_PREFIX_LEN + HASH_CORE_LEN + HASH_LOC_LEN;

/// A DhtHash contains a vector of 39 bytes: the type prefix, a 32-byte blake2b
/// hash and 4 bytes representing a DHT location. It also contains a zero-sized
/// type which specifies what it is a hash of.
///
/// Ordering is by the raw bytes, so within one hash type it is ascending by core.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DhtHash<T: HashType> {
    hash: Vec<u8>,
    hash_type: T,
}

impl<T: HashType> DhtHash<T> {
    /// Build from the full 39 raw bytes, validating size, prefix and location.
    pub fn from_raw_39(hash: Vec<u8>) -> HashResult<Self> {
        if hash.len() != DHT_HASH_RAW_LEN {
            return Err(HashError::BadSize(hash.len()));
        }
        let hash_type = T::try_from_prefix(&hash[..HASH_PREFIX_LEN])?;
        let core = &hash[HASH_PREFIX_LEN..HASH_PREFIX_LEN + HASH_CORE_LEN];
        if dht_location_bytes(core)[..] != hash[HASH_PREFIX_LEN + HASH_CORE_LEN..] {
            return Err(HashError::BadChecksum);
        }
        Ok(Self { hash, hash_type })
    }

    /// Build from 32 core bytes and an explicit type, computing the location.
    pub fn from_core_and_type(core: [u8; HASH_CORE_LEN], hash_type: T) -> Self {
        let mut hash = Vec::with_capacity(DHT_HASH_RAW_LEN);
        hash.extend_from_slice(hash_type.get_prefix());
        hash.extend_from_slice(&core);
        hash.extend_from_slice(&dht_location_bytes(&core));
        Self { hash, hash_type }
    }

    /// The HashType of this hash
    pub fn hash_type(&self) -> &T {
        &self.hash_type
    }

    /// Get the raw byte array including the 3 byte prefix, 32 core bytes and the 4 byte loc
    pub fn get_raw_39(&self) -> &[u8] {
        &self.hash[..]
    }

    /// Fetch just the core 32 bytes (without the prefix or location bytes)
    pub fn get_core_32(&self) -> &[u8] {
        &self.hash[HASH_PREFIX_LEN..HASH_PREFIX_LEN + HASH_CORE_LEN]
    }

    /// Fetch the dht location for this hash
    pub fn get_loc(&self) -> u32 {
        let l = &self.hash[DHT_HASH_RAW_LEN - HASH_LOC_LEN..];
        u32::from_le_bytes([l[0], l[1], l[2], l[3]])
    }

    /// XOR distance between the cores of two hashes of any type.
    pub fn distance_to<U: HashType>(&self, other: &DhtHash<U>) -> Distance {
        Distance::between(self.get_core_32(), other.get_core_32())
    }

    /// Keep the core, switch the type.
    pub fn retype<TT: HashType>(&self, hash_type: TT) -> DhtHash<TT> {
        let mut hash = self.hash.clone();
        hash[..HASH_PREFIX_LEN].copy_from_slice(hash_type.get_prefix());
        DhtHash { hash, hash_type }
    }

    /// consume into the inner byte vector
    pub fn into_inner(self) -> Vec<u8> {
        self.hash
    }
}

impl<P: PrimitiveHashType> DhtHash<P> {
    /// Construct from the 32 core bytes, using the known PrimitiveHashType
    pub fn from_core(core: [u8; HASH_CORE_LEN]) -> Self {
        Self::from_core_and_type(core, P::new())
    }

    /// Hash arbitrary content into a DhtHash of this type.
    pub fn with_data(content: &[u8]) -> Self {
        Self::from_core(blake2b_256(content))
    }
}

#[cfg(feature = "test_utils")]
impl<P: PrimitiveHashType> DhtHash<P> {
    /// A random hash, for tests.
    pub fn random() -> Self {
        Self::from_core(rand::random())
    }
}

impl<T: HashType> AsRef<[u8]> for DhtHash<T> {
    fn as_ref(&self) -> &[u8] {
        &self.hash
    }
}

// NB: See encode module for Display impl
impl<T: HashType> std::fmt::Debug for DhtHash<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}({})", self.hash_type().hash_name(), self))
    }
}

/// Blake2b hash with a 32 byte output.
pub fn blake2b_256(data: &[u8]) -> [u8; HASH_CORE_LEN] {
    let hash = blake2b_simd::Params::new().hash_length(32).hash(data);
    let mut out = [0; HASH_CORE_LEN];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Derive the 4 location bytes from the hash core: blake2b with a 16 byte
/// output, folded down to 4 bytes by XOR.
pub fn dht_location_bytes(data: &[u8]) -> [u8; HASH_LOC_LEN] {
    let hash = blake2b_simd::Params::new().hash_length(16).hash(data);
    let hash = hash.as_bytes();

    let mut out = [hash[0], hash[1], hash[2], hash[3]];
    for i in (4..16).step_by(4) {
        out[0] ^= hash[i];
        out[1] ^= hash[i + 1];
        out[2] ^= hash[i + 2];
        out[3] ^= hash[i + 3];
    }
    out
}
