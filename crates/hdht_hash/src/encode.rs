//! Textual form of hashes: multibase base64url, no padding, with a leading `u`.

use crate::error::{HashError, HashResult};
use crate::{DhtHash, HashType, DHT_HASH_RAW_LEN};
use base64::Engine;

impl<T: HashType> TryFrom<&str> for DhtHash<T> {
    type Error = HashError;
    fn try_from(s: &str) -> HashResult<Self> {
        hash_decode(s)
    }
}

impl<T: HashType> TryFrom<String> for DhtHash<T> {
    type Error = HashError;
    fn try_from(s: String) -> HashResult<Self> {
        hash_decode(&s)
    }
}

impl<T: HashType> std::str::FromStr for DhtHash<T> {
    type Err = HashError;
    fn from_str(s: &str) -> HashResult<Self> {
        hash_decode(s)
    }
}

impl<T: HashType> std::fmt::Display for DhtHash<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hash_encode(self.get_raw_39()))
    }
}

/// Encode raw hash bytes into the `u`-prefixed base64url string.
pub fn hash_encode(data: &[u8]) -> String {
    format!(
        "u{}",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
    )
}

/// Decode the base64 body of a hash string without checking type or location.
pub fn hash_decode_unchecked(s: &str) -> HashResult<Vec<u8>> {
    let body = s.strip_prefix('u').ok_or(HashError::NoU)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| HashError::BadBase64)?;
    if bytes.len() != DHT_HASH_RAW_LEN {
        return Err(HashError::BadSize(bytes.len()));
    }
    Ok(bytes)
}

/// Decode a hash string into a typed hash, validating prefix and location.
pub fn hash_decode<T: HashType>(s: &str) -> HashResult<DhtHash<T>> {
    DhtHash::from_raw_39(hash_decode_unchecked(s)?)
}
