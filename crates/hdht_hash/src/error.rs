//! DhtHash Error Type.

use crate::HASH_PREFIX_LEN;

/// DhtHash Error Type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// The textual form was not multibase base64url (missing the leading `u`).
    #[error("hash strings must begin with a lowercase 'u'")]
    NoU,

    /// Could not base64 decode the textual form.
    #[error("could not base64 decode the hash string")]
    BadBase64,

    /// The byte count was not 39.
    #[error("invalid hash byte count, expected 39, found {0}")]
    BadSize(usize),

    /// The prefix did not belong to the expected hash type.
    #[error("{0} cannot be built from prefix {1:?}")]
    BadPrefix(String, [u8; HASH_PREFIX_LEN]),

    /// The location bytes did not match the core.
    #[error("hash location bytes do not match the hash core")]
    BadChecksum,
}

/// DhtHash Result type
pub type HashResult<T> = Result<T, HashError>;
