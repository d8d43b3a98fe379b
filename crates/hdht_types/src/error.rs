//! Serialization errors for wire and store encodings.

/// Errors encoding or decoding the msgpack representation of a type.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// Encoding failed.
    #[error("msgpack encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Decoding failed.
    #[error("msgpack decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// A decoded hash was malformed.
    #[error(transparent)]
    Hash(#[from] hdht_hash::error::HashError),
}

/// Result alias
pub type SerializationResult<T> = Result<T, SerializationError>;

/// Encode a value with named fields so the bytes are self-describing and
/// deterministic for a given value.
pub fn encode<T: serde::Serialize + ?Sized>(t: &T) -> SerializationResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(t)?)
}

/// Decode a value written by [`encode`].
pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> SerializationResult<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}
