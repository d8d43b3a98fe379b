//! Hashes travel as their 39 raw bytes.

use crate::{DhtHash, HashType};

impl<T: HashType> serde::Serialize for DhtHash<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(self.get_raw_39())
    }
}

impl<'de, T: HashType> serde::Deserialize<'de> for DhtHash<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: serde_bytes::ByteBuf = serde::Deserialize::deserialize(deserializer)?;
        DhtHash::from_raw_39(bytes.into_vec()).map_err(serde::de::Error::custom)
    }
}
