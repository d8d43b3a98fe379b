use crate::HASH_CORE_LEN;

/// XOR distance between two 32 byte hash cores, compared as a big-endian
/// unsigned integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance([u8; HASH_CORE_LEN]);

impl Distance {
    /// The distance from a hash to itself.
    pub const ZERO: Distance = Distance([0; HASH_CORE_LEN]);

    /// XOR the two cores. Both slices must be 32 bytes; shorter input is
    /// treated as zero padded.
    pub fn between(a: &[u8], b: &[u8]) -> Self {
        let mut out = [0; HASH_CORE_LEN];
        for (i, o) in out.iter_mut().enumerate() {
            *o = a.get(i).copied().unwrap_or(0) ^ b.get(i).copied().unwrap_or(0);
        }
        Self(out)
    }

    /// Number of leading zero bits, i.e. the length of the common prefix of
    /// the two hashes this distance was measured between.
    pub fn common_prefix_len(&self) -> usize {
        let mut n = 0;
        for b in self.0.iter() {
            if *b == 0 {
                n += 8;
            } else {
                n += b.leading_zeros() as usize;
                break;
            }
        }
        n
    }

    /// The raw XOR bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_CORE_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Distance(0x")?;
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        f.write_str(")")
    }
}
