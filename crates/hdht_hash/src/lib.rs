//! Defines DhtHash and its various HashTypes.
//!
//! Every hash is 39 bytes: a 3 byte type prefix, the 32 byte blake2b core and
//! a 4 byte location derived from the core. Entry hashes and peer ids share
//! the same 32 byte metric space, so XOR [`Distance`] can be measured between
//! any two of them.

#![deny(missing_docs)]

mod aliases;
mod distance;
pub mod encode;
pub mod error;
mod hash;
pub mod hash_type;
mod ser;

pub use aliases::*;
pub use distance::*;
pub use encode::{hash_decode, hash_decode_unchecked, hash_encode};
pub use hash::*;
pub use hash_type::HashType;
pub use hash_type::PrimitiveHashType;
