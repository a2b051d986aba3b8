use hashing::hash_bytes;
use serde::Serialize;

use crate::primitives::H256;

// `bincode` only fails on I/O errors, size limits and maps with unknown lengths.
// None of those apply when serializing the in-memory types of this crate.
const INFALLIBLE: &str = "types in this crate serialize into memory without errors";

#[must_use]
pub fn to_bytes(value: &impl Serialize) -> Vec<u8> {
    bincode::serialize(value).expect(INFALLIBLE)
}

#[must_use]
pub fn packed_size(value: &impl Serialize) -> u64 {
    bincode::serialized_size(value).expect(INFALLIBLE)
}

#[must_use]
pub fn content_hash(value: &impl Serialize) -> H256 {
    hash_bytes(to_bytes(value))
}
