use ed25519_dalek::{Signer as _, Verifier as _};
use hashing::{hash_256, hash_256_256, hash_bytes};

use crate::primitives::{Address, BlockId, H256};

pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey as PublicKey};

#[must_use]
pub fn address_of(public_key: &PublicKey) -> Address {
    Address::from_slice(&hash_bytes(public_key.as_bytes())[..Address::len_bytes()])
}

#[must_use]
pub fn sign(signing_key: &SigningKey, digest: H256) -> Signature {
    signing_key.sign(digest.as_bytes())
}

#[must_use]
pub fn verify(public_key: &PublicKey, digest: H256, signature: &Signature) -> bool {
    public_key.verify(digest.as_bytes(), signature).is_ok()
}

/// Secret a producer reveals for the block it signs on top of `previous_block_id`.
///
/// Only the holder of the signing key can compute it, and anyone can check it against the
/// commitment `hash_256(secret)` published in the producer's earlier block.
#[must_use]
pub fn producer_secret(signing_key: &SigningKey, previous_block_id: BlockId) -> H256 {
    let key_hash = hash_256(H256(signing_key.to_bytes()));
    hash_256_256(key_hash, previous_block_id)
}

#[must_use]
pub fn secret_commitment(secret: H256) -> H256 {
    hash_256(secret)
}
