use derive_more::Deref;
use hashing::merkle_root;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{self, PublicKey, Signature, SigningKey},
    encoding,
    primitives::{
        block_number_from_id, id_with_number, Amount, BlockId, BlockNumber, ProducerId,
        UnixSeconds, H256,
    },
    transaction::ProcessedTransaction,
};

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
pub struct BlockHeader {
    pub previous: BlockId,
    pub timestamp: UnixSeconds,
    pub producer: ProducerId,
    pub transaction_merkle_root: H256,
    pub fee_total: Amount,
    /// Secret committed to by the producer's previous block.
    pub previous_secret: H256,
    pub next_secret_hash: H256,
}

impl BlockHeader {
    #[must_use]
    pub fn block_number(&self) -> BlockNumber {
        block_number_from_id(self.previous) + 1
    }

    #[must_use]
    pub fn digest(&self) -> H256 {
        encoding::content_hash(self)
    }
}

#[derive(Clone, PartialEq, Eq, Default, Debug, Deref, Deserialize, Serialize)]
pub struct SignedBlock {
    #[deref]
    pub header: BlockHeader,
    pub signature: Option<Signature>,
    pub transactions: Vec<ProcessedTransaction>,
}

impl SignedBlock {
    /// Hash of the signed header with the block number embedded in the first 4 bytes.
    #[must_use]
    pub fn id(&self) -> BlockId {
        let hash = encoding::content_hash(&(&self.header, &self.signature));
        id_with_number(hash, self.block_number())
    }

    #[must_use]
    pub fn calculate_merkle_root(&self) -> H256 {
        merkle_root(
            self.transactions
                .iter()
                .map(ProcessedTransaction::merkle_digest),
        )
    }

    pub fn sign(&mut self, signing_key: &SigningKey) {
        self.signature = Some(crypto::sign(signing_key, self.header.digest()));
    }

    #[must_use]
    pub fn validate_signee(&self, public_key: &PublicKey) -> bool {
        self.signature.as_ref().is_some_and(|signature| {
            crypto::verify(public_key, self.header.digest(), signature)
        })
    }

    #[must_use]
    pub fn packed_size(&self) -> u64 {
        encoding::packed_size(self)
    }

    /// Packed size of a signed block with no transactions.
    #[must_use]
    pub fn signed_header_size() -> u64 {
        Self {
            signature: Some(Signature::from_bytes(&[0; 64])),
            ..Self::default()
        }
        .packed_size()
    }
}
