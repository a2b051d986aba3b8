use anyhow::{ensure, Result};
use derive_more::Deref;
use hashing::hash_256_256;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{self, PublicKey, Signature, SigningKey},
    encoding,
    error::Error,
    operations::{Operation, OperationResult},
    primitives::{
        block_number_from_id, tapos_prefix, BlockId, ChainId, Gas, TransactionId, UnixSeconds,
        H256,
    },
};

#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
pub struct Transaction {
    /// Low 16 bits of the number of the referenced block.
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub expiration: UnixSeconds,
    pub operations: Vec<Operation>,
}

impl Transaction {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "References only keep the low 16 bits of the block number."
    )]
    pub fn set_reference_block(&mut self, block_id: BlockId) {
        self.ref_block_num = block_number_from_id(block_id) as u16;
        self.ref_block_prefix = tapos_prefix(block_id);
    }

    #[must_use]
    pub fn id(&self) -> TransactionId {
        encoding::content_hash(self)
    }

    /// The message signers commit to. Binding the chain ID prevents replay on other chains.
    #[must_use]
    pub fn digest(&self, chain_id: ChainId) -> H256 {
        hash_256_256(chain_id, self.id())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.operations.is_empty(), Error::EmptyTransaction);
        self.operations.iter().try_for_each(Operation::validate)
    }

    #[must_use]
    pub fn gas(&self) -> Gas {
        self.operations.iter().map(Operation::gas).sum()
    }

    #[must_use]
    pub fn contract_operation_count(&self) -> u32 {
        let count = self
            .operations
            .iter()
            .filter(|operation| operation.is_contract())
            .count();

        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct TransactionSignature {
    pub public_key: PublicKey,
    pub signature: Signature,
}

#[derive(Clone, PartialEq, Eq, Default, Debug, Deref, Deserialize, Serialize)]
pub struct SignedTransaction {
    #[deref]
    pub transaction: Transaction,
    pub signatures: Vec<TransactionSignature>,
}

impl From<Transaction> for SignedTransaction {
    fn from(transaction: Transaction) -> Self {
        Self {
            transaction,
            signatures: vec![],
        }
    }
}

impl SignedTransaction {
    pub fn sign(&mut self, signing_key: &SigningKey, chain_id: ChainId) {
        let digest = self.transaction.digest(chain_id);

        self.signatures.push(TransactionSignature {
            public_key: signing_key.verifying_key(),
            signature: crypto::sign(signing_key, digest),
        });
    }

    pub fn signers(&self) -> impl Iterator<Item = &PublicKey> {
        self.signatures.iter().map(|signature| &signature.public_key)
    }
}

/// A transaction together with the results its operations produced when it was applied.
#[derive(Clone, PartialEq, Eq, Debug, Deref, Deserialize, Serialize)]
pub struct ProcessedTransaction {
    #[deref]
    pub signed: SignedTransaction,
    pub operation_results: Vec<OperationResult>,
}

impl ProcessedTransaction {
    /// Leaf committed to by the block's transaction Merkle root.
    #[must_use]
    pub fn merkle_digest(&self) -> H256 {
        encoding::content_hash(self)
    }
}
