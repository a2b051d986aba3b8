//! Deterministic keys, configurations and transactions for tests.
//!
//! Every key is derived from a single byte seed, so tests can refer to accounts by number.

use types::{
    block::SignedBlock,
    config::{ChainConfig, GenesisBalance, GenesisConfig, GenesisProducer},
    consts::CORE_ASSET,
    crypto::{self, PublicKey, SigningKey},
    operations::{Operation, Transfer},
    primitives::{Address, Amount, BlockId, ChainId, UnixSeconds, H256},
    transaction::{SignedTransaction, Transaction},
};

pub const GENESIS_TIME: UnixSeconds = 1_600_000_000;
pub const CHAIN_ID: ChainId = H256([0x42; 32]);
pub const COMMITTEE_SEED: u8 = 0xcc;
pub const INITIAL_BALANCE: Amount = 1_000_000;

#[must_use]
pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

#[must_use]
pub fn public_key(seed: u8) -> PublicKey {
    signing_key(seed).verifying_key()
}

#[must_use]
pub fn address(seed: u8) -> Address {
    crypto::address_of(&public_key(seed))
}

#[must_use]
pub fn chain_config() -> ChainConfig {
    ChainConfig {
        chain_id: CHAIN_ID,
        ..ChainConfig::default()
    }
}

/// Producers sign with the key of their seed and are controlled by the address of the same seed.
/// Funded accounts start with [`INITIAL_BALANCE`] of the core asset.
#[must_use]
pub fn genesis(
    producer_seeds: impl IntoIterator<Item = u8>,
    funded_seeds: impl IntoIterator<Item = u8>,
) -> GenesisConfig {
    let producers = producer_seeds
        .into_iter()
        .map(|seed| GenesisProducer {
            account: address(seed),
            signing_key: public_key(seed),
        })
        .collect();

    let balances = funded_seeds
        .into_iter()
        .map(|seed| GenesisBalance {
            owner: address(seed),
            asset: CORE_ASSET,
            amount: INITIAL_BALANCE,
        })
        .collect();

    GenesisConfig {
        timestamp: GENESIS_TIME,
        parameters: Default::default(),
        committee: address(COMMITTEE_SEED),
        producers,
        balances,
        blocked_addresses: vec![],
        operation_allow_lists: vec![],
        multisig_authorities: vec![],
        initial_random_seed: H256::zero(),
    }
}

#[must_use]
pub fn transfer(from: u8, to: Address, amount: Amount, fee: Amount) -> Operation {
    Transfer {
        fee,
        from: address(from),
        to,
        asset: CORE_ASSET,
        amount,
    }
    .into()
}

#[must_use]
pub fn transaction(
    operations: Vec<Operation>,
    reference_block: BlockId,
    expiration: UnixSeconds,
) -> Transaction {
    let mut transaction = Transaction {
        expiration,
        operations,
        ..Transaction::default()
    };

    transaction.set_reference_block(reference_block);
    transaction
}

#[must_use]
pub fn sign_transaction(transaction: Transaction, signer_seeds: &[u8]) -> SignedTransaction {
    let mut signed = SignedTransaction::from(transaction);

    for seed in signer_seeds {
        signed.sign(&signing_key(*seed), CHAIN_ID);
    }

    signed
}

/// A transfer of the core asset signed by the sender.
#[must_use]
pub fn signed_transfer(
    from: u8,
    to: Address,
    amount: Amount,
    reference_block: BlockId,
    expiration: UnixSeconds,
) -> SignedTransaction {
    let operations = vec![transfer(from, to, amount, 1)];
    sign_transaction(transaction(operations, reference_block, expiration), &[from])
}

/// Replaces the signature of a block after its contents have been tampered with.
pub fn resign_block(block: &mut SignedBlock, seed: u8) {
    block.sign(&signing_key(seed));
}
