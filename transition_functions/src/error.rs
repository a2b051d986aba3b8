use thiserror::Error;
use types::{
    crypto::PublicKey,
    operations::OperationKind,
    primitives::{
        Address, Amount, BlockId, BlockNumber, ProducerId, TransactionId, UnixSeconds, H256,
    },
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("block does not match checkpoint at {number} (in_config: {in_config:?}, in_block: {in_block:?})")]
    CheckpointMismatch {
        number: BlockNumber,
        in_config: BlockId,
        in_block: BlockId,
    },
    #[error("contract already exists at {address:?}")]
    ContractExists { address: Address },
    #[error("transaction is already known: {transaction_id:?}")]
    DuplicateTransaction { transaction_id: TransactionId },
    #[error("expiration {expiration} is not after {now}")]
    ExpirationNotInFuture {
        expiration: UnixSeconds,
        now: UnixSeconds,
    },
    #[error("transaction expiration {expiration} is later than {maximum}")]
    ExpirationTooFar {
        expiration: UnixSeconds,
        maximum: UnixSeconds,
    },
    #[error("fee total is incorrect (computed: {computed}, in_block: {in_block})")]
    FeeTotalMismatch { computed: Amount, in_block: Amount },
    #[error("address is blocked: {address:?}")]
    BlockedAddress { address: Address },
    #[error("producer schedule is empty")]
    EmptySchedule,
    #[error("signature by producer {producer_id} is invalid")]
    InvalidProducerSignature { producer_id: ProducerId },
    #[error("transaction signature by {public_key:?} is invalid")]
    InvalidTransactionSignature { public_key: PublicKey },
    #[error("block timestamp {timestamp} does not fall after the first slot")]
    InvalidSlot { timestamp: UnixSeconds },
    #[error(
        "transaction Merkle root is incorrect (computed: {computed:?}, in_block: {in_block:?})"
    )]
    MerkleRootMismatch { computed: H256, in_block: H256 },
    #[error("{kind:?} operation is not authorized by {address:?}")]
    MissingAuthority {
        address: Address,
        kind: OperationKind,
    },
    #[error(
        "multisignature authority {address:?} needs {required} signatures \
         but only {provided} were provided"
    )]
    MultisigThresholdNotMet {
        address: Address,
        required: u32,
        provided: usize,
    },
    #[error("{address:?} is not the committee")]
    NotCommittee { address: Address },
    #[error("operation results of transaction {transaction_index} do not match those in block")]
    OperationResultsMismatch { transaction_index: usize },
    #[error("block does not build on head (head: {head:?}, in_block: {in_block:?})")]
    PreviousMismatch { head: BlockId, in_block: BlockId },
    #[error("account {account:?} already controls a producer")]
    ProducerAccountTaken { account: Address },
    #[error("producer {producer_id} is not controlled by {account:?}")]
    ProducerAccountMismatch {
        producer_id: ProducerId,
        account: Address,
    },
    #[error("producer {producer_id} revealed a secret that does not match its commitment")]
    SecretMismatch { producer_id: ProducerId },
    #[error("reference block prefix is incorrect (in_summary: {in_summary}, in_transaction: {in_transaction})")]
    TaposPrefixMismatch {
        in_summary: u32,
        in_transaction: u32,
    },
    #[error("block timestamp is not after head (head_time: {head_time}, in_block: {in_block})")]
    TimestampNotAfterHead {
        head_time: UnixSeconds,
        in_block: UnixSeconds,
    },
    #[error("transaction expired at {expiration} (now: {now})")]
    TransactionExpired {
        expiration: UnixSeconds,
        now: UnixSeconds,
    },
    #[error("contract does not exist: {address:?}")]
    UnknownContract { address: Address },
    #[error("producer does not exist: {producer_id}")]
    UnknownProducer { producer_id: ProducerId },
    #[error("no block summary for reference block number {ref_block_num}")]
    UnknownReferenceBlock { ref_block_num: u16 },
    #[error("block was produced by {in_block} but slot belongs to {scheduled}")]
    WrongProducer {
        scheduled: ProducerId,
        in_block: ProducerId,
    },
}
