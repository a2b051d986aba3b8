use core::ops::RangeInclusive;

use derive_more::From;
use enumset::EnumSet;
use types::{
    config::ChainParameters,
    crypto::PublicKey,
    operations::{Operation, OperationKind, Price},
    primitives::{
        Address, Amount, AssetId, BlockId, BlockNumber, OrderId, ProducerId, ProposalId, Slot,
        TransactionId, UnixSeconds, H256,
    },
    transaction::SignedTransaction,
};

/// Identity of an object in the ledger.
///
/// Keys of the same kind are adjacent in the ordering, so every object of one kind can be
/// visited with a single range query.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ObjectKey {
    GlobalProperties,
    DynamicGlobalProperties,
    ShuffledProducers,
    Producer(ProducerId),
    Balance(Address, AssetId),
    BlockSummary(u16),
    Transaction(TransactionId),
    Proposal(ProposalId),
    LimitOrder(OrderId),
    PriceFeed(AssetId, ProducerId),
    Contract(Address),
    BlockedAddress(Address),
    OperationAllowList(Address),
    Multisig(Address),
}

impl ObjectKey {
    #[must_use]
    pub const fn producers() -> RangeInclusive<Self> {
        Self::Producer(ProducerId::MIN)..=Self::Producer(ProducerId::MAX)
    }

    #[must_use]
    pub const fn balances_of(owner: Address) -> RangeInclusive<Self> {
        Self::Balance(owner, AssetId::MIN)..=Self::Balance(owner, AssetId::MAX)
    }

    #[must_use]
    pub fn balances() -> RangeInclusive<Self> {
        Self::Balance(Address::zero(), AssetId::MIN)
            ..=Self::Balance(Address::repeat_byte(u8::MAX), AssetId::MAX)
    }

    #[must_use]
    pub fn transactions() -> RangeInclusive<Self> {
        Self::Transaction(H256::zero())..=Self::Transaction(H256::repeat_byte(u8::MAX))
    }

    #[must_use]
    pub const fn proposals() -> RangeInclusive<Self> {
        Self::Proposal(ProposalId::MIN)..=Self::Proposal(ProposalId::MAX)
    }

    #[must_use]
    pub const fn limit_orders() -> RangeInclusive<Self> {
        Self::LimitOrder(OrderId::MIN)..=Self::LimitOrder(OrderId::MAX)
    }

    #[must_use]
    pub const fn price_feeds() -> RangeInclusive<Self> {
        Self::PriceFeed(AssetId::MIN, ProducerId::MIN)..=Self::PriceFeed(AssetId::MAX, ProducerId::MAX)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GlobalProperties {
    pub parameters: ChainParameters,
    /// Staged by the committee and promoted at the next maintenance pass.
    pub pending_parameters: Option<ChainParameters>,
    pub active_producers: Vec<ProducerId>,
    pub committee: Address,
    pub next_producer_id: ProducerId,
}

#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct DynamicGlobalProperties {
    pub head_block_number: BlockNumber,
    pub head_block_id: BlockId,
    pub time: UnixSeconds,
    pub current_producer: ProducerId,
    /// Absolute slot of the head block counted from genesis.
    pub current_aslot: Slot,
    /// Bit `i` is set if the slot `i` slots before the head was filled.
    pub recent_slots_filled: u128,
    pub last_irreversible_block_num: BlockNumber,
    pub next_maintenance_time: UnixSeconds,
    pub random_seed: H256,
    pub fee_pool: Amount,
    pub next_proposal_id: ProposalId,
    pub next_order_id: OrderId,
}

#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct ShuffledProducers {
    pub producers: Vec<ProducerId>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Producer {
    pub id: ProducerId,
    pub account: Address,
    pub signing_key: PublicKey,
    pub last_aslot: Slot,
    pub last_confirmed_block_num: BlockNumber,
    pub last_change_signing_key_block_num: BlockNumber,
    /// Commitment to the secret the producer must reveal in its next block.
    pub next_secret_hash: Option<H256>,
    pub total_produced: u64,
    pub total_missed: u64,
}

impl Producer {
    #[must_use]
    pub const fn new(id: ProducerId, account: Address, signing_key: PublicKey) -> Self {
        Self {
            id,
            account,
            signing_key,
            last_aslot: 0,
            last_confirmed_block_num: 0,
            last_change_signing_key_block_num: 0,
            next_secret_hash: None,
            total_produced: 0,
            total_missed: 0,
        }
    }

    /// Whether the producer has committed to a secret with its current signing key.
    #[must_use]
    pub fn must_reveal_secret(&self) -> bool {
        self.next_secret_hash.is_some()
            && self.last_confirmed_block_num > self.last_change_signing_key_block_num
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Balance {
    pub amount: Amount,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockSummary {
    pub block_id: BlockId,
}

/// Replay protection. Kept until the transaction expires.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TransactionRecord {
    pub expiration: UnixSeconds,
    pub transaction: SignedTransaction,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer: Address,
    pub expiration: UnixSeconds,
    pub operations: Vec<Operation>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LimitOrder {
    pub id: OrderId,
    pub seller: Address,
    pub sell_asset: AssetId,
    /// Escrowed amount, returned to the seller when the order expires.
    pub for_sale: Amount,
    pub receive_asset: AssetId,
    pub min_to_receive: Amount,
    pub expiration: UnixSeconds,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PriceFeed {
    pub price: Price,
    pub published: UnixSeconds,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Contract {
    pub owner: Address,
    pub code_hash: H256,
    pub invocations: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockedAddress;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OperationAllowList {
    pub operations: EnumSet<OperationKind>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MultisigAuthority {
    pub threshold: u32,
    pub keys: Vec<PublicKey>,
}

#[derive(Clone, PartialEq, Eq, Debug, From)]
pub enum Object {
    GlobalProperties(GlobalProperties),
    DynamicGlobalProperties(DynamicGlobalProperties),
    ShuffledProducers(ShuffledProducers),
    Producer(Producer),
    Balance(Balance),
    BlockSummary(BlockSummary),
    TransactionRecord(TransactionRecord),
    Proposal(Proposal),
    LimitOrder(LimitOrder),
    PriceFeed(PriceFeed),
    Contract(Contract),
    BlockedAddress(BlockedAddress),
    OperationAllowList(OperationAllowList),
    MultisigAuthority(MultisigAuthority),
}

/// A concrete type stored in an [`Object`] variant.
pub trait Record: Into<Object> {
    fn from_object(object: &Object) -> Option<&Self>;

    fn from_object_mut(object: &mut Object) -> Option<&mut Self>;
}

macro_rules! impl_record {
    ($($record:ident),* $(,)?) => {
        $(
            impl Record for $record {
                fn from_object(object: &Object) -> Option<&Self> {
                    match object {
                        Object::$record(record) => Some(record),
                        _ => None,
                    }
                }

                fn from_object_mut(object: &mut Object) -> Option<&mut Self> {
                    match object {
                        Object::$record(record) => Some(record),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_record!(
    GlobalProperties,
    DynamicGlobalProperties,
    ShuffledProducers,
    Producer,
    Balance,
    BlockSummary,
    TransactionRecord,
    Proposal,
    LimitOrder,
    PriceFeed,
    Contract,
    BlockedAddress,
    OperationAllowList,
    MultisigAuthority,
);
