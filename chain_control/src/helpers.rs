use std::sync::Arc;

use anyhow::Result;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use ledger::Ledger as _;
use transition_functions::{ChainEvent, ShuffledSchedule};
use types::{
    block::SignedBlock,
    config::{ChainConfig, GenesisConfig},
    consts::CORE_ASSET,
    crypto::SigningKey,
    primitives::{Address, Amount, ProducerId, Slot},
    skip::SkipFlags,
    transaction::{ProcessedTransaction, SignedTransaction},
};

use crate::chain::Chain;

/// Seed of the only account funded at genesis.
pub const FUNDED: u8 = 10;

pub type TestChain = Chain<ShuffledSchedule, UnboundedSender<ChainEvent>>;

/// A chain whose producers use seeds `1..=producer_count`, so producer `i` signs with seed `i + 1`.
pub struct Context {
    chain: TestChain,
    events: UnboundedReceiver<ChainEvent>,
}

impl Context {
    #[must_use]
    pub fn new(producer_count: u8) -> Self {
        Self::with_config(factory::chain_config(), producer_count)
    }

    #[must_use]
    pub fn with_config(config: ChainConfig, producer_count: u8) -> Self {
        Self::with_genesis(config, &factory::genesis(1..=producer_count, [FUNDED]))
    }

    #[must_use]
    pub fn with_genesis(config: ChainConfig, genesis: &GenesisConfig) -> Self {
        let (sender, events) = mpsc::unbounded();

        let chain = Chain::new(config, genesis, ShuffledSchedule, sender)
            .expect("genesis configuration used in tests is valid");

        Self { chain, events }
    }

    pub const fn chain(&self) -> &TestChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut TestChain {
        &mut self.chain
    }

    /// Produces a block in `slot` (counted from the head) with the producer scheduled for it.
    pub fn produce_block_in_slot(&mut self, slot: Slot) -> Result<Arc<SignedBlock>> {
        let when = self.chain.slot_time(slot)?;
        let producer_id = self.chain.scheduled_producer(slot)?;

        self.chain.generate_block(
            when,
            producer_id,
            &producer_key(producer_id),
            SkipFlags::empty(),
        )
    }

    pub fn produce_block(&mut self) -> Result<Arc<SignedBlock>> {
        self.produce_block_in_slot(1)
    }

    pub fn push_block(&mut self, block: &Arc<SignedBlock>) -> Result<bool> {
        self.chain.push_block(Arc::clone(block), SkipFlags::empty())
    }

    pub fn push_transaction(
        &mut self,
        transaction: &SignedTransaction,
    ) -> Result<ProcessedTransaction> {
        self.chain.push_transaction(transaction, SkipFlags::empty())
    }

    pub fn balance(&self, owner: Address) -> Amount {
        self.chain
            .state()
            .balance(owner, CORE_ASSET)
            .expect("balances can always be read")
    }

    pub fn drain_events(&mut self) -> Vec<ChainEvent> {
        core::iter::from_fn(|| self.events.try_next().ok().flatten()).collect()
    }
}

pub fn producer_key(producer_id: ProducerId) -> SigningKey {
    let seed = u8::try_from(producer_id + 1).expect("tests use fewer than 255 producers");
    factory::signing_key(seed)
}

/// Copies a block, lets `tamper` modify it and signs the result again with the producer's key.
pub fn tampered(block: &SignedBlock, tamper: impl FnOnce(&mut SignedBlock)) -> Arc<SignedBlock> {
    let mut block = block.clone();
    tamper(&mut block);
    block.sign(&producer_key(block.producer));
    Arc::new(block)
}
