use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{ensure, Context as _, Result};
use fork_db::{ForkDatabase, ForkItem};
use itertools::Itertools as _;
use ledger::{genesis_objects, Ledger as _, LedgerDatabase};
use log::{debug, info, warn};
use transition_functions::{
    apply_transaction, BlockProcessor, ChainContext, DebugUpdate, EventSink, ProducerSchedule,
    ShuffledSchedule,
};
use types::{
    block::{BlockHeader, SignedBlock},
    config::{ChainConfig, GenesisConfig},
    consts::GENESIS_BLOCK_ID,
    crypto::{self, SigningKey},
    primitives::{BlockId, BlockNumber, ProducerId, Slot, TransactionId, UnixSeconds, H256},
    skip::{Skip, SkipFlags},
    transaction::{ProcessedTransaction, SignedTransaction},
};

use crate::{
    block_producer, block_store::BlockStore, error::Error, pending::PendingPool,
    retention::RetentionPolicy,
};

/// A single replica of the chain.
///
/// Owns the ledger state, the fork index, the canonical block archive and the pending pool.
/// Every mutation of the ledger goes through an undo session, so a failed block or transaction
/// leaves no trace.
pub struct Chain<S = ShuffledSchedule, E = ()> {
    config: ChainConfig,
    schedule: S,
    events: E,
    state: LedgerDatabase,
    fork_db: ForkDatabase,
    block_store: BlockStore,
    context: ChainContext,
    pending: PendingPool,
    retention: RetentionPolicy,
    debug_updates: Vec<DebugUpdate>,
}

impl<S: ProducerSchedule, E: EventSink> Chain<S, E> {
    pub fn new(
        config: ChainConfig,
        genesis: &GenesisConfig,
        schedule: S,
        events: E,
    ) -> Result<Self> {
        let objects = genesis_objects(genesis).context("genesis configuration is invalid")?;
        let state = LedgerDatabase::new(objects, config.live_undo_depth);

        info!(
            "initialized chain {:?} with {} producers",
            config.chain_id,
            genesis.producers.len(),
        );

        Ok(Self {
            config,
            schedule,
            events,
            state,
            fork_db: ForkDatabase::default(),
            block_store: BlockStore::default(),
            context: ChainContext::default(),
            pending: PendingPool::default(),
            retention: RetentionPolicy::default(),
            debug_updates: vec![],
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// State including the effects of pending transactions.
    #[must_use]
    pub const fn state(&self) -> &LedgerDatabase {
        &self.state
    }

    #[must_use]
    pub const fn fork_db(&self) -> &ForkDatabase {
        &self.fork_db
    }

    #[must_use]
    pub fn pending_transactions(&self) -> &[ProcessedTransaction] {
        self.pending.transactions()
    }

    pub fn head_block_number(&self) -> Result<BlockNumber> {
        self.state.head_block_number()
    }

    pub fn head_block_id(&self) -> Result<BlockId> {
        self.state.head_block_id()
    }

    pub fn head_block_time(&self) -> Result<UnixSeconds> {
        self.state.head_block_time()
    }

    pub fn last_irreversible_block_number(&self) -> Result<BlockNumber> {
        Ok(self.state.dynamic_properties()?.last_irreversible_block_num)
    }

    pub fn slot_time(&self, slot: Slot) -> Result<UnixSeconds> {
        transition_functions::slot_time(&self.state, slot)
    }

    pub fn slot_at_time(&self, when: UnixSeconds) -> Result<Slot> {
        transition_functions::slot_at_time(&self.state, when)
    }

    pub fn scheduled_producer(&self, slot: Slot) -> Result<ProducerId> {
        self.schedule.scheduled_producer(&self.state, slot)
    }

    /// Pushes a block received from the network or produced locally.
    ///
    /// Returns `true` if the block made a different branch canonical.
    pub fn push_block(&mut self, block: Arc<SignedBlock>, skip: SkipFlags) -> Result<bool> {
        self.with_pending_restored(|chain, _| chain.push_block_without_pending(block, skip))
    }

    /// Reverts the head block. Its transactions are offered to the pending pool again.
    pub fn pop_block(&mut self) -> Result<Arc<SignedBlock>> {
        self.with_pending_restored(|chain, _| chain.pop_head_block())
    }

    /// Applies a transaction on top of the pending state and keeps it for the next block.
    pub fn push_transaction(
        &mut self,
        transaction: &SignedTransaction,
        skip: SkipFlags,
    ) -> Result<ProcessedTransaction> {
        let processed = self.apply_on_pending_state(transaction, skip, true)?;

        self.pending.push(processed.clone());
        self.events.pending_transaction(transaction);

        Ok(processed)
    }

    /// Checks that a transaction would apply on top of the pending state without keeping it.
    pub fn validate_transaction(
        &mut self,
        transaction: &SignedTransaction,
    ) -> Result<ProcessedTransaction> {
        self.apply_on_pending_state(transaction, SkipFlags::empty(), false)
    }

    pub fn clear_pending(&mut self) {
        let dropped = self.pending.take(&mut self.state);

        if !dropped.is_empty() {
            debug!("cleared {} pending transactions", dropped.len());
        }
    }

    /// Assembles, signs and pushes a block for `producer_id` in the slot containing `when`.
    pub fn generate_block(
        &mut self,
        when: UnixSeconds,
        producer_id: ProducerId,
        signing_key: &SigningKey,
        skip: SkipFlags,
    ) -> Result<Arc<SignedBlock>> {
        self.with_pending_restored(|chain, pending| {
            chain.generate_block_from(pending, when, producer_id, signing_key, skip)
        })
    }

    /// IDs of the blocks on the branch ending at `head_of_fork`, from its tip down to the
    /// block it shares with the canonical chain. The shared block comes last.
    pub fn block_ids_on_fork(&self, head_of_fork: BlockId) -> Result<Vec<BlockId>> {
        let (canonical, fork) = self
            .fork_db
            .fetch_branch_from(self.head_block_id()?, head_of_fork)?;

        let common_ancestor = canonical
            .last()
            .or_else(|| fork.last())
            .map_or(head_of_fork, |item| item.previous_id);

        Ok(fork
            .iter()
            .map(|item| item.id)
            .chain(core::iter::once(common_ancestor))
            .collect())
    }

    #[must_use]
    pub fn is_known_block(&self, block_id: BlockId) -> bool {
        self.fork_db.is_known_block(block_id) || self.block_store.contains(block_id)
    }

    #[must_use]
    pub fn is_known_transaction(&self, transaction_id: TransactionId) -> bool {
        self.state.is_known_transaction(transaction_id)
    }

    #[must_use]
    pub fn fetch_block_by_id(&self, block_id: BlockId) -> Option<Arc<SignedBlock>> {
        self.fork_db
            .fetch_block(block_id)
            .map(|item| &item.block)
            .or_else(|| self.block_store.fetch_by_id(block_id))
            .cloned()
    }

    /// Prefers the fork index when it holds exactly one block at `number`.
    #[must_use]
    pub fn fetch_block_by_number(&self, number: BlockNumber) -> Option<Arc<SignedBlock>> {
        if let Ok(item) = self.fork_db.fetch_block_by_number(number).into_iter().exactly_one() {
            return Some(Arc::clone(&item.block));
        }

        self.block_store.fetch_by_number(number).cloned()
    }

    #[must_use]
    pub fn block_id_for_number(&self, number: BlockNumber) -> Option<BlockId> {
        if number == 0 {
            return Some(GENESIS_BLOCK_ID);
        }

        self.block_store.id_for_number(number)
    }

    pub fn add_checkpoints(&mut self, checkpoints: BTreeMap<BlockNumber, BlockId>) {
        self.config.checkpoints.extend(checkpoints);
    }

    /// Whether the head has not yet passed the last checkpoint.
    pub fn before_last_checkpoint(&self) -> Result<bool> {
        let head_block_number = self.head_block_number()?;

        Ok(self
            .config
            .last_checkpoint()
            .is_some_and(|last_checkpoint| last_checkpoint >= head_block_number))
    }

    /// Objects overwritten at the end of every block applied from now on.
    pub fn set_debug_updates(&mut self, debug_updates: Vec<DebugUpdate>) {
        self.debug_updates = debug_updates;
    }

    fn with_pending_restored<T>(
        &mut self,
        operation: impl FnOnce(&mut Self, &[ProcessedTransaction]) -> Result<T>,
    ) -> Result<T> {
        let pending = self.pending.take(&mut self.state);
        let result = operation(self, &pending);
        self.restore_pending(pending);
        result
    }

    // Transactions from popped blocks go first, followed by those that were pending.
    // Restored transactions were announced when they first arrived.
    fn restore_pending(&mut self, pending: Vec<ProcessedTransaction>) {
        let popped = self.pending.take_popped();

        for transaction in popped.iter().chain(pending.iter().map(|pending| &pending.signed)) {
            match self.apply_on_pending_state(transaction, SkipFlags::empty(), true) {
                Ok(processed) => self.pending.push(processed),
                Err(error) => debug!(
                    "dropped transaction {:?} from pending pool: {error}",
                    transaction.id(),
                ),
            }
        }
    }

    fn apply_on_pending_state(
        &mut self,
        transaction: &SignedTransaction,
        skip: SkipFlags,
        keep: bool,
    ) -> Result<ProcessedTransaction> {
        let mut context = ChainContext::default();
        context.start_block(self.head_block_number()? + 1);

        let detached = match self.pending.take_session() {
            Some(detached) => detached,
            None => self.state.start_session().detach(),
        };

        let mut pending_session = self.state.resume(detached);

        let result = {
            let mut session = pending_session.start_session();
            let result =
                apply_transaction(&self.config, &mut context, &mut session, transaction, skip);

            if keep && result.is_ok() {
                session.merge();
            }

            result
        };

        self.pending.set_session(pending_session.detach());

        result
    }

    fn push_block_without_pending(
        &mut self,
        block: Arc<SignedBlock>,
        skip: SkipFlags,
    ) -> Result<bool> {
        let block_id = block.id();

        if !skip.contains(Skip::ForkDatabase) {
            let new_head = self.fork_db.push_block(Arc::clone(&block))?;
            let head_block_id = self.head_block_id()?;

            if new_head.previous_id != head_block_id {
                if new_head.number > self.head_block_number()? {
                    self.switch_to_fork(&new_head, skip)?;
                    return Ok(true);
                }

                debug!(
                    "block {block_id:?} extends a shorter fork, head stays at {head_block_id:?}",
                );

                return Ok(false);
            }
        }

        if let Err(error) = self.apply_and_commit(&block, skip) {
            warn!("failed to push block {block_id:?}: {error:?}");
            self.fork_db.remove(block_id);
            return Err(error);
        }

        Ok(false)
    }

    fn switch_to_fork(&mut self, new_head: &Arc<ForkItem>, skip: SkipFlags) -> Result<()> {
        let old_head = self.head_block_id()?;

        info!(
            "switching to fork at {:?} (number: {})",
            new_head.id, new_head.number,
        );

        let (new_branch, old_branch) = self.fork_db.fetch_branch_from(new_head.id, old_head)?;

        let common_ancestor = new_branch
            .last()
            .map_or(old_head, |item| item.previous_id);

        self.pop_to(common_ancestor)?;

        for item in new_branch.iter().rev() {
            let Err(error) = self.apply_and_commit(&item.block, skip) else {
                continue;
            };

            warn!(
                "failed to apply block {:?} from fork, restoring previous branch: {error:?}",
                item.id,
            );

            self.fork_db.remove(item.id);

            let old_tip = old_branch
                .first()
                .or_else(|| self.fork_db.fetch_block(old_head))
                .cloned();

            if let Some(old_tip) = old_tip {
                self.fork_db.set_head(old_tip);
            }

            self.pop_to(common_ancestor)?;

            for item in old_branch.iter().rev() {
                self.apply_and_commit(&item.block, skip)?;
            }

            return Err(error);
        }

        Ok(())
    }

    fn pop_to(&mut self, block_id: BlockId) -> Result<()> {
        while self.head_block_id()? != block_id {
            self.pop_head_block()?;
        }

        Ok(())
    }

    fn pop_head_block(&mut self) -> Result<Arc<SignedBlock>> {
        self.pending.discard_session(&mut self.state);

        let head_block_id = self.head_block_id()?;

        let block = self
            .block_store
            .fetch_by_id(head_block_id)
            .cloned()
            .ok_or(Error::EmptyChain)?;

        self.state.pop_undo()?;

        if self
            .fork_db
            .head()
            .is_some_and(|head| head.id == head_block_id)
        {
            self.fork_db.pop_block()?;
        }

        self.block_store.remove(head_block_id);

        let transactions = block
            .transactions
            .iter()
            .map(|transaction| transaction.signed.clone())
            .collect_vec();

        debug!(
            "popped block {head_block_id:?} with {} transactions",
            transactions.len(),
        );

        self.events.transactions_removed(transactions.clone());
        self.pending.queue_popped(transactions);

        Ok(block)
    }

    fn apply_and_commit(&mut self, block: &Arc<SignedBlock>, skip: SkipFlags) -> Result<()> {
        let depth = self
            .retention
            .observe(&self.config, block.timestamp, unix_time_now());

        self.state.set_retained_depth(depth);

        let mut session = self.state.start_session();

        let processor = BlockProcessor::new(
            &self.config,
            &self.schedule,
            &self.events,
            &self.debug_updates,
        );

        if let Err(error) = processor.apply_block(&mut self.context, &mut session, block, skip) {
            self.context.clear();
            return Err(error);
        }

        session.commit();

        self.block_store.store(Arc::clone(block));

        let dynamic = self.state.dynamic_properties()?;
        let reversible = dynamic.head_block_number - dynamic.last_irreversible_block_num;

        self.fork_db.set_max_size(reversible + 1);

        Ok(())
    }

    fn generate_block_from(
        &mut self,
        pending: &[ProcessedTransaction],
        when: UnixSeconds,
        producer_id: ProducerId,
        signing_key: &SigningKey,
        skip: SkipFlags,
    ) -> Result<Arc<SignedBlock>> {
        let slot = self.slot_at_time(when)?;

        ensure!(slot > 0, Error::NoSlotAt { when });

        let scheduled = self.scheduled_producer(slot)?;

        ensure!(
            scheduled == producer_id,
            Error::NotScheduled {
                producer_id,
                scheduled,
                when,
            },
        );

        let producer = self.state.producer(producer_id)?.clone();

        if !skip.contains(Skip::ProducerSignature) {
            ensure!(
                signing_key.verifying_key() == producer.signing_key,
                Error::SigningKeyMismatch { producer_id },
            );
        }

        let previous = self.head_block_id()?;

        self.context.start_block(self.head_block_number()? + 1);

        // The block is applied again when pushed, so assembly leaves no changes behind.
        let mut session = self.state.start_session();

        let assembled = block_producer::assemble_transactions(
            &self.config,
            &mut self.context,
            &mut session,
            pending,
            skip,
        );

        drop(session);

        let fee_total = self.context.collected_fees;

        self.context.clear();

        let transactions = assembled?;

        let previous_secret = match producer.next_secret_hash {
            Some(commitment) if producer.must_reveal_secret() => {
                let number = producer.last_confirmed_block_num - 1;

                let reference = self
                    .block_id_for_number(number)
                    .ok_or(Error::UnknownBlockNumber { number })?;

                let secret = crypto::producer_secret(signing_key, reference);

                ensure!(
                    crypto::secret_commitment(secret) == commitment,
                    Error::SecretCommitmentMismatch { producer_id },
                );

                secret
            }
            Some(commitment) => commitment,
            None => H256::zero(),
        };

        let mut block = SignedBlock {
            header: BlockHeader {
                previous,
                timestamp: when,
                producer: producer_id,
                transaction_merkle_root: H256::zero(),
                fee_total,
                previous_secret,
                next_secret_hash: crypto::secret_commitment(crypto::producer_secret(
                    signing_key,
                    previous,
                )),
            },
            signature: None,
            transactions,
        };

        block.header.transaction_merkle_root = block.calculate_merkle_root();

        if !skip.contains(Skip::ProducerSignature) {
            block.sign(signing_key);
        }

        if !skip.contains(Skip::BlockSizeCheck) {
            let size = block.packed_size();
            let maximum = self.state.global_properties()?.parameters.maximum_block_size;

            ensure!(size <= maximum, Error::BlockTooLarge { size, maximum });
        }

        let block = Arc::new(block);

        self.push_block_without_pending(Arc::clone(&block), skip)?;

        info!(
            "produced block {} ({:?}) with {} transactions",
            block.block_number(),
            block.id(),
            block.transactions.len(),
        );

        Ok(block)
    }
}

fn unix_time_now() -> UnixSeconds {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}
