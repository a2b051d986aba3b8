use anyhow::{ensure, Result};
use derive_more::Constructor;
use enumset::EnumSet;
use ledger::{Ledger as _, LedgerDatabase, ObjectKey, Producer};
use log::debug;
use types::{
    block::SignedBlock,
    config::ChainConfig,
    crypto::secret_commitment,
    primitives::Slot,
    skip::{Skip, SkipFlags},
};

use crate::{
    context::ChainContext,
    end_of_block::{self, DebugUpdate},
    error::Error,
    events::EventSink,
    schedule::{slot_at_time, ProducerSchedule},
    transaction_processing::apply_transaction,
};

/// Applies blocks on top of the head of a [`LedgerDatabase`].
///
/// Sessions are the caller's responsibility. A failed block leaves `state` partially modified.
#[derive(Constructor)]
pub struct BlockProcessor<'a> {
    config: &'a ChainConfig,
    schedule: &'a dyn ProducerSchedule,
    events: &'a dyn EventSink,
    debug_updates: &'a [DebugUpdate],
}

impl BlockProcessor<'_> {
    pub fn apply_block(
        &self,
        context: &mut ChainContext,
        state: &mut LedgerDatabase,
        block: &SignedBlock,
        mut skip: SkipFlags,
    ) -> Result<()> {
        let block_number = block.block_number();

        if let Some(in_config) = self.config.checkpoints.get(&block_number).copied() {
            let in_block = block.id();

            ensure!(
                in_config == in_block,
                Error::CheckpointMismatch {
                    number: block_number,
                    in_config,
                    in_block,
                },
            );
        }

        if self
            .config
            .last_checkpoint()
            .is_some_and(|last_checkpoint| block_number <= last_checkpoint)
        {
            skip = EnumSet::all() - Skip::ContractExecution;
        }

        if !skip.contains(Skip::MerkleCheck) {
            let computed = block.calculate_merkle_root();
            let in_block = block.transaction_merkle_root;

            ensure!(
                computed == in_block,
                Error::MerkleRootMismatch { computed, in_block },
            );
        }

        let slot = self.validate_block_header(state, block, skip)?;

        context.start_block(block_number);

        for (transaction_index, transaction) in block.transactions.iter().enumerate() {
            let processed = apply_transaction(
                self.config,
                context,
                state,
                &transaction.signed,
                skip,
            )?;

            if !skip.contains(Skip::ContractExecution) {
                ensure!(
                    processed.operation_results == transaction.operation_results,
                    Error::OperationResultsMismatch { transaction_index },
                );
            }
        }

        if self.config.is_fee_check_exempt(block_number) {
            debug!("skipping fee check for block {block_number}");
        } else {
            let computed = context.collected_fees;
            let in_block = block.fee_total;

            ensure!(
                computed == in_block,
                Error::FeeTotalMismatch { computed, in_block },
            );
        }

        let producer = state.producer(block.producer)?;

        if producer.must_reveal_secret() {
            ensure!(
                producer.next_secret_hash == Some(secret_commitment(block.previous_secret)),
                Error::SecretMismatch {
                    producer_id: producer.id,
                },
            );
        }

        end_of_block::finish_block(
            self.schedule,
            self.events,
            self.debug_updates,
            context,
            state,
            block,
            slot,
        )
    }

    /// Returns the slot the block was produced in, counted from the current head.
    fn validate_block_header(
        &self,
        state: &LedgerDatabase,
        block: &SignedBlock,
        skip: SkipFlags,
    ) -> Result<Slot> {
        let head = state.head_block_id()?;
        let head_time = state.head_block_time()?;

        ensure!(
            block.previous == head,
            Error::PreviousMismatch {
                head,
                in_block: block.previous,
            },
        );

        ensure!(
            block.timestamp > head_time,
            Error::TimestampNotAfterHead {
                head_time,
                in_block: block.timestamp,
            },
        );

        let producer_id = block.producer;

        let producer = state
            .record::<Producer>(ObjectKey::Producer(producer_id))?
            .ok_or(Error::UnknownProducer { producer_id })?;

        if !skip.contains(Skip::ProducerSignature) {
            ensure!(
                block.validate_signee(&producer.signing_key),
                Error::InvalidProducerSignature { producer_id },
            );
        }

        let slot = slot_at_time(state, block.timestamp)?;

        if !skip.contains(Skip::ProducerScheduleCheck) {
            ensure!(
                slot > 0,
                Error::InvalidSlot {
                    timestamp: block.timestamp,
                },
            );

            let scheduled = self.schedule.scheduled_producer(state, slot)?;

            ensure!(
                scheduled == producer_id,
                Error::WrongProducer {
                    scheduled,
                    in_block: producer_id,
                },
            );
        }

        Ok(slot)
    }
}
