use anyhow::Result;
use hashing::hash_256_64;
use ledger::{Ledger as _, LedgerDatabase, ObjectKey, ShuffledProducers};
use types::primitives::{ProducerId, Slot, UnixSeconds, H256};

use crate::error::Error;

/// Time of `slot`, counted from the slot of the head block.
///
/// Slot 0 has no time. Before the first block, slots are counted from genesis.
pub fn slot_time(state: &LedgerDatabase, slot: Slot) -> Result<UnixSeconds> {
    if slot == 0 {
        return Ok(0);
    }

    let interval = state.global_properties()?.parameters.block_interval;
    let dynamic = state.dynamic_properties()?;

    if dynamic.head_block_number == 0 {
        return Ok(dynamic.time + slot * interval);
    }

    let head_slot_time = dynamic.time / interval * interval;

    Ok(head_slot_time + slot * interval)
}

/// Returns 0 if `when` is before the next slot.
pub fn slot_at_time(state: &LedgerDatabase, when: UnixSeconds) -> Result<Slot> {
    let first_slot_time = slot_time(state, 1)?;

    if when < first_slot_time {
        return Ok(0);
    }

    let interval = state.global_properties()?.parameters.block_interval;

    Ok((when - first_slot_time) / interval + 1)
}

pub trait ProducerSchedule {
    fn scheduled_producer(&self, state: &LedgerDatabase, slot: Slot) -> Result<ProducerId>;

    /// Called after every block with the head already advanced.
    fn update(&self, state: &mut LedgerDatabase) -> Result<()>;
}

/// Round-robin over the active producers, reshuffled at the start of every round.
#[derive(Clone, Copy, Default, Debug)]
pub struct ShuffledSchedule;

impl ProducerSchedule for ShuffledSchedule {
    fn scheduled_producer(&self, state: &LedgerDatabase, slot: Slot) -> Result<ProducerId> {
        let absolute_slot = state.dynamic_properties()?.current_aslot + slot;
        let producers = &state
            .require::<ShuffledProducers>(ObjectKey::ShuffledProducers)?
            .producers;

        let round_length = Slot::try_from(producers.len())?;

        if round_length == 0 {
            return Err(Error::EmptySchedule.into());
        }

        let index = usize::try_from(absolute_slot % round_length)?;

        producers
            .get(index)
            .copied()
            .ok_or_else(|| Error::EmptySchedule.into())
    }

    fn update(&self, state: &mut LedgerDatabase) -> Result<()> {
        let dynamic = state.dynamic_properties()?;
        let head = dynamic.head_block_number;
        let seed = dynamic.random_seed;
        let mut producers = state.global_properties()?.active_producers.clone();

        let round_length = u32::try_from(producers.len())?;

        if round_length == 0 || head % round_length != 0 {
            return Ok(());
        }

        shuffle(&mut producers, seed);

        state.upsert(
            ObjectKey::ShuffledProducers,
            ShuffledProducers { producers }.into(),
        )
    }
}

// Fisher-Yates driven by the random seed.
fn shuffle(producers: &mut [ProducerId], seed: H256) {
    let length = producers.len();

    for (index, nonce) in (0..length).zip(0_u64..) {
        let remaining = u64::try_from(length - index).expect("slice length fits in u64");
        let offset = hash_256_64(seed, nonce).to_low_u64_le() % remaining;
        let offset = usize::try_from(offset).expect("offset is below slice length");

        producers.swap(index, index + offset);
    }
}
