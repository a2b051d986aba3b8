//! Bookkeeping performed after every transaction in a block has been applied.

use anyhow::Result;
use hashing::hash_256_256;
use itertools::Itertools as _;
use ledger::{
    BlockSummary, DynamicGlobalProperties, GlobalProperties, Ledger as _, LedgerDatabase,
    LimitOrder, Object, ObjectKey, PriceFeed, Producer, Proposal, Record as _, TransactionRecord,
};
use log::{debug, info};
use static_assertions::const_assert_eq;
use tap::Tap as _;
use types::{
    block::SignedBlock,
    consts::{BLOCK_SUMMARY_WINDOW, CORE_ASSET, PERCENT_100},
    primitives::{Amount, BlockNumber, ProducerId, Slot, UnixSeconds},
};

use crate::{context::ChainContext, events::EventSink, schedule::ProducerSchedule};

const_assert_eq!(BLOCK_SUMMARY_WINDOW, 1 << u16::BITS);

/// Node-local override applied after every block. `None` removes the object.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DebugUpdate {
    pub key: ObjectKey,
    pub value: Option<Object>,
}

pub fn finish_block(
    schedule: &dyn ProducerSchedule,
    events: &dyn EventSink,
    debug_updates: &[DebugUpdate],
    context: &mut ChainContext,
    state: &mut LedgerDatabase,
    block: &SignedBlock,
    slot: Slot,
) -> Result<()> {
    let block_id = block.id();
    let block_number = block.block_number();

    update_global_dynamic_data(schedule, state, block, slot)?;
    update_signing_producer(state, block)?;

    state.update(
        ObjectKey::DynamicGlobalProperties,
        |dynamic: &mut DynamicGlobalProperties| {
            dynamic.random_seed = hash_256_256(dynamic.random_seed, block.previous_secret);
        },
    )?;

    schedule.update(state)?;

    update_last_irreversible_block(state)?;

    if state.dynamic_properties()?.next_maintenance_time <= block.timestamp {
        perform_maintenance(state, block.timestamp)?;
    }

    let summary_index = u16::try_from(block_number % BLOCK_SUMMARY_WINDOW)
        .expect("block summary window fits in u16");

    state.upsert(
        ObjectKey::BlockSummary(summary_index),
        BlockSummary { block_id }.into(),
    )?;

    clear_expired_objects(state, block.timestamp)?;
    pay_producer(state, block.producer, context.collected_fees)?;

    for DebugUpdate { key, value } in debug_updates {
        match value {
            Some(value) => state.upsert(*key, value.clone())?,
            None if state.contains_key(key) => {
                state.remove(key)?;
            }
            None => {}
        }
    }

    events.block_applied(block_id, block_number, context.take_applied_operations());

    context.clear();

    Ok(())
}

fn update_global_dynamic_data(
    schedule: &dyn ProducerSchedule,
    state: &mut LedgerDatabase,
    block: &SignedBlock,
    slot: Slot,
) -> Result<()> {
    // Slots before the block's own slot were left empty by their producers.
    for missed_slot in 1..slot {
        let producer_id = schedule.scheduled_producer(state, missed_slot)?;

        if producer_id == block.producer {
            continue;
        }

        debug!("producer {producer_id} missed slot {missed_slot}");

        state.update(ObjectKey::Producer(producer_id), |producer: &mut Producer| {
            producer.total_missed += 1;
        })?;
    }

    let block_id = block.id();
    let block_number = block.block_number();

    state.update(
        ObjectKey::DynamicGlobalProperties,
        |dynamic: &mut DynamicGlobalProperties| {
            let shifted = u32::try_from(slot)
                .ok()
                .and_then(|slot| dynamic.recent_slots_filled.checked_shl(slot))
                .unwrap_or_default();

            dynamic.head_block_number = block_number;
            dynamic.head_block_id = block_id;
            dynamic.time = block.timestamp;
            dynamic.current_producer = block.producer;
            dynamic.current_aslot += slot;
            dynamic.recent_slots_filled = shifted | 1;
        },
    )
}

fn update_signing_producer(state: &mut LedgerDatabase, block: &SignedBlock) -> Result<()> {
    let current_aslot = state.dynamic_properties()?.current_aslot;
    let block_number = block.block_number();

    state.update(ObjectKey::Producer(block.producer), |producer: &mut Producer| {
        producer.last_aslot = current_aslot;
        producer.last_confirmed_block_num = block_number;
        producer.next_secret_hash = Some(block.next_secret_hash);
        producer.total_produced += 1;
    })
}

fn update_last_irreversible_block(state: &mut LedgerDatabase) -> Result<()> {
    let global = state.global_properties()?;
    let threshold_percent = global.parameters.irreversible_threshold_percent;

    let confirmed = global
        .active_producers
        .iter()
        .map(|producer_id| Ok(state.producer(*producer_id)?.last_confirmed_block_num))
        .collect::<Result<Vec<_>>>()?;

    let Some(new_irreversible) = irreversible_block_number(confirmed, threshold_percent) else {
        return Ok(());
    };

    state.update(
        ObjectKey::DynamicGlobalProperties,
        |dynamic: &mut DynamicGlobalProperties| {
            if new_irreversible > dynamic.last_irreversible_block_num {
                dynamic.last_irreversible_block_num = new_irreversible;
            }
        },
    )
}

/// The highest block confirmed by at least `threshold_percent` of the producers.
fn irreversible_block_number(
    confirmed: Vec<BlockNumber>,
    threshold_percent: u64,
) -> Option<BlockNumber> {
    let last = confirmed.len().checked_sub(1)?;
    let producer_count = u64::try_from(confirmed.len()).ok()?;
    let offset = PERCENT_100.saturating_sub(threshold_percent) * producer_count / PERCENT_100;

    // A threshold of zero points one past the highest confirmation.
    let offset = usize::try_from(offset).ok()?.min(last);

    confirmed.into_iter().sorted_unstable().nth(offset)
}

fn perform_maintenance(state: &mut LedgerDatabase, timestamp: UnixSeconds) -> Result<()> {
    state.update(ObjectKey::GlobalProperties, |global: &mut GlobalProperties| {
        if let Some(parameters) = global.pending_parameters.take() {
            global.parameters = parameters;
        }
    })?;

    let parameters = state.global_properties()?.parameters.clone();

    let candidates = state
        .range(ObjectKey::producers())
        .filter_map(|(_, object)| Producer::from_object(object))
        .map(|producer| Ok((producer.id, state.balance(producer.account, CORE_ASSET)?)))
        .collect::<Result<Vec<_>>>()?;

    let max_producer_count = usize::try_from(parameters.max_producer_count)?;

    let active_producers = elect_producers(candidates, max_producer_count)
        .tap(|elected| info!("maintenance at {timestamp} elected producers {elected:?}"));

    distribute_fee_pool(state, &active_producers)?;

    state.update(ObjectKey::GlobalProperties, |global: &mut GlobalProperties| {
        global.active_producers = active_producers;
    })?;

    let interval = parameters.maintenance_interval;

    state.update(
        ObjectKey::DynamicGlobalProperties,
        |dynamic: &mut DynamicGlobalProperties| {
            dynamic.next_maintenance_time = (timestamp / interval + 1) * interval;
        },
    )
}

/// Candidates with the largest pledge win. Ties go to the older producer.
fn elect_producers(
    candidates: Vec<(ProducerId, Amount)>,
    max_producer_count: usize,
) -> Vec<ProducerId> {
    candidates
        .into_iter()
        .sorted_by(|(left_id, left_pledge), (right_id, right_pledge)| {
            right_pledge.cmp(left_pledge).then(left_id.cmp(right_id))
        })
        .take(max_producer_count)
        .map(|(producer_id, _)| producer_id)
        .sorted_unstable()
        .collect_vec()
}

// The remainder of an uneven split stays in the pool.
fn distribute_fee_pool(state: &mut LedgerDatabase, active_producers: &[ProducerId]) -> Result<()> {
    let fee_pool = state.dynamic_properties()?.fee_pool;
    let producer_count = Amount::try_from(active_producers.len())?;

    if producer_count == 0 || fee_pool < producer_count {
        return Ok(());
    }

    let share = fee_pool / producer_count;

    for producer_id in active_producers {
        let account = state.producer(*producer_id)?.account;
        state.increase_balance(account, CORE_ASSET, share)?;
    }

    state.update(
        ObjectKey::DynamicGlobalProperties,
        |dynamic: &mut DynamicGlobalProperties| {
            dynamic.fee_pool -= share * producer_count;
        },
    )
}

fn clear_expired_objects(state: &mut LedgerDatabase, now: UnixSeconds) -> Result<()> {
    let expired_transactions = state
        .range(ObjectKey::transactions())
        .filter(|(_, object)| {
            TransactionRecord::from_object(object).is_some_and(|record| record.expiration <= now)
        })
        .map(|(key, _)| *key)
        .collect_vec();

    let expired_proposals = state
        .range(ObjectKey::proposals())
        .filter(|(_, object)| {
            Proposal::from_object(object).is_some_and(|proposal| proposal.expiration <= now)
        })
        .map(|(key, _)| *key)
        .collect_vec();

    let expired_orders = state
        .range(ObjectKey::limit_orders())
        .filter_map(|(key, object)| Some((*key, LimitOrder::from_object(object)?)))
        .filter(|(_, order)| order.expiration <= now)
        .map(|(key, order)| (key, order.seller, order.sell_asset, order.for_sale))
        .collect_vec();

    let price_feed_lifetime = state.global_properties()?.parameters.price_feed_lifetime;

    let stale_price_feeds = state
        .range(ObjectKey::price_feeds())
        .filter(|(_, object)| {
            PriceFeed::from_object(object)
                .is_some_and(|feed| feed.published.saturating_add(price_feed_lifetime) <= now)
        })
        .map(|(key, _)| *key)
        .collect_vec();

    for key in expired_transactions
        .into_iter()
        .chain(expired_proposals)
        .chain(stale_price_feeds)
    {
        state.remove(&key)?;
    }

    for (key, seller, sell_asset, for_sale) in expired_orders {
        state.remove(&key)?;
        state.increase_balance(seller, sell_asset, for_sale)?;
    }

    Ok(())
}

fn pay_producer(
    state: &mut LedgerDatabase,
    producer_id: ProducerId,
    collected_fees: Amount,
) -> Result<()> {
    let parameters = &state.global_properties()?.parameters;
    let pool_share = collected_fees * parameters.fee_pool_share_percent / PERCENT_100;
    let payment = collected_fees - pool_share + parameters.block_reward;
    let account = state.producer(producer_id)?.account;

    state.increase_balance(account, CORE_ASSET, payment)?;

    state.update(
        ObjectKey::DynamicGlobalProperties,
        |dynamic: &mut DynamicGlobalProperties| {
            dynamic.fee_pool += pool_share;
        },
    )
}

#[cfg(test)]
mod tests {
    use ledger::genesis_objects;
    use test_case::test_case;
    use types::{config::ChainParameters, primitives::Address};

    use super::*;

    const SELLER: Address = Address::repeat_byte(0x5e);

    #[test_case(vec![], 70 => None; "no producers")]
    #[test_case(vec![7], 70 => Some(7); "single producer")]
    #[test_case(vec![9, 1, 5], 70 => Some(1); "lowest of three")]
    #[test_case(vec![9, 1, 5, 4, 8, 2, 6, 3, 7, 10], 70 => Some(4); "seventy percent of ten")]
    #[test_case(vec![9, 1, 5, 4, 8, 2, 6, 3, 7, 10], 100 => Some(1); "unanimity")]
    #[test_case(vec![9, 1, 5, 4, 8, 2, 6, 3, 7, 10], 0 => Some(10); "no confirmation needed")]
    #[test_case(vec![7], 0 => Some(7); "no confirmation needed from single producer")]
    fn irreversible_block(confirmed: Vec<BlockNumber>, threshold: u64) -> Option<BlockNumber> {
        irreversible_block_number(confirmed, threshold)
    }

    #[test_case(vec![(0, 10), (1, 30), (2, 20)], 2 => vec![1, 2]; "largest pledges")]
    #[test_case(vec![(3, 10), (1, 10), (2, 10)], 2 => vec![1, 2]; "ties go to lower ids")]
    #[test_case(vec![(5, 0), (4, 1)], 5 => vec![4, 5]; "fewer candidates than seats")]
    fn election(candidates: Vec<(ProducerId, Amount)>, seats: usize) -> Vec<ProducerId> {
        elect_producers(candidates, seats)
    }

    #[test]
    fn expired_orders_are_refunded_and_live_ones_kept() -> Result<()> {
        let mut database = LedgerDatabase::new(genesis_objects(&factory::genesis([1], []))?, 1);
        let mut session = database.start_session();

        for (id, expiration) in [(0, 100), (1, 101)] {
            let order = LimitOrder {
                id,
                seller: SELLER,
                sell_asset: 3,
                for_sale: 40,
                receive_asset: CORE_ASSET,
                min_to_receive: 1,
                expiration,
            };

            session.insert(ObjectKey::LimitOrder(id), order.into())?;
        }

        clear_expired_objects(&mut session, 100)?;

        assert!(!session.contains_key(&ObjectKey::LimitOrder(0)));
        assert!(session.contains_key(&ObjectKey::LimitOrder(1)));
        assert_eq!(session.balance(SELLER, 3)?, 40);

        Ok(())
    }

    #[test]
    fn maintenance_promotes_parameters_and_splits_fee_pool() -> Result<()> {
        let mut database =
            LedgerDatabase::new(genesis_objects(&factory::genesis(1..=3, [2]))?, 1);
        let mut session = database.start_session();

        let parameters = ChainParameters {
            max_producer_count: 2,
            ..ChainParameters::default()
        };

        session.update(ObjectKey::GlobalProperties, |global: &mut GlobalProperties| {
            global.pending_parameters = Some(parameters.clone());
        })?;

        session.update(
            ObjectKey::DynamicGlobalProperties,
            |dynamic: &mut DynamicGlobalProperties| dynamic.fee_pool = 11,
        )?;

        perform_maintenance(&mut session, 1_000)?;

        let global = session.global_properties()?;

        assert_eq!(global.parameters, parameters);
        assert_eq!(global.pending_parameters, None);

        // Producer 1 is controlled by the only funded account. Producer 0 wins the tie.
        assert_eq!(global.active_producers, [0, 1]);

        let dynamic = session.dynamic_properties()?;

        assert_eq!(dynamic.fee_pool, 1);
        assert_eq!(dynamic.next_maintenance_time, 86_400);
        assert_eq!(session.balance(factory::address(1), CORE_ASSET)?, 5);
        assert_eq!(
            session.balance(factory::address(2), CORE_ASSET)?,
            factory::INITIAL_BALANCE + 5,
        );

        Ok(())
    }

    #[test]
    fn producer_payment_feeds_the_pool() -> Result<()> {
        let mut genesis = factory::genesis([1], []);

        genesis.parameters.block_reward = 10;
        genesis.parameters.fee_pool_share_percent = 25;

        let mut database = LedgerDatabase::new(genesis_objects(&genesis)?, 1);
        let mut session = database.start_session();

        pay_producer(&mut session, 0, 8)?;

        assert_eq!(session.balance(factory::address(1), CORE_ASSET)?, 16);
        assert_eq!(session.dynamic_properties()?.fee_pool, 2);

        Ok(())
    }
}
