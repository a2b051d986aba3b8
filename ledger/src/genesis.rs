use std::collections::BTreeMap;

use anyhow::{ensure, Result};
use im::OrdMap;
use log::debug;
use types::{
    config::GenesisConfig,
    consts::{GENESIS_BLOCK_ID, TEMP_ACCOUNT},
    primitives::{Address, Amount, AssetId, ProducerId},
};

use crate::{
    error::Error,
    objects::{
        Balance, BlockSummary, BlockedAddress, DynamicGlobalProperties, GlobalProperties,
        MultisigAuthority, Object, ObjectKey, OperationAllowList, Producer, ShuffledProducers,
    },
};

/// Builds the initial contents of the ledger.
///
/// Producers are assigned IDs in the order they are listed.
/// The first `max_producer_count` of them form the initial active set.
pub fn genesis_objects(config: &GenesisConfig) -> Result<OrdMap<ObjectKey, Object>> {
    let GenesisConfig {
        timestamp,
        ref parameters,
        committee,
        ref producers,
        ref balances,
        ref blocked_addresses,
        ref operation_allow_lists,
        ref multisig_authorities,
        initial_random_seed,
    } = *config;

    parameters.validate()?;

    ensure!(!producers.is_empty(), Error::NoGenesisProducers);

    let mut objects = OrdMap::new();

    let mut insert = |key: ObjectKey, object: Object| -> Result<()> {
        ensure!(
            objects.insert(key, object).is_none(),
            Error::DuplicateGenesisObject { key },
        );

        Ok(())
    };

    let mut producer_ids = vec![];

    for (producer_id, producer) in (0..).zip(producers) {
        insert(
            ObjectKey::Producer(producer_id),
            Producer::new(producer_id, producer.account, producer.signing_key).into(),
        )?;

        producer_ids.push(producer_id);
    }

    let next_producer_id = ProducerId::try_from(producer_ids.len())?;
    let active_count = usize::try_from(parameters.max_producer_count)?.min(producer_ids.len());
    let active_producers = producer_ids[..active_count].to_vec();

    let interval = parameters.maintenance_interval;
    let next_maintenance_time = (timestamp / interval + 1) * interval;

    insert(
        ObjectKey::GlobalProperties,
        GlobalProperties {
            parameters: parameters.clone(),
            pending_parameters: None,
            active_producers: active_producers.clone(),
            committee,
            next_producer_id,
        }
        .into(),
    )?;

    insert(
        ObjectKey::DynamicGlobalProperties,
        DynamicGlobalProperties {
            head_block_id: GENESIS_BLOCK_ID,
            time: timestamp,
            recent_slots_filled: u128::MAX,
            next_maintenance_time,
            random_seed: initial_random_seed,
            ..DynamicGlobalProperties::default()
        }
        .into(),
    )?;

    insert(
        ObjectKey::ShuffledProducers,
        ShuffledProducers {
            producers: active_producers,
        }
        .into(),
    )?;

    insert(
        ObjectKey::BlockSummary(0),
        BlockSummary {
            block_id: GENESIS_BLOCK_ID,
        }
        .into(),
    )?;

    let mut totals = BTreeMap::<(Address, AssetId), Amount>::new();

    for balance in balances {
        ensure!(balance.owner != TEMP_ACCOUNT, Error::TemporaryAccountFunded);

        let total = totals.entry((balance.owner, balance.asset)).or_default();

        *total = total
            .checked_add(balance.amount)
            .ok_or(Error::BalanceOverflow {
                owner: balance.owner,
                asset: balance.asset,
            })?;
    }

    for ((owner, asset), amount) in totals {
        if amount > 0 {
            insert(ObjectKey::Balance(owner, asset), Balance { amount }.into())?;
        }
    }

    for address in blocked_addresses {
        insert(ObjectKey::BlockedAddress(*address), BlockedAddress.into())?;
    }

    for allow_list in operation_allow_lists {
        insert(
            ObjectKey::OperationAllowList(allow_list.address),
            OperationAllowList {
                operations: allow_list.operations.iter().copied().collect(),
            }
            .into(),
        )?;
    }

    for multisig in multisig_authorities {
        let reachable = usize::try_from(multisig.threshold)
            .is_ok_and(|threshold| threshold > 0 && threshold <= multisig.keys.len());

        ensure!(
            reachable,
            Error::InvalidMultisigThreshold {
                address: multisig.address,
            },
        );

        insert(
            ObjectKey::Multisig(multisig.address),
            MultisigAuthority {
                threshold: multisig.threshold,
                keys: multisig.keys.clone(),
            }
            .into(),
        )?;
    }

    debug!(
        "built genesis state with {} objects and {} producers",
        objects.len(),
        producers.len(),
    );

    Ok(objects)
}
