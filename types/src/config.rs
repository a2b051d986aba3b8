use core::ops::RangeInclusive;
use std::collections::BTreeMap;

use anyhow::{ensure, Result};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    consts::PERCENT_100,
    crypto::PublicKey,
    operations::OperationKind,
    primitives::{
        Address, Amount, AssetId, BlockId, BlockNumber, ChainId, Gas, UnixSeconds, H256,
    },
};

/// Consensus parameters stored in chain state.
///
/// Changes are staged by the committee and take effect at the next maintenance pass.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainParameters {
    pub block_interval: UnixSeconds,
    pub maintenance_interval: UnixSeconds,
    pub maximum_block_size: u64,
    pub maximum_time_until_expiration: UnixSeconds,
    pub max_producer_count: u32,
    pub irreversible_threshold_percent: u64,
    pub block_reward: Amount,
    pub fee_pool_share_percent: u64,
    pub price_feed_lifetime: UnixSeconds,
}

impl Default for ChainParameters {
    fn default() -> Self {
        Self {
            block_interval: 5,
            maintenance_interval: 86_400,
            maximum_block_size: 2 * 1024 * 1024,
            maximum_time_until_expiration: 86_400,
            max_producer_count: 1001,
            irreversible_threshold_percent: 70,
            block_reward: 0,
            fee_pool_share_percent: 0,
            price_feed_lifetime: 86_400,
        }
    }
}

impl ChainParameters {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.block_interval > 0, Error::ZeroBlockInterval);
        ensure!(
            self.maintenance_interval >= self.block_interval,
            Error::MaintenanceIntervalTooShort,
        );
        ensure!(self.max_producer_count > 0, Error::NoProducerSlots);
        ensure!(
            self.irreversible_threshold_percent <= PERCENT_100
                && self.fee_pool_share_percent <= PERCENT_100,
            Error::PercentOutOfRange,
        );

        Ok(())
    }
}

/// Node-local configuration. Every node on a chain must agree on `chain_id`, `checkpoints`
/// and `fee_check_exempt_heights`; the rest only affects resource use and block assembly.
#[derive(Clone, Debug, Derivative, Deserialize, Serialize)]
#[derivative(Default)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub checkpoints: BTreeMap<BlockNumber, BlockId>,

    // A historical band of blocks was produced with fee totals that do not match their contents.
    #[derivative(Default(value = "Some(8_000_001..=8_149_999)"))]
    pub fee_check_exempt_heights: Option<RangeInclusive<BlockNumber>>,

    #[derivative(Default(value = "1440"))]
    pub live_undo_depth: usize,
    #[derivative(Default(value = "10_000"))]
    pub catch_up_undo_depth: usize,
    #[derivative(Default(value = "7200"))]
    pub catch_up_age: UnixSeconds,
    #[derivative(Default(value = "10"))]
    pub catch_up_streak: u32,

    #[derivative(Default(value = "1_000_000"))]
    pub max_block_gas: Gas,
    #[derivative(Default(value = "100"))]
    pub max_contract_operations_per_block: u32,
}

impl ChainConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    #[must_use]
    pub fn last_checkpoint(&self) -> Option<BlockNumber> {
        self.checkpoints.keys().next_back().copied()
    }

    #[must_use]
    pub fn is_fee_check_exempt(&self, block_number: BlockNumber) -> bool {
        self.fee_check_exempt_heights
            .as_ref()
            .is_some_and(|heights| heights.contains(&block_number))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisProducer {
    pub account: Address,
    pub signing_key: PublicKey,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisBalance {
    pub owner: Address,
    pub asset: AssetId,
    pub amount: Amount,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisAllowList {
    pub address: Address,
    pub operations: Vec<OperationKind>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisMultisig {
    pub address: Address,
    pub threshold: u32,
    pub keys: Vec<PublicKey>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisConfig {
    pub timestamp: UnixSeconds,
    #[serde(default)]
    pub parameters: ChainParameters,
    pub committee: Address,
    pub producers: Vec<GenesisProducer>,
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
    #[serde(default)]
    pub blocked_addresses: Vec<Address>,
    #[serde(default)]
    pub operation_allow_lists: Vec<GenesisAllowList>,
    #[serde(default)]
    pub multisig_authorities: Vec<GenesisMultisig>,
    #[serde(default)]
    pub initial_random_seed: H256,
}

impl GenesisConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("block interval must be positive")]
    ZeroBlockInterval,
    #[error("maintenance interval is shorter than block interval")]
    MaintenanceIntervalTooShort,
    #[error("max_producer_count must be positive")]
    NoProducerSlots,
    #[error("percentage parameter exceeds 100")]
    PercentOutOfRange,
}
