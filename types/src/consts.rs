use crate::primitives::{Address, AssetId, BlockId, H160, H256};

pub const CORE_ASSET: AssetId = 0;
pub const GENESIS_BLOCK_ID: BlockId = H256([0; 32]);

/// Number of entries in the rolling block summary window used by TaPoS references.
pub const BLOCK_SUMMARY_WINDOW: u32 = 0x0001_0000;

/// Staging account for value in flight between contract calls.
/// Its balances must be empty once a transaction has been applied.
pub const TEMP_ACCOUNT: Address = H160([0; 20]);

pub const PERCENT_100: u64 = 100;
