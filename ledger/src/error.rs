use thiserror::Error;
use types::primitives::{Address, Amount, AssetId};

use crate::objects::ObjectKey;

#[derive(Debug, Error)]
pub enum Error {
    #[error("object not found: {key:?}")]
    ObjectNotFound { key: ObjectKey },
    #[error("object {key:?} has an unexpected type")]
    UnexpectedObject { key: ObjectKey },
    #[error(
        "insufficient balance of asset {asset} at {owner:?} \
         (balance: {balance}, required: {amount})"
    )]
    InsufficientBalance {
        owner: Address,
        asset: AssetId,
        balance: Amount,
        amount: Amount,
    },
    #[error("balance of asset {asset} at {owner:?} would overflow")]
    BalanceOverflow { owner: Address, asset: AssetId },
    #[error("genesis configuration has no producers")]
    NoGenesisProducers,
    #[error("genesis configuration funds the temporary account")]
    TemporaryAccountFunded,
    #[error("genesis configuration defines {key:?} more than once")]
    DuplicateGenesisObject { key: ObjectKey },
    #[error("multisignature authority {address:?} has an unreachable threshold")]
    InvalidMultisigThreshold { address: Address },
}
