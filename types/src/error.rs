use thiserror::Error;

use crate::{operations::OperationKind, primitives::Address};

#[derive(Debug, Error)]
pub enum Error {
    #[error("transaction has no operations")]
    EmptyTransaction,
    #[error("{kind:?} operation has zero amount")]
    ZeroAmount { kind: OperationKind },
    #[error("transfer from {address:?} to itself")]
    SelfTransfer { address: Address },
    #[error("{kind:?} operation references the temporary account")]
    TemporaryAccountReferenced { kind: OperationKind },
    #[error("limit order sells and receives the same asset")]
    SameAssetOrder,
    #[error("price feed has a zero component")]
    InvalidPrice,
    #[error("proposal contains no operations")]
    EmptyProposal,
    #[error("{kind:?} operation declares no gas")]
    ZeroGas { kind: OperationKind },
}
