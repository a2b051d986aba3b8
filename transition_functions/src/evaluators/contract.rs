use anyhow::{ensure, Result};
use hashing::{hash_256_64, hash_bytes};
use ledger::{Contract, Ledger as _, LedgerDatabase, ObjectKey};
use types::{
    consts::TEMP_ACCOUNT,
    operations::{ContractInvoke, ContractRegister, ContractTransfer, OperationResult},
    primitives::Address,
};

use crate::{context::EvaluationState, dispatch::Evaluator, error::Error};

impl Evaluator for ContractRegister {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        evaluation: &mut EvaluationState,
    ) -> Result<OperationResult> {
        let address = contract_address(evaluation);

        ensure!(
            !state.contains_key(&ObjectKey::Contract(address)),
            Error::ContractExists { address },
        );

        let contract = Contract {
            owner: self.owner,
            code_hash: hash_bytes(&self.code),
            invocations: 0,
        };

        state.insert(ObjectKey::Contract(address), contract.into())?;

        Ok(OperationResult::Contract(address))
    }
}

impl Evaluator for ContractInvoke {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        _evaluation: &mut EvaluationState,
    ) -> Result<OperationResult> {
        record_invocation(state, self.contract)?;
        Ok(OperationResult::Void)
    }
}

impl Evaluator for ContractTransfer {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        _evaluation: &mut EvaluationState,
    ) -> Result<OperationResult> {
        record_invocation(state, self.contract)?;

        // Funds pass through the temporary account the way contract calls settle transfers.
        state.transfer(self.caller, TEMP_ACCOUNT, self.asset, self.amount)?;
        state.transfer(TEMP_ACCOUNT, self.contract, self.asset, self.amount)?;

        Ok(OperationResult::Void)
    }
}

// Addresses are derived from the registering operation so that replays produce the same address.
fn contract_address(evaluation: &EvaluationState) -> Address {
    let hash = hash_256_64(evaluation.transaction_id, evaluation.operation_index.into());
    Address::from_slice(&hash[..Address::len_bytes()])
}

fn record_invocation(state: &mut LedgerDatabase, address: Address) -> Result<()> {
    ensure!(
        state.contains_key(&ObjectKey::Contract(address)),
        Error::UnknownContract { address },
    );

    state.update(ObjectKey::Contract(address), |contract: &mut Contract| {
        contract.invocations += 1;
    })
}
