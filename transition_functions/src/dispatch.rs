use anyhow::Result;
use ledger::{Ledger as _, LedgerDatabase};
use types::{
    consts::CORE_ASSET,
    operations::{Operation, OperationResult},
};

use crate::context::EvaluationState;

/// State transition performed by one kind of operation.
///
/// Fees are charged by [`apply_operation`] before the evaluator runs.
pub trait Evaluator {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        evaluation: &mut EvaluationState,
    ) -> Result<OperationResult>;
}

pub fn apply_operation(
    state: &mut LedgerDatabase,
    evaluation: &mut EvaluationState,
    operation: &Operation,
) -> Result<OperationResult> {
    let fee = operation.fee();

    state.decrease_balance(operation.authority(), CORE_ASSET, fee)?;

    evaluation.fees += fee;
    evaluation.gas += operation.gas();

    match operation {
        Operation::Transfer(transfer) => transfer.evaluate(state, evaluation),
        Operation::ProducerCreate(create) => create.evaluate(state, evaluation),
        Operation::ProducerUpdate(update) => update.evaluate(state, evaluation),
        Operation::ChainParametersUpdate(update) => update.evaluate(state, evaluation),
        Operation::ProposalCreate(create) => create.evaluate(state, evaluation),
        Operation::LimitOrderCreate(create) => create.evaluate(state, evaluation),
        Operation::PriceFeedPublish(publish) => publish.evaluate(state, evaluation),
        Operation::ContractRegister(register) => register.evaluate(state, evaluation),
        Operation::ContractInvoke(invoke) => invoke.evaluate(state, evaluation),
        Operation::ContractTransfer(transfer) => transfer.evaluate(state, evaluation),
    }
}

#[cfg(test)]
mod tests {
    use ledger::genesis_objects;
    use types::{
        consts::TEMP_ACCOUNT,
        operations::{ContractRegister, ContractTransfer},
        primitives::H256,
    };

    use super::*;

    fn evaluation() -> EvaluationState {
        EvaluationState::new(H256::repeat_byte(1), 1, 0, factory::GENESIS_TIME)
    }

    #[test]
    fn fee_is_charged_to_authority() -> Result<()> {
        let mut database = LedgerDatabase::new(genesis_objects(&factory::genesis([1], [10]))?, 1);
        let mut session = database.start_session();
        let mut evaluation = evaluation();

        let result = apply_operation(
            &mut session,
            &mut evaluation,
            &factory::transfer(10, factory::address(11), 100, 7),
        )?;

        assert_eq!(result, OperationResult::Void);
        assert_eq!(evaluation.fees, 7);
        assert_eq!(
            session.balance(factory::address(10), CORE_ASSET)?,
            factory::INITIAL_BALANCE - 107,
        );
        assert_eq!(session.balance(factory::address(11), CORE_ASSET)?, 100);

        Ok(())
    }

    #[test]
    fn unpayable_fee_fails_before_evaluation() -> Result<()> {
        let mut database = LedgerDatabase::new(genesis_objects(&factory::genesis([1], []))?, 1);
        let mut session = database.start_session();
        let mut evaluation = evaluation();

        apply_operation(
            &mut session,
            &mut evaluation,
            &factory::transfer(10, factory::address(11), 0, 1),
        )
        .expect_err("account 10 has no funds");

        assert_eq!(evaluation.fees, 0);

        Ok(())
    }

    #[test]
    fn contract_operations_accumulate_gas() -> Result<()> {
        let owner = factory::address(10);
        let mut database = LedgerDatabase::new(genesis_objects(&factory::genesis([1], [10]))?, 1);
        let mut session = database.start_session();
        let mut evaluation = evaluation();

        let register = ContractRegister {
            fee: 1,
            owner,
            code: vec![1, 2, 3],
            gas: 40,
        };

        let OperationResult::Contract(contract) =
            apply_operation(&mut session, &mut evaluation, &register.into())?
        else {
            panic!("registration should return the contract address");
        };

        let transfer = ContractTransfer {
            fee: 1,
            caller: owner,
            contract,
            asset: CORE_ASSET,
            amount: 25,
            gas: 60,
        };

        apply_operation(&mut session, &mut evaluation, &transfer.into())?;

        assert_eq!(evaluation.gas, 100);
        assert_eq!(session.balance(contract, CORE_ASSET)?, 25);
        assert_eq!(session.balance(TEMP_ACCOUNT, CORE_ASSET)?, 0);

        Ok(())
    }
}
