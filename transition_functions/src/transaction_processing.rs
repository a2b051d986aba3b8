use anyhow::{ensure, Result};
use ledger::{Ledger as _, LedgerDatabase, ObjectKey, TransactionRecord};
use types::{
    config::ChainConfig,
    operations::OperationResult,
    primitives::tapos_prefix,
    skip::{Skip, SkipFlags},
    transaction::{ProcessedTransaction, SignedTransaction},
};

use crate::{
    authority::verify_authority,
    context::{AppliedOperation, ChainContext, EvaluationState},
    dispatch::apply_operation,
    error::Error,
};

/// Validates and executes `transaction` on top of `state`.
///
/// No session is opened here. On failure `state` may be partially modified and the caller is
/// expected to discard the session it applied the transaction in. `context` is only updated on
/// success.
///
/// # Panics
///
/// Panics if the temporary account holds a balance after the transaction.
pub fn apply_transaction(
    config: &ChainConfig,
    context: &mut ChainContext,
    state: &mut LedgerDatabase,
    transaction: &SignedTransaction,
    skip: SkipFlags,
) -> Result<ProcessedTransaction> {
    transaction.validate()?;

    let transaction_id = transaction.id();

    if !skip.contains(Skip::TransactionDupeCheck) {
        ensure!(
            !state.is_known_transaction(transaction_id),
            Error::DuplicateTransaction { transaction_id },
        );
    }

    if !skip.contains(Skip::TransactionSignatures) && !skip.contains(Skip::AuthorityCheck) {
        verify_authority(state, transaction, config.chain_id)?;
    }

    let dynamic = state.dynamic_properties()?;
    let head_block_number = dynamic.head_block_number;
    let now = dynamic.time;

    if head_block_number > 0 {
        if !skip.contains(Skip::TaposCheck) {
            let ref_block_num = transaction.ref_block_num;

            let reference = state
                .block_summary(ref_block_num)?
                .ok_or(Error::UnknownReferenceBlock { ref_block_num })?;

            let in_summary = tapos_prefix(reference);
            let in_transaction = transaction.ref_block_prefix;

            ensure!(
                in_summary == in_transaction,
                Error::TaposPrefixMismatch {
                    in_summary,
                    in_transaction,
                },
            );
        }

        let expiration = transaction.expiration;
        let maximum = now
            + state
                .global_properties()?
                .parameters
                .maximum_time_until_expiration;

        ensure!(
            expiration > now,
            Error::TransactionExpired { expiration, now },
        );
        ensure!(
            expiration <= maximum,
            Error::ExpirationTooFar {
                expiration,
                maximum,
            },
        );
    }

    if !skip.contains(Skip::TransactionDupeCheck) {
        let record = TransactionRecord {
            expiration: transaction.expiration,
            transaction: transaction.clone(),
        };

        state.insert(ObjectKey::Transaction(transaction_id), record.into())?;
    }

    let mut evaluation = EvaluationState::new(
        transaction_id,
        context.current_block_num,
        context.current_trx_in_block,
        now,
    );

    let mut applied_operations = vec![];

    for operation in &transaction.operations {
        let result = if operation.is_contract() && skip.contains(Skip::ContractExecution) {
            OperationResult::Void
        } else {
            apply_operation(state, &mut evaluation, operation)?
        };

        applied_operations.push(AppliedOperation {
            transaction_id,
            block_number: evaluation.block_number,
            transaction_index: evaluation.transaction_index,
            operation_index: evaluation.operation_index,
            operation: operation.clone(),
            result,
        });

        evaluation.results.push(result);
        evaluation.operation_index += 1;
    }

    assert!(
        state.temp_account_is_empty(),
        "temporary account holds a balance after transaction {transaction_id:?}",
    );

    context.collected_fees += evaluation.fees;
    context.gas_in_block += evaluation.gas;
    context.contract_operations_in_block += transaction.contract_operation_count();
    context.current_trx_in_block += 1;
    context.applied_operations.append(&mut applied_operations);

    Ok(ProcessedTransaction {
        signed: transaction.clone(),
        operation_results: evaluation.results,
    })
}

#[cfg(test)]
mod tests {
    use ledger::{genesis_objects, DynamicGlobalProperties};
    use test_case::test_case;
    use types::{
        consts::{CORE_ASSET, TEMP_ACCOUNT},
        operations::{ContractInvoke, Operation},
        primitives::{id_with_number, Address, BlockId, UnixSeconds, H256},
    };

    use super::*;

    const RECIPIENT: Address = Address::repeat_byte(0xaa);

    fn database() -> Result<LedgerDatabase> {
        Ok(LedgerDatabase::new(
            genesis_objects(&factory::genesis([1], [10]))?,
            1,
        ))
    }

    // Pretends block 1 has been applied so that liveness checks run.
    fn advance_head(state: &mut LedgerDatabase) -> Result<BlockId> {
        let block_id = id_with_number(H256::repeat_byte(0x5a), 1);

        state.update(
            ObjectKey::DynamicGlobalProperties,
            |dynamic: &mut DynamicGlobalProperties| {
                dynamic.head_block_number = 1;
                dynamic.head_block_id = block_id;
                dynamic.time = factory::GENESIS_TIME + 5;
            },
        )?;

        state.upsert(
            ObjectKey::BlockSummary(1),
            ledger::BlockSummary { block_id }.into(),
        )?;

        Ok(block_id)
    }

    #[test]
    fn transfer_is_applied_and_recorded() -> Result<()> {
        let config = factory::chain_config();
        let mut context = ChainContext::default();
        let mut database = database()?;
        let mut session = database.start_session();

        let transaction = factory::signed_transfer(10, RECIPIENT, 40, BlockId::zero(), 1);

        let processed = apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            SkipFlags::empty(),
        )?;

        assert_eq!(processed.operation_results, [OperationResult::Void]);
        assert_eq!(context.collected_fees, 1);
        assert_eq!(context.current_trx_in_block, 1);
        assert_eq!(context.applied_operations.len(), 1);
        assert_eq!(session.balance(RECIPIENT, CORE_ASSET)?, 40);
        assert!(session.is_known_transaction(transaction.id()));

        let error = apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            SkipFlags::empty(),
        )
        .expect_err("transaction was already applied");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::DuplicateTransaction { .. }),
        ));

        Ok(())
    }

    #[test]
    #[should_panic(expected = "temporary account holds a balance")]
    fn leftover_temporary_balance_is_fatal() {
        let config = factory::chain_config();
        let mut context = ChainContext::default();
        let mut database = database().expect("genesis configuration is valid");
        let mut session = database.start_session();

        session
            .increase_balance(TEMP_ACCOUNT, CORE_ASSET, 1)
            .expect("session is open");

        let transaction = factory::signed_transfer(10, RECIPIENT, 40, BlockId::zero(), 1);

        apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            SkipFlags::empty(),
        )
        .expect("transfer is valid");
    }

    #[test]
    fn failed_transaction_leaves_context_untouched() -> Result<()> {
        let config = factory::chain_config();
        let mut context = ChainContext::default();
        let mut database = database()?;
        let mut session = database.start_session();

        let transaction = factory::signed_transfer(
            10,
            RECIPIENT,
            factory::INITIAL_BALANCE,
            BlockId::zero(),
            1,
        );

        apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            SkipFlags::empty(),
        )
        .expect_err("fee leaves too little for the transfer");

        assert_eq!(context.collected_fees, 0);
        assert_eq!(context.current_trx_in_block, 0);
        assert!(context.applied_operations.is_empty());

        Ok(())
    }

    #[test]
    fn unsigned_transaction_passes_only_when_checks_are_skipped() -> Result<()> {
        let config = factory::chain_config();
        let mut context = ChainContext::default();
        let mut database = database()?;
        let mut session = database.start_session();

        let transaction = factory::sign_transaction(
            factory::transaction(
                vec![factory::transfer(10, RECIPIENT, 5, 1)],
                BlockId::zero(),
                1,
            ),
            &[],
        );

        apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            SkipFlags::empty(),
        )
        .expect_err("transaction has no signatures");

        apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            Skip::TransactionSignatures.into(),
        )?;

        Ok(())
    }

    #[test_case(0 => true; "expires now")]
    #[test_case(1 => false; "expires next second")]
    #[test_case(86_400 => false; "expires at maximum")]
    #[test_case(86_401 => true; "expires after maximum")]
    fn expiration_window_is_rejected(offset: UnixSeconds) -> bool {
        let config = factory::chain_config();
        let mut context = ChainContext::default();
        let mut database = database().expect("genesis configuration is valid");
        let mut session = database.start_session();

        let reference = advance_head(&mut session).expect("session is open");
        let now = factory::GENESIS_TIME + 5;
        let transaction = factory::signed_transfer(10, RECIPIENT, 5, reference, now + offset);

        apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            SkipFlags::empty(),
        )
        .is_err()
    }

    #[test]
    fn reference_block_prefix_must_match() -> Result<()> {
        let config = factory::chain_config();
        let mut context = ChainContext::default();
        let mut database = database()?;
        let mut session = database.start_session();

        advance_head(&mut session)?;

        let other_block = id_with_number(H256::repeat_byte(0x11), 1);
        let expiration = factory::GENESIS_TIME + 60;
        let transaction = factory::signed_transfer(10, RECIPIENT, 5, other_block, expiration);

        let error = apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            SkipFlags::empty(),
        )
        .expect_err("reference block is on another chain");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::TaposPrefixMismatch { .. }),
        ));

        apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            Skip::TaposCheck.into(),
        )?;

        Ok(())
    }

    #[test]
    fn skipped_contract_execution_yields_void() -> Result<()> {
        let config = factory::chain_config();
        let mut context = ChainContext::default();
        let mut database = database()?;
        let mut session = database.start_session();

        let invoke = Operation::from(ContractInvoke {
            fee: 3,
            caller: factory::address(10),
            contract: Address::repeat_byte(0xee),
            input: vec![],
            gas: 50,
        });

        let transaction = factory::sign_transaction(
            factory::transaction(vec![invoke], BlockId::zero(), 1),
            &[10],
        );

        let processed = apply_transaction(
            &config,
            &mut context,
            &mut session,
            &transaction,
            Skip::ContractExecution.into(),
        )?;

        assert_eq!(processed.operation_results, [OperationResult::Void]);
        assert_eq!(context.collected_fees, 0);
        assert_eq!(context.gas_in_block, 0);
        assert_eq!(context.contract_operations_in_block, 1);

        Ok(())
    }
}
