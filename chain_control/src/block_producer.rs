use anyhow::Result;
use ledger::{Ledger as _, LedgerDatabase};
use log::warn;
use transition_functions::{apply_transaction, ChainContext};
use types::{
    block::SignedBlock,
    config::ChainConfig,
    encoding,
    skip::SkipFlags,
    transaction::ProcessedTransaction,
};

#[derive(Default, Debug)]
struct Postponed {
    size: usize,
    gas: usize,
    contract_operations: usize,
}

/// Applies pending transactions in order until the block budgets run out.
///
/// Transactions that do not fit are left for a later block. Transactions that fail are logged
/// and dropped from the block. Fees and gas of included transactions accumulate in `context`.
pub fn assemble_transactions(
    config: &ChainConfig,
    context: &mut ChainContext,
    state: &mut LedgerDatabase,
    pending: &[ProcessedTransaction],
    skip: SkipFlags,
) -> Result<Vec<ProcessedTransaction>> {
    let maximum_block_size = state.global_properties()?.parameters.maximum_block_size;
    let mut block_size = SignedBlock::signed_header_size();
    let mut contract_operations_left = config.max_contract_operations_per_block;
    let mut postponed = Postponed::default();
    let mut included = vec![];

    for transaction in pending {
        if block_size + encoding::packed_size(transaction) >= maximum_block_size {
            postponed.size += 1;
            continue;
        }

        let contract_operations = transaction.contract_operation_count();

        if contract_operations > 0 {
            if context.gas_in_block + transaction.gas() > config.max_block_gas {
                postponed.gas += 1;
                continue;
            }

            if contract_operations_left < contract_operations {
                postponed.contract_operations += 1;
                continue;
            }
        }

        let mut session = state.start_session();

        match apply_transaction(config, context, &mut session, &transaction.signed, skip) {
            Ok(processed) => {
                session.merge();

                // Results may change the size of the transaction.
                block_size += encoding::packed_size(&processed);
                contract_operations_left -= contract_operations;
                included.push(processed);
            }
            Err(error) => {
                warn!(
                    "transaction {:?} was not included in block: {error:?}",
                    transaction.id(),
                );
            }
        }
    }

    if postponed.size > 0 {
        warn!("postponed {} transactions due to block size limit", postponed.size);
    }

    if postponed.gas > 0 {
        warn!("postponed {} transactions due to block gas limit", postponed.gas);
    }

    if postponed.contract_operations > 0 {
        warn!(
            "postponed {} transactions due to contract operation limit",
            postponed.contract_operations,
        );
    }

    Ok(included)
}
