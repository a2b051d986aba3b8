use types::{
    operations::{Operation, OperationResult},
    primitives::{Amount, BlockNumber, Gas, TransactionId, UnixSeconds},
};

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AppliedOperation {
    pub transaction_id: TransactionId,
    pub block_number: BlockNumber,
    pub transaction_index: u32,
    pub operation_index: u32,
    pub operation: Operation,
    pub result: OperationResult,
}

/// Counters for the block currently being applied or assembled.
#[derive(Default, Debug)]
pub struct ChainContext {
    pub current_block_num: BlockNumber,
    pub current_trx_in_block: u32,
    pub collected_fees: Amount,
    pub gas_in_block: Gas,
    pub contract_operations_in_block: u32,
    pub applied_operations: Vec<AppliedOperation>,
}

impl ChainContext {
    pub fn start_block(&mut self, block_number: BlockNumber) {
        *self = Self {
            current_block_num: block_number,
            ..Self::default()
        };
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn take_applied_operations(&mut self) -> Vec<AppliedOperation> {
        core::mem::take(&mut self.applied_operations)
    }
}

/// State of a single transaction while its operations are being evaluated.
#[derive(Debug)]
pub struct EvaluationState {
    pub transaction_id: TransactionId,
    pub block_number: BlockNumber,
    pub transaction_index: u32,
    pub operation_index: u32,
    /// Time of the head block.
    pub now: UnixSeconds,
    pub fees: Amount,
    pub gas: Gas,
    pub results: Vec<OperationResult>,
}

impl EvaluationState {
    #[must_use]
    pub const fn new(
        transaction_id: TransactionId,
        block_number: BlockNumber,
        transaction_index: u32,
        now: UnixSeconds,
    ) -> Self {
        Self {
            transaction_id,
            block_number,
            transaction_index,
            operation_index: 0,
            now,
            fees: 0,
            gas: 0,
            results: vec![],
        }
    }
}
