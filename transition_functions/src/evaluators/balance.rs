use anyhow::Result;
use ledger::{Ledger as _, LedgerDatabase};
use types::operations::{OperationResult, Transfer};

use crate::{context::EvaluationState, dispatch::Evaluator};

impl Evaluator for Transfer {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        _evaluation: &mut EvaluationState,
    ) -> Result<OperationResult> {
        state.transfer(self.from, self.to, self.asset, self.amount)?;
        Ok(OperationResult::Void)
    }
}
