use anyhow::{ensure, Result};
use ledger::{GlobalProperties, Ledger as _, LedgerDatabase, Object, ObjectKey, Producer};
use types::operations::{OperationResult, ProducerCreate, ProducerUpdate};

use crate::{context::EvaluationState, dispatch::Evaluator, error::Error};

impl Evaluator for ProducerCreate {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        _evaluation: &mut EvaluationState,
    ) -> Result<OperationResult> {
        let account_taken = state
            .range(ObjectKey::producers())
            .any(|(_, object)| matches!(object, Object::Producer(producer) if producer.account == self.account));

        ensure!(
            !account_taken,
            Error::ProducerAccountTaken {
                account: self.account,
            },
        );

        let producer_id = state.update(
            ObjectKey::GlobalProperties,
            |global: &mut GlobalProperties| {
                let producer_id = global.next_producer_id;
                global.next_producer_id += 1;
                producer_id
            },
        )?;

        state.insert(
            ObjectKey::Producer(producer_id),
            Producer::new(producer_id, self.account, self.signing_key).into(),
        )?;

        Ok(OperationResult::Producer(producer_id))
    }
}

impl Evaluator for ProducerUpdate {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        evaluation: &mut EvaluationState,
    ) -> Result<OperationResult> {
        let producer_id = self.producer;

        ensure!(
            state.producer(producer_id)?.account == self.account,
            Error::ProducerAccountMismatch {
                producer_id,
                account: self.account,
            },
        );

        state.update(ObjectKey::Producer(producer_id), |producer: &mut Producer| {
            producer.signing_key = self.new_signing_key;
            producer.last_change_signing_key_block_num = evaluation.block_number;
        })?;

        Ok(OperationResult::Void)
    }
}
