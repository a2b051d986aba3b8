use anyhow::{ensure, Result};
use ledger::{DynamicGlobalProperties, GlobalProperties, Ledger as _, LedgerDatabase, ObjectKey, Proposal};
use types::operations::{ChainParametersUpdate, OperationResult, ProposalCreate};

use crate::{context::EvaluationState, dispatch::Evaluator, error::Error};

impl Evaluator for ChainParametersUpdate {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        _evaluation: &mut EvaluationState,
    ) -> Result<OperationResult> {
        ensure!(
            state.global_properties()?.committee == self.committee,
            Error::NotCommittee {
                address: self.committee,
            },
        );

        state.update(
            ObjectKey::GlobalProperties,
            |global: &mut GlobalProperties| {
                global.pending_parameters = Some(self.parameters.clone());
            },
        )?;

        Ok(OperationResult::Void)
    }
}

impl Evaluator for ProposalCreate {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        evaluation: &mut EvaluationState,
    ) -> Result<OperationResult> {
        ensure!(
            self.expiration > evaluation.now,
            Error::ExpirationNotInFuture {
                expiration: self.expiration,
                now: evaluation.now,
            },
        );

        let proposal_id = state.update(
            ObjectKey::DynamicGlobalProperties,
            |dynamic: &mut DynamicGlobalProperties| {
                let proposal_id = dynamic.next_proposal_id;
                dynamic.next_proposal_id += 1;
                proposal_id
            },
        )?;

        let proposal = Proposal {
            id: proposal_id,
            proposer: self.proposer,
            expiration: self.expiration,
            operations: self.operations.clone(),
        };

        state.insert(ObjectKey::Proposal(proposal_id), proposal.into())?;

        Ok(OperationResult::Proposal(proposal_id))
    }
}
