use futures::channel::mpsc::UnboundedSender;
use log::debug;
use types::{
    primitives::{BlockId, BlockNumber},
    transaction::SignedTransaction,
};

use crate::context::AppliedOperation;

#[derive(Debug)]
pub enum ChainEvent {
    BlockApplied {
        block_id: BlockId,
        block_number: BlockNumber,
        operations: Vec<AppliedOperation>,
    },
    TransactionsRemoved {
        transactions: Vec<SignedTransaction>,
    },
    PendingTransaction {
        transaction: SignedTransaction,
    },
}

/// Receiver of notifications about state changes. Notifications are never acknowledged.
pub trait EventSink {
    fn block_applied(
        &self,
        block_id: BlockId,
        block_number: BlockNumber,
        operations: Vec<AppliedOperation>,
    );

    /// Called with the transactions of a block that was popped.
    fn transactions_removed(&self, transactions: Vec<SignedTransaction>);

    fn pending_transaction(&self, transaction: &SignedTransaction);
}

impl EventSink for () {
    fn block_applied(&self, _: BlockId, _: BlockNumber, _: Vec<AppliedOperation>) {}

    fn transactions_removed(&self, _: Vec<SignedTransaction>) {}

    fn pending_transaction(&self, _: &SignedTransaction) {}
}

impl EventSink for UnboundedSender<ChainEvent> {
    fn block_applied(
        &self,
        block_id: BlockId,
        block_number: BlockNumber,
        operations: Vec<AppliedOperation>,
    ) {
        send(
            self,
            ChainEvent::BlockApplied {
                block_id,
                block_number,
                operations,
            },
        );
    }

    fn transactions_removed(&self, transactions: Vec<SignedTransaction>) {
        send(self, ChainEvent::TransactionsRemoved { transactions });
    }

    fn pending_transaction(&self, transaction: &SignedTransaction) {
        send(
            self,
            ChainEvent::PendingTransaction {
                transaction: transaction.clone(),
            },
        );
    }
}

fn send(sender: &UnboundedSender<ChainEvent>, event: ChainEvent) {
    if sender.unbounded_send(event).is_err() {
        debug!("send to chain event listener failed because the receiver was dropped");
    }
}
