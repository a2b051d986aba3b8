use ledger::LedgerDatabase;
use types::transaction::{ProcessedTransaction, SignedTransaction};
use undo_db::DetachedSession;

/// Transactions applied on top of the head block but not yet included in a block.
///
/// Their effects live in a single detached session. Transactions from popped blocks wait in a
/// separate queue until they can be pushed again.
#[derive(Default, Debug)]
pub struct PendingPool {
    transactions: Vec<ProcessedTransaction>,
    session: Option<DetachedSession>,
    popped: Vec<SignedTransaction>,
}

impl PendingPool {
    #[must_use]
    pub fn transactions(&self) -> &[ProcessedTransaction] {
        &self.transactions
    }

    #[must_use]
    pub fn popped(&self) -> &[SignedTransaction] {
        &self.popped
    }

    pub fn push(&mut self, transaction: ProcessedTransaction) {
        self.transactions.push(transaction);
    }

    pub fn take_session(&mut self) -> Option<DetachedSession> {
        self.session.take()
    }

    /// # Panics
    ///
    /// Panics if the pool already holds a session.
    pub fn set_session(&mut self, session: DetachedSession) {
        assert!(
            self.session.is_none(),
            "pending pool can only hold one session",
        );

        self.session = Some(session);
    }

    /// Reverts the effects of every pending transaction.
    /// The transactions themselves stay in the pool.
    pub fn discard_session(&mut self, state: &mut LedgerDatabase) {
        if let Some(session) = self.session.take() {
            state.resume(session).undo();
        }
    }

    /// Reverts and empties the pool. Returns the transactions that were pending.
    pub fn take(&mut self, state: &mut LedgerDatabase) -> Vec<ProcessedTransaction> {
        self.discard_session(state);
        core::mem::take(&mut self.transactions)
    }

    /// Queues transactions of a popped block ahead of those popped earlier,
    /// so that replaying the queue follows chain order.
    pub fn queue_popped(&mut self, transactions: Vec<SignedTransaction>) {
        self.popped.splice(0..0, transactions);
    }

    pub fn take_popped(&mut self) -> Vec<SignedTransaction> {
        core::mem::take(&mut self.popped)
    }
}
