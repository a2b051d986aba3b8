use anyhow::{ensure, Result};
use ledger::{
    DynamicGlobalProperties, Ledger as _, LedgerDatabase, LimitOrder, ObjectKey, PriceFeed,
};
use types::operations::{LimitOrderCreate, OperationResult, PriceFeedPublish};

use crate::{context::EvaluationState, dispatch::Evaluator, error::Error};

impl Evaluator for LimitOrderCreate {
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

        state.decrease_balance(self.seller, self.sell_asset, self.amount_to_sell)?;

        let order_id = state.update(
            ObjectKey::DynamicGlobalProperties,
            |dynamic: &mut DynamicGlobalProperties| {
                let order_id = dynamic.next_order_id;
                dynamic.next_order_id += 1;
                order_id
            },
        )?;

        let order = LimitOrder {
            id: order_id,
            seller: self.seller,
            sell_asset: self.sell_asset,
            for_sale: self.amount_to_sell,
            receive_asset: self.receive_asset,
            min_to_receive: self.min_to_receive,
            expiration: self.expiration,
        };

        state.insert(ObjectKey::LimitOrder(order_id), order.into())?;

        Ok(OperationResult::LimitOrder(order_id))
    }
}

impl Evaluator for PriceFeedPublish {
    fn evaluate(
        &self,
        state: &mut LedgerDatabase,
        evaluation: &mut EvaluationState,
    ) -> Result<OperationResult> {
        let producer_id = self.producer;

        ensure!(
            state.producer(producer_id)?.account == self.publisher,
            Error::ProducerAccountMismatch {
                producer_id,
                account: self.publisher,
            },
        );

        let feed = PriceFeed {
            price: self.price,
            published: evaluation.now,
        };

        state.upsert(ObjectKey::PriceFeed(self.asset, producer_id), feed.into())?;

        Ok(OperationResult::Void)
    }
}

#[cfg(test)]
mod tests {
    use ledger::genesis_objects;
    use types::{consts::CORE_ASSET, primitives::H256};

    use super::*;

    #[test]
    fn order_escrows_sell_amount() -> Result<()> {
        let seller = factory::address(10);
        let mut database = LedgerDatabase::new(genesis_objects(&factory::genesis([1], [10]))?, 1);
        let mut session = database.start_session();
        let now = factory::GENESIS_TIME;
        let mut evaluation = EvaluationState::new(H256::zero(), 1, 0, now);

        let order = LimitOrderCreate {
            fee: 0,
            seller,
            sell_asset: CORE_ASSET,
            amount_to_sell: 500,
            receive_asset: 1,
            min_to_receive: 5,
            expiration: now + 60,
        };

        assert_eq!(
            order.evaluate(&mut session, &mut evaluation)?,
            OperationResult::LimitOrder(0),
        );
        assert_eq!(
            session.balance(seller, CORE_ASSET)?,
            factory::INITIAL_BALANCE - 500,
        );
        assert!(session.contains_key(&ObjectKey::LimitOrder(0)));

        Ok(())
    }

    #[test]
    fn order_expiring_now_is_rejected() -> Result<()> {
        let mut database = LedgerDatabase::new(genesis_objects(&factory::genesis([1], [10]))?, 1);
        let mut session = database.start_session();
        let now = factory::GENESIS_TIME;
        let mut evaluation = EvaluationState::new(H256::zero(), 1, 0, now);

        let order = LimitOrderCreate {
            fee: 0,
            seller: factory::address(10),
            sell_asset: CORE_ASSET,
            amount_to_sell: 500,
            receive_asset: 1,
            min_to_receive: 5,
            expiration: now,
        };

        let error = order
            .evaluate(&mut session, &mut evaluation)
            .expect_err("order would expire immediately");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::ExpirationNotInFuture { .. }),
        ));

        Ok(())
    }
}
