//! Object model of the chain state and typed access to it.
//!
//! Every object lives in a single [`LedgerDatabase`] keyed by [`ObjectKey`].
//! Mutations go through the undo layer, so they must happen inside a session.

use anyhow::{ensure, Result};
use enumset::EnumSet;
use types::{
    consts::TEMP_ACCOUNT,
    operations::OperationKind,
    primitives::{
        Address, Amount, AssetId, BlockId, BlockNumber, ProducerId, TransactionId, UnixSeconds,
    },
};
use undo_db::UndoDatabase;

pub use crate::{error::Error, genesis::genesis_objects, objects::*};

mod error;
mod genesis;
mod objects;

pub type LedgerDatabase = UndoDatabase<ObjectKey, Object>;

pub trait Ledger {
    fn record<R: Record>(&self, key: ObjectKey) -> Result<Option<&R>>;

    fn require<R: Record>(&self, key: ObjectKey) -> Result<&R>;

    fn update<R: Record, T>(&mut self, key: ObjectKey, update: impl FnOnce(&mut R) -> T)
        -> Result<T>;

    fn global_properties(&self) -> Result<&GlobalProperties> {
        self.require(ObjectKey::GlobalProperties)
    }

    fn dynamic_properties(&self) -> Result<&DynamicGlobalProperties> {
        self.require(ObjectKey::DynamicGlobalProperties)
    }

    fn head_block_number(&self) -> Result<BlockNumber> {
        Ok(self.dynamic_properties()?.head_block_number)
    }

    fn head_block_id(&self) -> Result<BlockId> {
        Ok(self.dynamic_properties()?.head_block_id)
    }

    fn head_block_time(&self) -> Result<UnixSeconds> {
        Ok(self.dynamic_properties()?.time)
    }

    fn producer(&self, producer_id: ProducerId) -> Result<&Producer> {
        self.require(ObjectKey::Producer(producer_id))
    }

    fn balance(&self, owner: Address, asset: AssetId) -> Result<Amount> {
        let balance = self.record::<Balance>(ObjectKey::Balance(owner, asset))?;
        Ok(balance.map(|balance| balance.amount).unwrap_or_default())
    }

    fn increase_balance(&mut self, owner: Address, asset: AssetId, amount: Amount) -> Result<()>;

    /// Balances that reach zero are removed.
    fn decrease_balance(&mut self, owner: Address, asset: AssetId, amount: Amount) -> Result<()>;

    fn transfer(&mut self, from: Address, to: Address, asset: AssetId, amount: Amount) -> Result<()> {
        self.decrease_balance(from, asset, amount)?;
        self.increase_balance(to, asset, amount)
    }

    fn temp_account_is_empty(&self) -> bool;

    fn is_known_transaction(&self, transaction_id: TransactionId) -> bool;

    fn block_summary(&self, index: u16) -> Result<Option<BlockId>> {
        let summary = self.record::<BlockSummary>(ObjectKey::BlockSummary(index))?;
        Ok(summary.map(|summary| summary.block_id))
    }

    fn is_blocked(&self, address: Address) -> bool;

    fn allowed_operations(&self, address: Address) -> Result<EnumSet<OperationKind>> {
        let allow_list = self.record::<OperationAllowList>(ObjectKey::OperationAllowList(address))?;
        Ok(allow_list.map(|allow_list| allow_list.operations).unwrap_or_default())
    }

    fn multisig(&self, address: Address) -> Result<Option<&MultisigAuthority>> {
        self.record(ObjectKey::Multisig(address))
    }
}

impl Ledger for LedgerDatabase {
    fn record<R: Record>(&self, key: ObjectKey) -> Result<Option<&R>> {
        self.get(&key)
            .map(|object| R::from_object(object).ok_or(Error::UnexpectedObject { key }))
            .transpose()
            .map_err(Into::into)
    }

    fn require<R: Record>(&self, key: ObjectKey) -> Result<&R> {
        self.record(key)?
            .ok_or_else(|| Error::ObjectNotFound { key }.into())
    }

    fn update<R: Record, T>(
        &mut self,
        key: ObjectKey,
        update: impl FnOnce(&mut R) -> T,
    ) -> Result<T> {
        ensure!(self.contains_key(&key), Error::ObjectNotFound { key });

        self.modify(&key, |object| R::from_object_mut(object).map(update))?
            .ok_or_else(|| Error::UnexpectedObject { key }.into())
    }

    fn increase_balance(&mut self, owner: Address, asset: AssetId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }

        let key = ObjectKey::Balance(owner, asset);

        match self.record::<Balance>(key)?.map(|balance| balance.amount) {
            Some(current) => {
                let new_amount = current
                    .checked_add(amount)
                    .ok_or(Error::BalanceOverflow { owner, asset })?;

                self.update(key, |balance: &mut Balance| balance.amount = new_amount)
            }
            None => self.insert(key, Balance { amount }.into()),
        }
    }

    fn decrease_balance(&mut self, owner: Address, asset: AssetId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }

        let balance = self.balance(owner, asset)?;

        ensure!(
            balance >= amount,
            Error::InsufficientBalance {
                owner,
                asset,
                balance,
                amount,
            },
        );

        let key = ObjectKey::Balance(owner, asset);

        if balance == amount {
            self.remove(&key)?;
            Ok(())
        } else {
            self.update(key, |balance: &mut Balance| balance.amount -= amount)
        }
    }

    fn temp_account_is_empty(&self) -> bool {
        self.range(ObjectKey::balances_of(TEMP_ACCOUNT))
            .all(|(_, object)| matches!(object, Object::Balance(Balance { amount: 0 })))
    }

    fn is_known_transaction(&self, transaction_id: TransactionId) -> bool {
        self.contains_key(&ObjectKey::Transaction(transaction_id))
    }

    fn is_blocked(&self, address: Address) -> bool {
        self.contains_key(&ObjectKey::BlockedAddress(address))
    }
}

#[cfg(test)]
mod tests {
    use im::OrdMap;
    use test_case::test_case;

    use super::*;

    fn database() -> LedgerDatabase {
        LedgerDatabase::new(OrdMap::new(), 1)
    }

    #[test]
    fn missing_balance_reads_as_zero() -> Result<()> {
        assert_eq!(database().balance(Address::repeat_byte(1), 0)?, 0);
        Ok(())
    }

    #[test_case(10, 4 => Some(6); "partial")]
    #[test_case(10, 10 => None; "exhausted balance is removed")]
    fn decrease_balance_leaves(initial: Amount, amount: Amount) -> Option<Amount> {
        let owner = Address::repeat_byte(1);
        let mut database = database();
        let mut session = database.start_session();

        session
            .increase_balance(owner, 3, initial)
            .expect("session is open");
        session
            .decrease_balance(owner, 3, amount)
            .expect("balance is sufficient");

        let remaining = session
            .record::<Balance>(ObjectKey::Balance(owner, 3))
            .expect("key holds a balance")
            .map(|balance| balance.amount);

        remaining
    }

    #[test]
    fn overdraft_is_rejected() {
        let owner = Address::repeat_byte(1);
        let mut database = database();
        let mut session = database.start_session();

        session
            .increase_balance(owner, 0, 5)
            .expect("session is open");

        let error = session
            .decrease_balance(owner, 0, 6)
            .expect_err("balance is insufficient");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::InsufficientBalance {
                balance: 5,
                amount: 6,
                ..
            }),
        ));
    }

    #[test]
    fn transfer_moves_funds_and_rolls_back_with_session() -> Result<()> {
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);
        let mut database = database();

        let mut session = database.start_session();
        session.increase_balance(alice, 0, 100)?;
        session.commit();

        let mut session = database.start_session();
        session.transfer(alice, bob, 0, 30)?;

        assert_eq!(session.balance(alice, 0)?, 70);
        assert_eq!(session.balance(bob, 0)?, 30);

        drop(session);

        assert_eq!(database.balance(alice, 0)?, 100);
        assert_eq!(database.balance(bob, 0)?, 0);

        Ok(())
    }

    #[test]
    fn temp_account_is_tracked_across_assets() -> Result<()> {
        let mut database = database();
        let mut session = database.start_session();

        assert!(session.temp_account_is_empty());

        session.increase_balance(TEMP_ACCOUNT, 7, 1)?;

        assert!(!session.temp_account_is_empty());

        session.decrease_balance(TEMP_ACCOUNT, 7, 1)?;

        assert!(session.temp_account_is_empty());

        Ok(())
    }

    #[test]
    fn reading_with_wrong_type_fails() {
        let mut database = database();
        let mut session = database.start_session();

        session
            .insert(ObjectKey::Contract(Address::repeat_byte(1)), Balance { amount: 1 }.into())
            .expect("session is open");

        let error = session
            .require::<Contract>(ObjectKey::Contract(Address::repeat_byte(1)))
            .expect_err("object is a balance");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::UnexpectedObject { .. }),
        ));
    }
}
