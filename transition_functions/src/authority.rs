use anyhow::{ensure, Result};
use ledger::{Ledger as _, LedgerDatabase};
use types::{
    crypto::{self, PublicKey},
    operations::Operation,
    primitives::ChainId,
    transaction::SignedTransaction,
};

use crate::error::Error;

/// Checks that every operation in `transaction` is authorized by its signers.
///
/// Authorities are resolved in order:
/// - blocked addresses are rejected;
/// - addresses allow-listed for the operation kind need no signature;
/// - multisignature addresses need `threshold` distinct listed keys among the signers;
/// - any other address needs a signer whose key derives to it.
pub fn verify_authority(
    state: &LedgerDatabase,
    transaction: &SignedTransaction,
    chain_id: ChainId,
) -> Result<()> {
    let digest = transaction.digest(chain_id);

    for signature in &transaction.signatures {
        ensure!(
            crypto::verify(&signature.public_key, digest, &signature.signature),
            Error::InvalidTransactionSignature {
                public_key: signature.public_key,
            },
        );
    }

    let signers = transaction.signers().collect::<Vec<_>>();

    transaction
        .operations
        .iter()
        .try_for_each(|operation| verify_operation_authority(state, operation, &signers))
}

fn verify_operation_authority(
    state: &LedgerDatabase,
    operation: &Operation,
    signers: &[&PublicKey],
) -> Result<()> {
    let address = operation.authority();
    let kind = operation.kind();

    ensure!(!state.is_blocked(address), Error::BlockedAddress { address });

    if state.allowed_operations(address)?.contains(kind) {
        return Ok(());
    }

    if let Some(multisig) = state.multisig(address)? {
        let mut matched = vec![];

        for key in &multisig.keys {
            if signers.contains(&key) && !matched.contains(&key) {
                matched.push(key);
            }
        }

        let sufficient =
            u32::try_from(matched.len()).is_ok_and(|provided| provided >= multisig.threshold);

        ensure!(
            sufficient,
            Error::MultisigThresholdNotMet {
                address,
                required: multisig.threshold,
                provided: matched.len(),
            },
        );

        return Ok(());
    }

    let signed = signers
        .iter()
        .any(|public_key| crypto::address_of(public_key) == address);

    ensure!(signed, Error::MissingAuthority { address, kind });

    Ok(())
}

#[cfg(test)]
mod tests {
    use enumset::EnumSet;
    use ledger::{
        genesis_objects, BlockedAddress, MultisigAuthority, Object, ObjectKey, OperationAllowList,
    };
    use test_case::test_case;
    use types::{
        config::{GenesisAllowList, GenesisMultisig},
        operations::OperationKind,
        primitives::Address,
    };

    use super::*;

    const MULTISIG: Address = Address::repeat_byte(0x77);

    fn transfer_from(from: Address, signers: &[u8]) -> SignedTransaction {
        let mut operation = factory::transfer(10, factory::address(11), 1, 1);

        if let Operation::Transfer(transfer) = &mut operation {
            transfer.from = from;
        }

        let transaction = factory::transaction(vec![operation], Default::default(), 1);
        factory::sign_transaction(transaction, signers)
    }

    fn database() -> Result<LedgerDatabase> {
        let mut genesis = factory::genesis([1], [10]);

        genesis.blocked_addresses = vec![factory::address(12)];
        genesis.operation_allow_lists = vec![GenesisAllowList {
            address: factory::address(13),
            operations: vec![OperationKind::Transfer],
        }];
        genesis.multisig_authorities = vec![GenesisMultisig {
            address: MULTISIG,
            threshold: 2,
            keys: vec![factory::public_key(20), factory::public_key(21), factory::public_key(22)],
        }];

        Ok(LedgerDatabase::new(genesis_objects(&genesis)?, 1))
    }

    #[test]
    fn signer_key_must_derive_to_authority() -> Result<()> {
        let database = database()?;

        verify_authority(&database, &transfer_from(factory::address(10), &[10]), factory::CHAIN_ID)?;

        let error = verify_authority(
            &database,
            &transfer_from(factory::address(10), &[11]),
            factory::CHAIN_ID,
        )
        .expect_err("account 11 cannot sign for account 10");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::MissingAuthority { .. }),
        ));

        Ok(())
    }

    #[test]
    fn signature_for_other_chain_is_invalid() -> Result<()> {
        let database = database()?;
        let transaction = transfer_from(factory::address(10), &[10]);

        let error = verify_authority(&database, &transaction, Default::default())
            .expect_err("signature is bound to a different chain");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::InvalidTransactionSignature { .. }),
        ));

        Ok(())
    }

    #[test]
    fn blocked_address_is_rejected_even_when_signed() -> Result<()> {
        let database = database()?;

        let error = verify_authority(
            &database,
            &transfer_from(factory::address(12), &[12]),
            factory::CHAIN_ID,
        )
        .expect_err("account 12 is blocked");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::BlockedAddress { .. }),
        ));

        Ok(())
    }

    #[test]
    fn allow_listed_operation_needs_no_signature() -> Result<()> {
        let database = database()?;
        verify_authority(&database, &transfer_from(factory::address(13), &[]), factory::CHAIN_ID)
    }

    #[test_case(&[20] => false; "one of two")]
    #[test_case(&[20, 20] => false; "same key twice")]
    #[test_case(&[20, 22] => true; "two of two")]
    #[test_case(&[21, 30, 22] => true; "with unlisted signer")]
    fn multisig_threshold(signers: &[u8]) -> bool {
        let database = database().expect("genesis configuration is valid");
        verify_authority(&database, &transfer_from(MULTISIG, signers), factory::CHAIN_ID).is_ok()
    }

    #[test]
    fn genesis_records_authority_objects() -> Result<()> {
        let database = database()?;

        assert_eq!(
            database.get(&ObjectKey::BlockedAddress(factory::address(12))),
            Some(&Object::BlockedAddress(BlockedAddress)),
        );
        assert_eq!(
            database.get(&ObjectKey::OperationAllowList(factory::address(13))),
            Some(&Object::OperationAllowList(OperationAllowList {
                operations: EnumSet::only(OperationKind::Transfer),
            })),
        );
        assert!(matches!(
            database.multisig(MULTISIG)?,
            Some(MultisigAuthority { threshold: 2, .. }),
        ));

        Ok(())
    }
}
