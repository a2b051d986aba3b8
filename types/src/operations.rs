use anyhow::{ensure, Result};
use derive_more::From;
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use crate::{
    config::ChainParameters,
    consts::TEMP_ACCOUNT,
    crypto::PublicKey,
    error::Error,
    primitives::{Address, Amount, AssetId, Gas, OrderId, ProducerId, ProposalId, UnixSeconds},
};

#[derive(Debug, Serialize, Deserialize, AsRefStr, EnumSetType)]
pub enum OperationKind {
    Transfer,
    ProducerCreate,
    ProducerUpdate,
    ChainParametersUpdate,
    ProposalCreate,
    LimitOrderCreate,
    PriceFeedPublish,
    ContractRegister,
    ContractInvoke,
    ContractTransfer,
}

impl OperationKind {
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Returns `None` for negative and unassigned tags.
    #[must_use]
    pub fn from_tag(tag: i64) -> Option<Self> {
        let index = usize::try_from(tag).ok()?;
        EnumSet::<Self>::all().iter().nth(index)
    }

    #[must_use]
    pub const fn is_contract(self) -> bool {
        matches!(
            self,
            Self::ContractRegister | Self::ContractInvoke | Self::ContractTransfer,
        )
    }
}

/// Fields and checks shared by every operation payload.
pub trait OperationPayload {
    const KIND: OperationKind;

    fn fee(&self) -> Amount;

    /// The address that pays the fee and must authorize the operation.
    fn authority(&self) -> Address;

    fn validate(&self) -> Result<()>;

    fn gas(&self) -> Gas {
        0
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Transfer {
    pub fee: Amount,
    pub from: Address,
    pub to: Address,
    pub asset: AssetId,
    pub amount: Amount,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ProducerCreate {
    pub fee: Amount,
    pub account: Address,
    pub signing_key: PublicKey,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ProducerUpdate {
    pub fee: Amount,
    pub producer: ProducerId,
    pub account: Address,
    pub new_signing_key: PublicKey,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ChainParametersUpdate {
    pub fee: Amount,
    pub committee: Address,
    pub parameters: ChainParameters,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ProposalCreate {
    pub fee: Amount,
    pub proposer: Address,
    pub expiration: UnixSeconds,
    pub operations: Vec<Operation>,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct LimitOrderCreate {
    pub fee: Amount,
    pub seller: Address,
    pub sell_asset: AssetId,
    pub amount_to_sell: Amount,
    pub receive_asset: AssetId,
    pub min_to_receive: Amount,
    pub expiration: UnixSeconds,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Price {
    pub base: Amount,
    pub quote: Amount,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct PriceFeedPublish {
    pub fee: Amount,
    pub publisher: Address,
    pub producer: ProducerId,
    pub asset: AssetId,
    pub price: Price,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ContractRegister {
    pub fee: Amount,
    pub owner: Address,
    pub code: Vec<u8>,
    pub gas: Gas,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ContractInvoke {
    pub fee: Amount,
    pub caller: Address,
    pub contract: Address,
    pub input: Vec<u8>,
    pub gas: Gas,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ContractTransfer {
    pub fee: Amount,
    pub caller: Address,
    pub contract: Address,
    pub asset: AssetId,
    pub amount: Amount,
    pub gas: Gas,
}

fn ensure_not_temporary(kind: OperationKind, addresses: &[Address]) -> Result<()> {
    ensure!(
        !addresses.contains(&TEMP_ACCOUNT),
        Error::TemporaryAccountReferenced { kind },
    );

    Ok(())
}

impl OperationPayload for Transfer {
    const KIND: OperationKind = OperationKind::Transfer;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.from
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.amount > 0, Error::ZeroAmount { kind: Self::KIND });
        ensure!(
            self.from != self.to,
            Error::SelfTransfer { address: self.from },
        );
        ensure_not_temporary(Self::KIND, &[self.from, self.to])
    }
}

impl OperationPayload for ProducerCreate {
    const KIND: OperationKind = OperationKind::ProducerCreate;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.account
    }

    fn validate(&self) -> Result<()> {
        ensure_not_temporary(Self::KIND, &[self.account])
    }
}

impl OperationPayload for ProducerUpdate {
    const KIND: OperationKind = OperationKind::ProducerUpdate;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.account
    }

    fn validate(&self) -> Result<()> {
        ensure_not_temporary(Self::KIND, &[self.account])
    }
}

impl OperationPayload for ChainParametersUpdate {
    const KIND: OperationKind = OperationKind::ChainParametersUpdate;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.committee
    }

    fn validate(&self) -> Result<()> {
        ensure_not_temporary(Self::KIND, &[self.committee])?;
        self.parameters.validate()
    }
}

impl OperationPayload for ProposalCreate {
    const KIND: OperationKind = OperationKind::ProposalCreate;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.proposer
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.operations.is_empty(), Error::EmptyProposal);
        ensure_not_temporary(Self::KIND, &[self.proposer])?;
        self.operations.iter().try_for_each(Operation::validate)
    }
}

impl OperationPayload for LimitOrderCreate {
    const KIND: OperationKind = OperationKind::LimitOrderCreate;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.seller
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.amount_to_sell > 0 && self.min_to_receive > 0,
            Error::ZeroAmount { kind: Self::KIND },
        );
        ensure!(self.sell_asset != self.receive_asset, Error::SameAssetOrder);
        ensure_not_temporary(Self::KIND, &[self.seller])
    }
}

impl OperationPayload for PriceFeedPublish {
    const KIND: OperationKind = OperationKind::PriceFeedPublish;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.publisher
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.price.base > 0 && self.price.quote > 0,
            Error::InvalidPrice,
        );
        ensure_not_temporary(Self::KIND, &[self.publisher])
    }
}

impl OperationPayload for ContractRegister {
    const KIND: OperationKind = OperationKind::ContractRegister;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.owner
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.gas > 0, Error::ZeroGas { kind: Self::KIND });
        ensure_not_temporary(Self::KIND, &[self.owner])
    }

    fn gas(&self) -> Gas {
        self.gas
    }
}

impl OperationPayload for ContractInvoke {
    const KIND: OperationKind = OperationKind::ContractInvoke;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.caller
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.gas > 0, Error::ZeroGas { kind: Self::KIND });
        ensure_not_temporary(Self::KIND, &[self.caller, self.contract])
    }

    fn gas(&self) -> Gas {
        self.gas
    }
}

impl OperationPayload for ContractTransfer {
    const KIND: OperationKind = OperationKind::ContractTransfer;

    fn fee(&self) -> Amount {
        self.fee
    }

    fn authority(&self) -> Address {
        self.caller
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.gas > 0, Error::ZeroGas { kind: Self::KIND });
        ensure!(self.amount > 0, Error::ZeroAmount { kind: Self::KIND });
        ensure_not_temporary(Self::KIND, &[self.caller, self.contract])
    }

    fn gas(&self) -> Gas {
        self.gas
    }
}

#[derive(Clone, PartialEq, Eq, Debug, From, Deserialize, Serialize)]
pub enum Operation {
    Transfer(Transfer),
    ProducerCreate(ProducerCreate),
    ProducerUpdate(ProducerUpdate),
    ChainParametersUpdate(ChainParametersUpdate),
    ProposalCreate(ProposalCreate),
    LimitOrderCreate(LimitOrderCreate),
    PriceFeedPublish(PriceFeedPublish),
    ContractRegister(ContractRegister),
    ContractInvoke(ContractInvoke),
    ContractTransfer(ContractTransfer),
}

macro_rules! with_payload {
    ($operation:expr, $payload:ident => $body:expr) => {
        match $operation {
            Operation::Transfer($payload) => $body,
            Operation::ProducerCreate($payload) => $body,
            Operation::ProducerUpdate($payload) => $body,
            Operation::ChainParametersUpdate($payload) => $body,
            Operation::ProposalCreate($payload) => $body,
            Operation::LimitOrderCreate($payload) => $body,
            Operation::PriceFeedPublish($payload) => $body,
            Operation::ContractRegister($payload) => $body,
            Operation::ContractInvoke($payload) => $body,
            Operation::ContractTransfer($payload) => $body,
        }
    };
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        fn kind_of<T: OperationPayload>(_: &T) -> OperationKind {
            T::KIND
        }

        with_payload!(self, payload => kind_of(payload))
    }

    #[must_use]
    pub fn fee(&self) -> Amount {
        with_payload!(self, payload => payload.fee())
    }

    #[must_use]
    pub fn authority(&self) -> Address {
        with_payload!(self, payload => payload.authority())
    }

    #[must_use]
    pub fn gas(&self) -> Gas {
        with_payload!(self, payload => payload.gas())
    }

    #[must_use]
    pub fn is_contract(&self) -> bool {
        self.kind().is_contract()
    }

    pub fn validate(&self) -> Result<()> {
        with_payload!(self, payload => payload.validate())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub enum OperationResult {
    Void,
    Producer(ProducerId),
    Proposal(ProposalId),
    LimitOrder(OrderId),
    Contract(Address),
}
