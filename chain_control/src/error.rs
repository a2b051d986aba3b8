use thiserror::Error;
use types::primitives::{BlockNumber, ProducerId, UnixSeconds};

#[derive(Debug, Error)]
pub enum Error {
    #[error("assembled block is too large (size: {size}, maximum: {maximum})")]
    BlockTooLarge { size: u64, maximum: u64 },
    #[error("there are no blocks to pop")]
    EmptyChain,
    #[error("producer {producer_id} is not scheduled at {when} (scheduled: {scheduled})")]
    NotScheduled {
        producer_id: ProducerId,
        scheduled: ProducerId,
        when: UnixSeconds,
    },
    #[error("no slot starts after the head block at {when}")]
    NoSlotAt { when: UnixSeconds },
    #[error("signing key does not belong to producer {producer_id}")]
    SigningKeyMismatch { producer_id: ProducerId },
    #[error("stored secret commitment of producer {producer_id} cannot be reproduced")]
    SecretCommitmentMismatch { producer_id: ProducerId },
    #[error("no block with number {number} on the canonical chain")]
    UnknownBlockNumber { number: BlockNumber },
}
