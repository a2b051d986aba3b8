use thiserror::Error;
use types::primitives::{BlockId, BlockNumber};

#[derive(Debug, Error)]
pub enum Error {
    #[error("block is already known: {block_id:?}")]
    DuplicateBlock { block_id: BlockId },
    #[error("block does not link to any known block (block: {block_id:?}, previous: {previous:?})")]
    UnlinkableBlock { block_id: BlockId, previous: BlockId },
    #[error(
        "block is too old to be added to the fork index \
         (block: {block_id:?}, number: {number}, head number: {head_number})"
    )]
    BlockTooOld {
        block_id: BlockId,
        number: BlockNumber,
        head_number: BlockNumber,
    },
    #[error("block is not in the fork index: {block_id:?}")]
    UnknownBlock { block_id: BlockId },
    #[error("fork index is empty")]
    Empty,
}
