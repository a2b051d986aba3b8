pub use ethereum_types::{H160, H256};

pub type Address = H160;
pub type Amount = u64;
pub type AssetId = u32;
pub type BlockId = H256;
pub type BlockNumber = u32;
pub type ChainId = H256;
pub type Gas = u64;
pub type OrderId = u64;
pub type ProducerId = u32;
pub type ProposalId = u64;
pub type Slot = u64;
pub type TransactionId = H256;
pub type UnixSeconds = u64;

/// Block IDs carry the block number in their first 4 bytes.
#[must_use]
pub fn block_number_from_id(id: BlockId) -> BlockNumber {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&id.as_bytes()[..4]);
    BlockNumber::from_be_bytes(bytes)
}

#[must_use]
pub fn id_with_number(mut hash: H256, number: BlockNumber) -> BlockId {
    hash.as_bytes_mut()[..4].copy_from_slice(&number.to_be_bytes());
    hash
}

/// The word of a block ID that transactions commit to when referencing it.
#[must_use]
pub fn tapos_prefix(id: BlockId) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&id.as_bytes()[4..8]);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0)]
    #[test_case(1)]
    #[test_case(0x0001_0000)]
    #[test_case(BlockNumber::MAX)]
    fn block_number_survives_embedding_in_id(number: BlockNumber) {
        let id = id_with_number(H256::repeat_byte(0xcd), number);

        assert_eq!(block_number_from_id(id), number);
        assert_eq!(tapos_prefix(id), 0xcdcd_cdcd);
    }
}
