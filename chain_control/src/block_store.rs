use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use types::{
    block::SignedBlock,
    primitives::{BlockId, BlockNumber},
};

/// Archive of the blocks on the canonical chain.
#[derive(Default)]
pub struct BlockStore {
    blocks: HashMap<BlockId, Arc<SignedBlock>>,
    ids_by_number: BTreeMap<BlockNumber, BlockId>,
}

impl BlockStore {
    /// Replaces any block previously stored at the same height.
    pub fn store(&mut self, block: Arc<SignedBlock>) {
        let block_id = block.id();

        if let Some(replaced) = self.ids_by_number.insert(block.block_number(), block_id) {
            self.blocks.remove(&replaced);
        }

        self.blocks.insert(block_id, block);
    }

    pub fn remove(&mut self, block_id: BlockId) -> Option<Arc<SignedBlock>> {
        let block = self.blocks.remove(&block_id)?;
        self.ids_by_number.remove(&block.block_number());
        Some(block)
    }

    #[must_use]
    pub fn contains(&self, block_id: BlockId) -> bool {
        self.blocks.contains_key(&block_id)
    }

    #[must_use]
    pub fn fetch_by_id(&self, block_id: BlockId) -> Option<&Arc<SignedBlock>> {
        self.blocks.get(&block_id)
    }

    #[must_use]
    pub fn fetch_by_number(&self, number: BlockNumber) -> Option<&Arc<SignedBlock>> {
        self.blocks.get(self.ids_by_number.get(&number)?)
    }

    #[must_use]
    pub fn id_for_number(&self, number: BlockNumber) -> Option<BlockId> {
        self.ids_by_number.get(&number).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use types::{block::BlockHeader, consts::GENESIS_BLOCK_ID};

    use super::*;

    fn block(previous: BlockId, timestamp: u64) -> Arc<SignedBlock> {
        Arc::new(SignedBlock {
            header: BlockHeader {
                previous,
                timestamp,
                ..BlockHeader::default()
            },
            ..SignedBlock::default()
        })
    }

    #[test]
    fn storing_at_same_height_replaces_block() {
        let mut store = BlockStore::default();
        let first = block(GENESIS_BLOCK_ID, 1);
        let second = block(GENESIS_BLOCK_ID, 2);

        store.store(Arc::clone(&first));
        store.store(Arc::clone(&second));

        assert_eq!(store.len(), 1);
        assert!(!store.contains(first.id()));
        assert_eq!(store.id_for_number(1), Some(second.id()));
    }

    #[test]
    fn removed_block_is_forgotten_by_number() {
        let mut store = BlockStore::default();
        let first = block(GENESIS_BLOCK_ID, 1);
        let second = block(first.id(), 2);

        store.store(Arc::clone(&first));
        store.store(Arc::clone(&second));

        assert!(store.remove(second.id()).is_some());
        assert!(store.remove(second.id()).is_none());
        assert_eq!(store.fetch_by_number(2), None);
        assert_eq!(store.fetch_by_number(1), Some(&first));
    }
}
