//! Tree of recently seen blocks, including ones that are not on the canonical chain.
//!
//! Blocks are stored in an arena keyed by ID with explicit parent IDs.
//! Ancestor walks are iterative lookups.
//! The index never validates block contents. That is the job of the block applicator,
//! and blocks that fail validation are [removed](ForkDatabase::remove) together with their
//! descendants.
//!
//! The head of the index is the tallest block seen. It is not necessarily the head of the
//! canonical chain. The chain reorganizer compares the two to decide whether to switch forks.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use anyhow::{ensure, Result};
use log::debug;
use types::{
    block::SignedBlock,
    consts::GENESIS_BLOCK_ID,
    primitives::{BlockId, BlockNumber},
};

pub use crate::error::Error;

mod error;

pub const DEFAULT_MAX_SIZE: BlockNumber = 1024;

/// Blocks ordered from tip to ancestor.
pub type Branch = Vec<Arc<ForkItem>>;

#[derive(Debug)]
pub struct ForkItem {
    pub id: BlockId,
    pub previous_id: BlockId,
    pub number: BlockNumber,
    pub block: Arc<SignedBlock>,
}

impl ForkItem {
    #[must_use]
    pub fn new(block: Arc<SignedBlock>) -> Self {
        Self {
            id: block.id(),
            previous_id: block.previous,
            number: block.block_number(),
            block,
        }
    }
}

pub struct ForkDatabase {
    items: HashMap<BlockId, Arc<ForkItem>>,
    by_number: BTreeMap<BlockNumber, Vec<BlockId>>,
    head: Option<Arc<ForkItem>>,
    max_size: BlockNumber,
}

impl Default for ForkDatabase {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl ForkDatabase {
    #[must_use]
    pub fn new(max_size: BlockNumber) -> Self {
        Self {
            items: HashMap::new(),
            by_number: BTreeMap::new(),
            head: None,
            max_size,
        }
    }

    #[must_use]
    pub const fn head(&self) -> Option<&Arc<ForkItem>> {
        self.head.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn is_known_block(&self, block_id: BlockId) -> bool {
        self.items.contains_key(&block_id)
    }

    #[must_use]
    pub fn fetch_block(&self, block_id: BlockId) -> Option<&Arc<ForkItem>> {
        self.items.get(&block_id)
    }

    /// Multiple branches may contain blocks with the same number.
    #[must_use]
    pub fn fetch_block_by_number(&self, number: BlockNumber) -> Vec<Arc<ForkItem>> {
        self.by_number
            .get(&number)
            .into_iter()
            .flatten()
            .filter_map(|block_id| self.items.get(block_id))
            .cloned()
            .collect()
    }

    /// Adds a block and returns the new head of the index.
    ///
    /// The first block added to an empty index becomes its root.
    /// Every later block must link to a known one or to genesis.
    pub fn push_block(&mut self, block: Arc<SignedBlock>) -> Result<Arc<ForkItem>> {
        let item = Arc::new(ForkItem::new(block));
        let block_id = item.id;

        ensure!(
            !self.items.contains_key(&block_id),
            Error::DuplicateBlock { block_id },
        );

        if let Some(head) = &self.head {
            let linkable = item.previous_id == GENESIS_BLOCK_ID
                || self.items.contains_key(&item.previous_id);

            ensure!(
                item.number > head.number.saturating_sub(self.max_size),
                Error::BlockTooOld {
                    block_id,
                    number: item.number,
                    head_number: head.number,
                },
            );

            ensure!(
                linkable,
                Error::UnlinkableBlock {
                    block_id,
                    previous: item.previous_id,
                },
            );
        }

        self.insert(Arc::clone(&item));

        if self.head.as_ref().is_none_or(|head| item.number > head.number) {
            self.head = Some(item);
        }

        let head = self.head.as_ref().expect("head was set above if it was missing");

        Ok(Arc::clone(head))
    }

    /// Walks back from `first` and `second` to their common ancestor.
    ///
    /// The last block in each non-empty branch is a child of the common ancestor.
    /// If one block is an ancestor of the other, its branch is empty.
    ///
    /// # Panics
    ///
    /// Panics if the ancestry of either block is broken before a common ancestor is reached.
    /// That can only happen if the index has been corrupted.
    pub fn fetch_branch_from(&self, first: BlockId, second: BlockId) -> Result<(Branch, Branch)> {
        let mut first_item = self.require(first)?;
        let mut second_item = self.require(second)?;
        let mut first_branch = vec![];
        let mut second_branch = vec![];

        while first_item.number > second_item.number {
            first_branch.push(Arc::clone(&first_item));
            first_item = self.parent_of(&first_item);
        }

        while second_item.number > first_item.number {
            second_branch.push(Arc::clone(&second_item));
            second_item = self.parent_of(&second_item);
        }

        while first_item.id != second_item.id {
            first_branch.push(Arc::clone(&first_item));
            second_branch.push(Arc::clone(&second_item));

            if first_item.previous_id == second_item.previous_id {
                break;
            }

            first_item = self.parent_of(&first_item);
            second_item = self.parent_of(&second_item);
        }

        Ok((first_branch, second_branch))
    }

    /// Removes a block and all of its descendants.
    ///
    /// If the head is removed, the parent of the removed block becomes the head if it is still
    /// known. Otherwise the tallest remaining block does.
    pub fn remove(&mut self, block_id: BlockId) -> usize {
        let Some(root) = self.items.get(&block_id).cloned() else {
            return 0;
        };

        let mut pending = vec![block_id];
        let mut removed = 0;

        while let Some(block_id) = pending.pop() {
            let Some(item) = self.items.remove(&block_id) else {
                continue;
            };

            self.unindex_number(&item);

            pending.extend(
                self.items
                    .values()
                    .filter(|child| child.previous_id == block_id)
                    .map(|child| child.id),
            );

            removed += 1;
        }

        let head_removed = self
            .head
            .as_ref()
            .is_some_and(|head| !self.items.contains_key(&head.id));

        if head_removed {
            self.head = self
                .items
                .get(&root.previous_id)
                .cloned()
                .or_else(|| self.tallest());
        }

        debug!("removed {removed} blocks from fork index starting at {block_id:?}");

        removed
    }

    /// Repositions the head without changing what the index contains.
    pub fn set_head(&mut self, item: Arc<ForkItem>) {
        self.head = Some(item);
    }

    /// Moves the head to its parent. The head becomes empty if the parent is not in the index.
    pub fn pop_block(&mut self) -> Result<Arc<ForkItem>> {
        let head = self.head.take().ok_or(Error::Empty)?;
        self.head = self.items.get(&head.previous_id).cloned();
        Ok(head)
    }

    /// Sets how far below the head blocks are kept and prunes older ones.
    pub fn set_max_size(&mut self, max_size: BlockNumber) {
        self.max_size = max_size;

        let Some(head) = &self.head else {
            return;
        };

        let minimum = head.number.saturating_sub(max_size);
        let retained = self.by_number.split_off(&minimum);
        let pruned = core::mem::replace(&mut self.by_number, retained);

        for block_id in pruned.into_values().flatten() {
            self.items.remove(&block_id);
        }
    }

    fn insert(&mut self, item: Arc<ForkItem>) {
        self.by_number.entry(item.number).or_default().push(item.id);
        self.items.insert(item.id, item);
    }

    fn unindex_number(&mut self, item: &ForkItem) {
        if let Some(block_ids) = self.by_number.get_mut(&item.number) {
            block_ids.retain(|block_id| *block_id != item.id);

            if block_ids.is_empty() {
                self.by_number.remove(&item.number);
            }
        }
    }

    fn tallest(&self) -> Option<Arc<ForkItem>> {
        let (_, block_ids) = self.by_number.last_key_value()?;
        block_ids
            .first()
            .and_then(|block_id| self.items.get(block_id))
            .cloned()
    }

    fn require(&self, block_id: BlockId) -> Result<Arc<ForkItem>> {
        self.items
            .get(&block_id)
            .cloned()
            .ok_or_else(|| Error::UnknownBlock { block_id }.into())
    }

    fn parent_of(&self, item: &ForkItem) -> Arc<ForkItem> {
        self.items.get(&item.previous_id).cloned().unwrap_or_else(|| {
            panic!(
                "fork index has no common ancestor for branch containing {:?}",
                item.id,
            )
        })
    }
}
