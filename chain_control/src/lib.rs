//! Control of a single replica of the chain.
//!
//! This crate handles the following concerns:
//! - Choosing the canonical branch among competing blocks and reorganizing onto it.
//! - Keeping applied blocks reversible within the retention window.
//! - Holding pending transactions on top of the head block.
//! - Producing blocks from pending transactions.
//! - Testing.

pub use crate::{
    block_producer::assemble_transactions, block_store::BlockStore, chain::Chain, error::Error,
    pending::PendingPool, retention::RetentionPolicy,
};

mod block_producer;
mod block_store;
mod chain;
mod error;
mod pending;
mod retention;

#[cfg(test)]
mod helpers;
