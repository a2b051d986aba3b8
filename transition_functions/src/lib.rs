//! State transitions of the chain.
//!
//! Nothing in this crate opens, commits or reverts sessions. Callers wrap every transition in a
//! session of their own and discard it when the transition fails.

pub use crate::{
    authority::verify_authority,
    block_processing::BlockProcessor,
    context::{AppliedOperation, ChainContext, EvaluationState},
    dispatch::{apply_operation, Evaluator},
    end_of_block::DebugUpdate,
    error::Error,
    events::{ChainEvent, EventSink},
    schedule::{slot_at_time, slot_time, ProducerSchedule, ShuffledSchedule},
    transaction_processing::apply_transaction,
};

mod authority;
mod block_processing;
mod context;
mod dispatch;
mod end_of_block;
mod error;
mod events;
mod schedule;
mod transaction_processing;

mod evaluators {
    mod balance;
    mod contract;
    mod governance;
    mod market;
    mod producer;
}
