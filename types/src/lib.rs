pub mod block;
pub mod config;
pub mod consts;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod operations;
pub mod primitives;
pub mod skip;
pub mod transaction;
