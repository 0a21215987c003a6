//! # kestrel-chain-types
//!
//! Core data types for the Kestrel blockchain.
//!
//! This crate provides:
//! - Transaction and block identifiers (blake2b-256 hashes)
//! - The transaction model, including optional contract execution payloads
//! - Outpoint and output types shared by state and mempool
//! - Fee rate arithmetic with overflow-safe ratio comparison
//! - The binary codec used for wire and disk serialization

mod codec;
mod fee_rate;
mod ids;
mod transaction;

pub use codec::{CodecError, CodecResult, SliceReader};
pub use fee_rate::{cmp_feerate, FeeRate};
pub use ids::{BlockId, ContractAddress, TxId};
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput, TxPayload};

/// Smallest currency unit per KST.
pub const COIN: u64 = 100_000_000;

/// Blocks a coinbase output must age before it is spendable.
pub const COINBASE_MATURITY: u32 = 500;

/// Hard cap on serialized transaction size in bytes.
pub const MAX_TX_SIZE: u64 = 100_000;
