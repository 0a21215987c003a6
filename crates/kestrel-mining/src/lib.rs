//! # kestrel-mining
//!
//! Block template assembly for the Kestrel blockchain.
//!
//! This crate provides:
//! - Greedy transaction selection over the mempool's ancestor-score
//!   order, keeping parents ahead of children
//! - Template caching with staleness detection against the pool's
//!   mutation counter

mod assembler;

pub use assembler::{AssemblerConfig, BlockAssembler, BlockTemplate};

/// Default maximum block payload in bytes.
pub const DEFAULT_MAX_BLOCK_BYTES: u64 = 1_000_000;

/// Default maximum transactions per block.
pub const DEFAULT_MAX_BLOCK_TXS: usize = 4_000;
