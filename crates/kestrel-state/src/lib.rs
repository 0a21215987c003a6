//! # kestrel-state
//!
//! Chain state access for the Kestrel blockchain.
//!
//! This crate provides:
//! - The `Coin` record for unspent outputs
//! - The `CoinView` trait the mempool and miner read chain state through
//! - An in-memory UTXO view backing tests and light wiring
//!
//! Lock order: components that hold the mempool lock may read a
//! `CoinView`, never the reverse. Implementations must therefore answer
//! from already-materialized state without blocking.

mod view;

pub use view::{Coin, CoinView, MemoryUtxoView};
