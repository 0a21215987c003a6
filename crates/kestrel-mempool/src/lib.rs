//! # kestrel-mempool
//!
//! Transaction mempool for the Kestrel blockchain.
//!
//! This crate provides:
//! - Transaction admission with double-spend, package-limit, and fee checks
//! - Ancestor/descendant fee accounting with incremental updates
//! - Four concurrently-maintained ranking orders (descendant score,
//!   ancestor score, entry time, raw feerate)
//! - Size-ceiling eviction with a decaying minimum-feerate floor
//! - Replace-by-fee admission of conflicting transactions
//! - A reorg replay queue and a versioned dump/load persistence format
//!
//! The whole pool (store, adjacency, indices, counters) lives behind a
//! single lock; see `pool` module docs for the locking discipline.

mod admission;
mod config;
mod entry;
mod error;
mod ordering;
mod persist;
mod pool;
mod reject;
mod reorg;
#[cfg(test)]
pub(crate) mod testutil;

pub use admission::{Accepted, AdmissionOptions};
pub use config::MempoolConfig;
pub use entry::{LockPoints, MempoolEntry, TxMempoolInfo};
pub use error::{PackageLimitKind, RejectReason};
pub use persist::{
    dump_to_file, dump_to_writer, load_from_file, load_from_reader, LoadSummary, PersistError,
    PersistResult, DUMP_VERSION,
};
pub use pool::{
    Mempool, MempoolObserver, MempoolStats, MiningSnapshot, RemovalReason, SnapshotEntry,
};
pub use reject::RecentRejects;
pub use reorg::DisconnectedBlockTransactions;

/// Default maximum pool memory usage in bytes.
pub const DEFAULT_MAX_POOL_BYTES: u64 = 300 * 1024 * 1024;

/// Default transaction expiry time in seconds (two weeks).
pub const DEFAULT_EXPIRY_SECS: u64 = 14 * 24 * 3600;

/// Default ancestor/descendant package count ceiling.
pub const DEFAULT_PACKAGE_COUNT_LIMIT: u64 = 25;

/// Default ancestor/descendant package size ceiling in bytes.
pub const DEFAULT_PACKAGE_SIZE_LIMIT: u64 = 101_000;

/// Default minimum relay feerate in sat/kB.
pub const DEFAULT_MIN_RELAY_FEE_PER_KB: u64 = 1_000;

/// Default incremental feerate step used when bumping the eviction
/// floor and pricing replacements, in sat/kB.
pub const DEFAULT_INCREMENTAL_FEE_PER_KB: u64 = 1_000;

/// Default cap on transactions evicted by a single replacement.
pub const DEFAULT_MAX_REPLACEMENT_EVICTIONS: usize = 100;

/// Default halflife of the rolling fee floor decay, in seconds.
pub const DEFAULT_ROLLING_FEE_HALFLIFE_SECS: u64 = 12 * 3600;

/// Default minimum gas price accepted for contract payloads.
pub const DEFAULT_MIN_GAS_PRICE: u64 = 40;

/// Default cap on queued disconnected-block transactions, in bytes.
pub const DEFAULT_MAX_DISCONNECTED_BYTES: u64 = 20 * 1024 * 1024;
