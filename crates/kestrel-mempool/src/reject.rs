//! Recently-rejected transaction filter.
//!
//! Relay code consults this before re-validating a transaction a peer
//! announces again, saving bandwidth and CPU on spam. It is a hint,
//! never authoritative: entries expire, the table is swept at capacity,
//! and the whole thing resets when the chain tip moves (a rejection
//! valid at one tip may not hold at the next).

use crate::error::RejectReason;
use dashmap::DashMap;
use kestrel_chain_types::{BlockId, TxId};
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default capacity before a sweep is forced.
const DEFAULT_MAX_SIZE: usize = 60_000;

/// Default entry time-to-live.
const DEFAULT_TTL: Duration = Duration::from_secs(600);

struct RejectedEntry {
    added_at: Instant,
    reason: RejectReason,
}

/// Rolling table of recently rejected transaction identities.
pub struct RecentRejects {
    entries: DashMap<TxId, RejectedEntry>,
    ttl: Duration,
    max_size: usize,
    tip: RwLock<BlockId>,
}

impl RecentRejects {
    /// Create a table with explicit bounds.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_size,
            tip: RwLock::new(BlockId::default()),
        }
    }

    /// Create a table with default bounds.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_TTL)
    }

    /// Record a rejection.
    pub fn insert(&self, txid: TxId, reason: RejectReason) {
        if self.entries.len() >= self.max_size {
            self.cleanup();
        }
        self.entries.insert(
            txid,
            RejectedEntry {
                added_at: Instant::now(),
                reason,
            },
        );
    }

    /// Why a transaction was rejected, if recently and still unexpired.
    pub fn rejection(&self, txid: &TxId) -> Option<RejectReason> {
        self.entries.get(txid).and_then(|entry| {
            (entry.added_at.elapsed() < self.ttl).then(|| entry.reason.clone())
        })
    }

    /// Whether a transaction was recently rejected.
    pub fn contains(&self, txid: &TxId) -> bool {
        self.rejection(txid).is_some()
    }

    /// Reset the table if the chain tip moved since the last call.
    /// Rejections are only meaningful against the tip they were made at.
    pub fn observe_tip(&self, tip: BlockId) {
        let mut current = self.tip.write();
        if *current != tip {
            *current = tip;
            let cleared = self.entries.len();
            self.entries.clear();
            debug!(cleared, tip = %tip, "reject filter reset on tip change");
        }
    }

    /// Drop expired entries.
    pub fn cleanup(&self) {
        self.entries
            .retain(|_, entry| entry.added_at.elapsed() < self.ttl);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RecentRejects {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(n: u8) -> TxId {
        TxId([n; 32])
    }

    #[test]
    fn test_insert_and_lookup() {
        let rejects = RecentRejects::with_defaults();
        assert!(!rejects.contains(&txid(1)));

        rejects.insert(txid(1), RejectReason::Duplicate);
        assert!(rejects.contains(&txid(1)));
        assert_eq!(rejects.rejection(&txid(1)), Some(RejectReason::Duplicate));
    }

    #[test]
    fn test_expiration() {
        let rejects = RecentRejects::new(100, Duration::from_millis(10));
        rejects.insert(txid(1), RejectReason::MissingInputs);
        assert!(rejects.contains(&txid(1)));

        std::thread::sleep(Duration::from_millis(20));
        assert!(!rejects.contains(&txid(1)));
    }

    #[test]
    fn test_tip_change_resets() {
        let rejects = RecentRejects::with_defaults();
        rejects.observe_tip(BlockId([1; 32]));
        rejects.insert(txid(1), RejectReason::Duplicate);
        rejects.insert(txid(2), RejectReason::MissingInputs);

        // Same tip: nothing happens.
        rejects.observe_tip(BlockId([1; 32]));
        assert_eq!(rejects.len(), 2);

        // New tip: wholesale reset.
        rejects.observe_tip(BlockId([2; 32]));
        assert!(rejects.is_empty());
    }

    #[test]
    fn test_capacity_sweep() {
        let rejects = RecentRejects::new(4, Duration::from_millis(5));
        for n in 0..4 {
            rejects.insert(txid(n), RejectReason::Duplicate);
        }
        std::thread::sleep(Duration::from_millis(10));

        // At capacity the next insert sweeps the expired entries out.
        rejects.insert(txid(9), RejectReason::Duplicate);
        assert_eq!(rejects.len(), 1);
        assert!(rejects.contains(&txid(9)));
    }
}
