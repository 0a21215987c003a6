//! Ranking orders over pool entries.
//!
//! Each order is a `BTreeSet` of small key structs copied out of the
//! entry they rank. Whenever an entry's aggregates change, the pool
//! removes the stale key and inserts a fresh one (re-seat); no order is
//! ever rebuilt wholesale. All comparators are total and deterministic:
//! feerate ties break on entry time or identity, never insertion order,
//! so the orders reproduce across restarts given the same inputs.

use crate::entry::MempoolEntry;
use kestrel_chain_types::{cmp_feerate, TxId};
use std::cmp::Ordering;

/// Eviction order: ascending descendant score, i.e. `iter().next()` is
/// the entry trimming should drop first.
///
/// The score is the better of the entry's own feerate and its
/// with-descendants package feerate. At equal score the newer entry
/// sorts first so eviction sheds fresh spam before settled traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DescendantScoreKey {
    pub fee: i64,
    pub size: u64,
    pub entry_time: u64,
    pub txid: TxId,
}

impl DescendantScoreKey {
    pub fn of(entry: &MempoolEntry) -> Self {
        let (fee, size) = entry.descendant_score();
        Self {
            fee,
            size,
            entry_time: entry.entry_time(),
            txid: entry.txid(),
        }
    }
}

impl Ord for DescendantScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_feerate(self.fee, self.size, other.fee, other.size)
            .then_with(|| other.entry_time.cmp(&self.entry_time))
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for DescendantScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Mining order: `iter().next()` is the best inclusion candidate.
///
/// Plain transfers always rank ahead of execution payloads; gas-bearing
/// transactions can game a pure fee/ancestor heuristic, so among them
/// the order prefers fewer unconfirmed ancestors, then a higher gas
/// price, then smaller size. Plain transfers rank by ancestor-package
/// feerate, so a child never sorts ahead of the package that must carry
/// its parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AncestorScoreKey {
    pub has_contract: bool,
    pub ancestor_fee: i64,
    pub ancestor_size: u64,
    pub ancestor_count: u64,
    pub gas_price: u64,
    pub size: u64,
    pub entry_time: u64,
    pub txid: TxId,
}

impl AncestorScoreKey {
    pub fn of(entry: &MempoolEntry) -> Self {
        Self {
            has_contract: entry.tx().has_contract_payload(),
            ancestor_fee: entry.fees_with_ancestors(),
            ancestor_size: entry.size_with_ancestors(),
            ancestor_count: entry.count_with_ancestors(),
            gas_price: entry.tx().gas_price().unwrap_or(0),
            size: entry.size(),
            entry_time: entry.entry_time(),
            txid: entry.txid(),
        }
    }
}

impl Ord for AncestorScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.has_contract
            .cmp(&other.has_contract)
            .then_with(|| {
                if self.has_contract {
                    self.ancestor_count
                        .cmp(&other.ancestor_count)
                        .then_with(|| other.gas_price.cmp(&self.gas_price))
                        .then_with(|| self.size.cmp(&other.size))
                } else {
                    cmp_feerate(
                        other.ancestor_fee,
                        other.ancestor_size,
                        self.ancestor_fee,
                        self.ancestor_size,
                    )
                    .then_with(|| self.entry_time.cmp(&other.entry_time))
                }
            })
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for AncestorScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Chronological order, oldest first; drives the expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct EntryTimeKey {
    pub entry_time: u64,
    pub txid: TxId,
}

impl EntryTimeKey {
    pub fn of(entry: &MempoolEntry) -> Self {
        Self {
            entry_time: entry.entry_time(),
            txid: entry.txid(),
        }
    }
}

/// Raw feerate order, highest first; diagnostics only, no
/// ancestor/descendant adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawScoreKey {
    pub fee: i64,
    pub size: u64,
    pub txid: TxId,
}

impl RawScoreKey {
    pub fn of(entry: &MempoolEntry) -> Self {
        Self {
            fee: entry.modified_fee(),
            size: entry.size(),
            txid: entry.txid(),
        }
    }
}

impl Ord for RawScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_feerate(other.fee, other.size, self.fee, self.size)
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for RawScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
