//! Pool entry accounting.

use kestrel_chain_types::{cmp_feerate, Transaction, TxId};
use std::cmp::Ordering;
use std::sync::Arc;

/// Fixed per-entry overhead charged on top of the serialized size when
/// accounting pool memory (map slots, adjacency, index keys).
pub(crate) const ENTRY_OVERHEAD_BYTES: u64 = 320;

/// Cached lock-time constraints of an entry.
///
/// Valid only while the chain that computed them remains active; a
/// reorg below `max_input_height` invalidates the cache and the entry
/// is re-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockPoints {
    /// Tip height when the entry was admitted.
    pub height: u32,
    /// Wall-clock time used for time locks, unix seconds.
    pub time: i64,
    /// Height of the highest block contributing an input coin.
    pub max_input_height: u32,
}

impl LockPoints {
    /// Whether the cached constraints still hold on a chain whose tip
    /// is `tip_height`.
    pub fn is_valid_at(&self, tip_height: u32) -> bool {
        self.max_input_height <= tip_height
    }
}

/// One pool-resident transaction with its fee accounting state.
///
/// The ancestor/descendant aggregates are self-inclusive (count is
/// never below 1) and are maintained incrementally by the pool; they
/// are recomputed from scratch only at insertion.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    tx: Arc<Transaction>,
    txid: TxId,
    fee: u64,
    size: u64,
    entry_time: u64,
    entry_height: u32,
    spends_coinbase: bool,
    sig_op_cost: u64,
    fee_delta: i64,
    lock_points: LockPoints,

    // Descendant aggregates, this entry included.
    pub(crate) count_with_descendants: u64,
    pub(crate) size_with_descendants: u64,
    pub(crate) fees_with_descendants: i64,

    // Ancestor aggregates, this entry included.
    pub(crate) count_with_ancestors: u64,
    pub(crate) size_with_ancestors: u64,
    pub(crate) fees_with_ancestors: i64,
    pub(crate) sig_ops_with_ancestors: u64,
}

impl MempoolEntry {
    /// Create an entry whose aggregates cover only itself. The pool
    /// widens them to the real ancestor package during insertion.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tx: Arc<Transaction>,
        fee: u64,
        entry_time: u64,
        entry_height: u32,
        spends_coinbase: bool,
        fee_delta: i64,
        lock_points: LockPoints,
    ) -> Self {
        let txid = tx.id();
        let size = tx.size();
        let sig_op_cost = tx.sig_op_cost();
        let modified = fee as i64 + fee_delta;
        Self {
            tx,
            txid,
            fee,
            size,
            entry_time,
            entry_height,
            spends_coinbase,
            sig_op_cost,
            fee_delta,
            lock_points,
            count_with_descendants: 1,
            size_with_descendants: size,
            fees_with_descendants: modified,
            count_with_ancestors: 1,
            size_with_ancestors: size,
            fees_with_ancestors: modified,
            sig_ops_with_ancestors: sig_op_cost,
        }
    }

    /// The transaction payload.
    pub fn tx(&self) -> &Arc<Transaction> {
        &self.tx
    }

    /// Transaction identity.
    pub fn txid(&self) -> TxId {
        self.txid
    }

    /// Base fee in satoshis.
    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Admission time, unix seconds.
    pub fn entry_time(&self) -> u64 {
        self.entry_time
    }

    /// Tip height at admission.
    pub fn entry_height(&self) -> u32 {
        self.entry_height
    }

    /// Whether any input spends a coinbase output.
    pub fn spends_coinbase(&self) -> bool {
        self.spends_coinbase
    }

    /// Signature-operation cost of this transaction alone.
    pub fn sig_op_cost(&self) -> u64 {
        self.sig_op_cost
    }

    /// Accumulated priority adjustment.
    pub fn fee_delta(&self) -> i64 {
        self.fee_delta
    }

    /// Cached lock-time constraints.
    pub fn lock_points(&self) -> LockPoints {
        self.lock_points
    }

    /// Fee used for all ranking decisions: base fee plus delta.
    pub fn modified_fee(&self) -> i64 {
        self.fee as i64 + self.fee_delta
    }

    /// Memory charged against the pool ceiling for this entry.
    pub fn dynamic_usage(&self) -> u64 {
        self.size + ENTRY_OVERHEAD_BYTES
    }

    /// The (fee, size) pair ranking this entry in the descendant-score
    /// order: the better of its own feerate and its with-descendants
    /// package feerate, so profitable children lift a cheap parent.
    pub fn descendant_score(&self) -> (i64, u64) {
        let own = (self.modified_fee(), self.size);
        let package = (self.fees_with_descendants, self.size_with_descendants);
        match cmp_feerate(package.0, package.1, own.0, own.1) {
            Ordering::Greater => package,
            _ => own,
        }
    }

    /// Apply a priority delta to this entry's own fee and both
    /// self-inclusive aggregates. Ancestor/descendant propagation is
    /// the pool's job.
    pub(crate) fn bump_fee_delta(&mut self, delta: i64) {
        self.fee_delta += delta;
        self.fees_with_descendants += delta;
        self.fees_with_ancestors += delta;
    }

    /// Number of in-pool descendants, this entry included.
    pub fn count_with_descendants(&self) -> u64 {
        self.count_with_descendants
    }

    /// Combined size of this entry and its descendants.
    pub fn size_with_descendants(&self) -> u64 {
        self.size_with_descendants
    }

    /// Combined modified fees of this entry and its descendants.
    pub fn fees_with_descendants(&self) -> i64 {
        self.fees_with_descendants
    }

    /// Number of in-pool ancestors, this entry included.
    pub fn count_with_ancestors(&self) -> u64 {
        self.count_with_ancestors
    }

    /// Combined size of this entry and its ancestors.
    pub fn size_with_ancestors(&self) -> u64 {
        self.size_with_ancestors
    }

    /// Combined modified fees of this entry and its ancestors.
    pub fn fees_with_ancestors(&self) -> i64 {
        self.fees_with_ancestors
    }

    /// Combined signature-op cost of this entry and its ancestors.
    pub fn sig_ops_with_ancestors(&self) -> u64 {
        self.sig_ops_with_ancestors
    }
}

/// Per-transaction info exposed to relay and RPC collaborators.
#[derive(Debug, Clone)]
pub struct TxMempoolInfo {
    /// The transaction.
    pub tx: Arc<Transaction>,
    /// Admission time, unix seconds.
    pub time: u64,
    /// Base fee in satoshis.
    pub fee: u64,
    /// Serialized size in bytes.
    pub size: u64,
    /// Accumulated priority adjustment.
    pub fee_delta: i64,
}
