//! Replay queue for transactions displaced by a reorganization.
//!
//! While blocks are being disconnected their transactions accumulate
//! here in chain order; once the new chain connects, the queue is
//! drained in that same order and each transaction re-runs full
//! admission. The queue must be empty whenever the node is back to
//! normal tip-following; a populated queue at teardown means a reorg
//! was left half-handled, which is a logic defect, not a runtime
//! condition.

use crate::DEFAULT_MAX_DISCONNECTED_BYTES;
use kestrel_chain_types::{Transaction, TxId};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Per-queued-transaction bookkeeping overhead in bytes.
const QUEUE_OVERHEAD_BYTES: u64 = 96;

/// Ordered, uniquely-keyed queue of disconnected-block transactions.
pub struct DisconnectedBlockTransactions {
    queue: VecDeque<Arc<Transaction>>,
    ids: HashSet<TxId>,
    usage_bytes: u64,
    max_bytes: u64,
}

impl DisconnectedBlockTransactions {
    /// Create a queue with the given memory cap.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            queue: VecDeque::new(),
            ids: HashSet::new(),
            usage_bytes: 0,
            max_bytes,
        }
    }

    /// Create a queue with the default memory cap.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_DISCONNECTED_BYTES)
    }

    /// Append a transaction from a disconnected block, preserving chain
    /// order. Duplicates are ignored. When the cap is exceeded the
    /// oldest queued transactions are dropped; they simply will not be
    /// resubmitted.
    pub fn add_transaction(&mut self, tx: Arc<Transaction>) {
        let txid = tx.id();
        if !self.ids.insert(txid) {
            return;
        }
        self.usage_bytes += tx.size() + QUEUE_OVERHEAD_BYTES;
        self.queue.push_back(tx);

        while self.usage_bytes > self.max_bytes {
            let Some(dropped) = self.queue.pop_front() else {
                break;
            };
            self.ids.remove(&dropped.id());
            self.usage_bytes -= dropped.size() + QUEUE_OVERHEAD_BYTES;
            warn!(tx_id = %dropped.id(), "disconnect queue over budget, dropping oldest");
        }
    }

    /// Remove queued transactions that a newly connected block
    /// confirmed. No-op on an empty queue, which is the common case
    /// during normal tip-following.
    pub fn remove_for_block(&mut self, block_txs: &[Arc<Transaction>]) {
        if self.queue.is_empty() {
            return;
        }
        let confirmed: HashSet<TxId> = block_txs.iter().map(|tx| tx.id()).collect();
        let mut kept = VecDeque::with_capacity(self.queue.len());
        for tx in self.queue.drain(..) {
            let txid = tx.id();
            if confirmed.contains(&txid) {
                self.ids.remove(&txid);
                self.usage_bytes -= tx.size() + QUEUE_OVERHEAD_BYTES;
            } else {
                kept.push_back(tx);
            }
        }
        self.queue = kept;
    }

    /// Take every queued transaction in original chain order, leaving
    /// the queue empty. Callers feed these back through admission.
    pub fn drain(&mut self) -> Vec<Arc<Transaction>> {
        self.ids.clear();
        self.usage_bytes = 0;
        let drained: Vec<_> = self.queue.drain(..).collect();
        debug!(count = drained.len(), "disconnect queue drained");
        drained
    }

    /// Forcibly empty the queue. Only for aborting a reorg that cannot
    /// be completed.
    pub fn clear(&mut self) {
        if !self.queue.is_empty() {
            warn!(count = self.queue.len(), "disconnect queue force-cleared");
        }
        self.queue.clear();
        self.ids.clear();
        self.usage_bytes = 0;
    }

    /// Approximate memory held by queued transactions.
    pub fn queued_dynamic_usage(&self) -> u64 {
        self.usage_bytes
    }

    /// Number of queued transactions.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for DisconnectedBlockTransactions {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Drop for DisconnectedBlockTransactions {
    fn drop(&mut self) {
        if !self.queue.is_empty() {
            error!(
                count = self.queue.len(),
                "disconnect queue dropped non-empty; reorg left unhandled"
            );
            debug_assert!(self.queue.is_empty(), "disconnect queue dropped non-empty");
        }
    }
}
