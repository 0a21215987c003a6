//! Greedy block template construction.

use crate::{DEFAULT_MAX_BLOCK_BYTES, DEFAULT_MAX_BLOCK_TXS};
use kestrel_chain_types::{Transaction, TxId};
use kestrel_mempool::{Mempool, SnapshotEntry};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Template construction limits.
#[derive(Debug, Clone, Copy)]
pub struct AssemblerConfig {
    /// Maximum combined transaction size.
    pub max_block_bytes: u64,
    /// Maximum transaction count.
    pub max_block_txs: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
            max_block_txs: DEFAULT_MAX_BLOCK_TXS,
        }
    }
}

/// A candidate transaction set for the next block, parents ordered
/// ahead of the children that spend them.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Selected transactions in inclusion order.
    pub txs: Vec<Arc<Transaction>>,
    /// Modified fees of the selection.
    pub total_fees: i64,
    /// Combined serialized size.
    pub total_size: u64,
    /// Pool mutation counter captured at assembly.
    pub pool_updates: u64,
}

/// Builds block templates from the mempool's mining snapshot.
///
/// Receives its pool by handle at construction; nothing here reaches
/// for process-wide state.
pub struct BlockAssembler {
    mempool: Arc<Mempool>,
    config: AssemblerConfig,
    cached: RwLock<Option<BlockTemplate>>,
}

impl BlockAssembler {
    /// Create an assembler over the given pool.
    pub fn new(mempool: Arc<Mempool>, config: AssemblerConfig) -> Self {
        Self {
            mempool,
            config,
            cached: RwLock::new(None),
        }
    }

    /// Whether a previously built template no longer reflects the pool.
    pub fn is_stale(&self, template: &BlockTemplate) -> bool {
        template.pool_updates != self.mempool.transactions_updated()
    }

    /// Return the cached template if still fresh, else rebuild.
    pub fn current(&self) -> BlockTemplate {
        if let Some(cached) = self.cached.read().as_ref() {
            if !self.is_stale(cached) {
                return cached.clone();
            }
        }
        let template = self.assemble();
        *self.cached.write() = Some(template.clone());
        template
    }

    /// Build a template by walking the ancestor-score order greedily.
    ///
    /// An entry whose in-pool parents have not all been selected yet is
    /// parked and retried as soon as its last missing parent lands, so
    /// the output order always satisfies dependencies.
    pub fn assemble(&self) -> BlockTemplate {
        let snapshot = self.mempool.snapshot_for_mining();

        let mut template = BlockTemplate {
            txs: Vec::new(),
            total_fees: 0,
            total_size: 0,
            pool_updates: snapshot.updates,
        };
        let mut included: HashSet<TxId> = HashSet::new();
        let mut waiting: HashMap<TxId, Vec<SnapshotEntry>> = HashMap::new();

        for entry in snapshot.entries {
            self.place(entry, &mut template, &mut included, &mut waiting);
        }

        info!(
            txs = template.txs.len(),
            fees = template.total_fees,
            size = template.total_size,
            "block template assembled"
        );
        template
    }

    fn place(
        &self,
        entry: SnapshotEntry,
        template: &mut BlockTemplate,
        included: &mut HashSet<TxId>,
        waiting: &mut HashMap<TxId, Vec<SnapshotEntry>>,
    ) {
        let mut ready = vec![entry];
        while let Some(entry) = ready.pop() {
            if included.contains(&entry.txid) {
                continue;
            }
            if let Some(missing) = entry
                .parents
                .iter()
                .find(|parent| !included.contains(*parent))
            {
                waiting.entry(*missing).or_default().push(entry);
                continue;
            }
            if template.total_size + entry.size > self.config.max_block_bytes
                || template.txs.len() >= self.config.max_block_txs
            {
                debug!(tx_id = %entry.txid, "entry does not fit template");
                continue;
            }

            template.total_fees += entry.fee;
            template.total_size += entry.size;
            included.insert(entry.txid);
            template.txs.push(entry.tx.clone());

            if let Some(unblocked) = waiting.remove(&entry.txid) {
                ready.extend(unblocked);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_chain_types::{OutPoint, TxInput, TxOutput, TxPayload};
    use kestrel_mempool::AdmissionOptions;
    use kestrel_state::{Coin, MemoryUtxoView};

    fn coin_op(n: u8) -> OutPoint {
        OutPoint::new(TxId([0xAA; 32]), n as u32)
    }

    fn funded_view(coins: &[(u8, u64)]) -> MemoryUtxoView {
        let view = MemoryUtxoView::new();
        for &(n, value) in coins {
            view.add_coin(
                coin_op(n),
                Coin {
                    value,
                    height: 1,
                    is_coinbase: false,
                },
            );
        }
        view.set_tip(100, kestrel_chain_types::BlockId([9; 32]));
        view
    }

    fn transfer(ins: &[OutPoint], outs: &[u64], pad: usize) -> Transaction {
        Transaction {
            version: 1,
            inputs: ins
                .iter()
                .enumerate()
                .map(|(i, prevout)| TxInput {
                    prevout: *prevout,
                    witness: if i == 0 { vec![0; pad] } else { Vec::new() },
                })
                .collect(),
            outputs: outs
                .iter()
                .map(|&value| TxOutput {
                    value,
                    script: vec![0x51],
                })
                .collect(),
            payload: TxPayload::Transfer,
            lock_time: 0,
        }
    }

    fn pool_with(view: &MemoryUtxoView, txs: &[&Transaction]) -> Arc<Mempool> {
        let pool = Arc::new(Mempool::with_defaults());
        for tx in txs {
            pool.try_accept((*tx).clone(), view, AdmissionOptions::default())
                .unwrap();
        }
        pool
    }

    #[test]
    fn test_parents_precede_children() {
        let view = funded_view(&[(1, 1_000_000)]);
        // Low-fee parent, lucrative child: the child's ancestor score
        // cannot pull it ahead of the parent in the final template.
        let parent = transfer(&[coin_op(1)], &[998_000], 0);
        let child = transfer(&[OutPoint::new(parent.id(), 0)], &[900_000], 0);
        let pool = pool_with(&view, &[&parent, &child]);

        let assembler = BlockAssembler::new(pool, AssemblerConfig::default());
        let template = assembler.assemble();

        let order: Vec<TxId> = template.txs.iter().map(|tx| tx.id()).collect();
        let parent_pos = order.iter().position(|id| *id == parent.id()).unwrap();
        let child_pos = order.iter().position(|id| *id == child.id()).unwrap();
        assert!(parent_pos < child_pos);
        assert_eq!(template.txs.len(), 2);
        assert_eq!(template.total_fees, 2_000 + 98_000);
    }

    #[test]
    fn test_respects_size_budget() {
        let view = funded_view(&[(1, 100_000), (2, 100_000)]);
        let big = transfer(&[coin_op(1)], &[10_000], 800);
        let small = transfer(&[coin_op(2)], &[99_000], 0);
        let pool = pool_with(&view, &[&big, &small]);

        let config = AssemblerConfig {
            max_block_bytes: 500,
            ..Default::default()
        };
        let assembler = BlockAssembler::new(pool, config);
        let template = assembler.assemble();

        // The big transaction pays the better rate but cannot fit;
        // only the small one is selected.
        assert!(template.total_size <= 500);
        let ids: Vec<TxId> = template.txs.iter().map(|tx| tx.id()).collect();
        assert_eq!(ids, vec![small.id()]);
    }

    #[test]
    fn test_cached_template_invalidates_on_pool_change() {
        let view = funded_view(&[(1, 100_000), (2, 100_000)]);
        let first = transfer(&[coin_op(1)], &[95_000], 0);
        let pool = pool_with(&view, &[&first]);

        let assembler = BlockAssembler::new(pool.clone(), AssemblerConfig::default());
        let template = assembler.current();
        assert_eq!(template.txs.len(), 1);
        assert!(!assembler.is_stale(&template));

        let second = transfer(&[coin_op(2)], &[95_000], 0);
        pool.try_accept(second, &view, AdmissionOptions::default())
            .unwrap();
        assert!(assembler.is_stale(&template));
        assert_eq!(assembler.current().txs.len(), 2);
    }
}
