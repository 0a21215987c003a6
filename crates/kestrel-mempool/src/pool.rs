//! The transaction pool store.
//!
//! One `parking_lot::RwLock` guards the entire store: entry map, spend
//! index, parent/child adjacency, all four ranking orders, and the
//! usage/fee-floor counters. Graph walks are bounded by the configured
//! package limits, which bounds lock-hold time. Lock order is
//! chain-state before pool: code holding the pool lock may read a
//! `CoinView` (those reads never block), never the reverse.

use crate::config::MempoolConfig;
use crate::entry::{MempoolEntry, TxMempoolInfo};
use crate::error::PackageLimitKind;
use crate::ordering::{AncestorScoreKey, DescendantScoreKey, EntryTimeKey, RawScoreKey};
use kestrel_chain_types::{FeeRate, OutPoint, Transaction, TxId, COINBASE_MATURITY};
use kestrel_state::CoinView;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};

/// Lock-time values below this are block heights, above it unix times.
const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Why an entry left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Confirmed in a connected block.
    Block,
    /// A connected block spent one of its inputs through another
    /// transaction.
    Conflict,
    /// Evicted by the size ceiling.
    SizeLimit,
    /// Older than the expiry window.
    Expiry,
    /// Replaced by a higher-fee conflicting transaction.
    Replaced,
    /// Invalidated by a chain reorganization.
    Reorg,
}

/// Receives pool lifecycle notifications (fee estimation hooks).
///
/// Callbacks run outside the pool lock and must not call back into it.
pub trait MempoolObserver: Send + Sync {
    /// Transactions removed because a block confirmed them.
    fn transactions_confirmed(&self, _txids: &[TxId]) {}

    /// A transaction dropped unconfirmed.
    fn transaction_removed(&self, _txid: &TxId, _reason: RemovalReason) {}
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Default)]
pub struct MempoolStats {
    /// Number of entries.
    pub tx_count: usize,
    /// Sum of serialized transaction sizes.
    pub total_tx_bytes: u64,
    /// Dynamic memory usage charged against the ceiling.
    pub usage_bytes: u64,
    /// Current minimum feerate floor.
    pub min_feerate: FeeRate,
    /// Mutation counter (see [`Mempool::transactions_updated`]).
    pub transactions_updated: u64,
}

/// One entry in a mining snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    /// Transaction identity.
    pub txid: TxId,
    /// The transaction.
    pub tx: Arc<Transaction>,
    /// Modified fee (base fee plus priority delta).
    pub fee: i64,
    /// Serialized size in bytes.
    pub size: u64,
    /// Direct in-pool parents at snapshot time.
    pub parents: Vec<TxId>,
}

/// Entries in ancestor-score order plus the staleness counter captured
/// with them.
#[derive(Debug, Clone)]
pub struct MiningSnapshot {
    /// Entries, best inclusion candidate first.
    pub entries: Vec<SnapshotEntry>,
    /// Value of the transactions-updated counter at capture.
    pub updates: u64,
}

pub(crate) struct PoolInner {
    pub(crate) entries: HashMap<TxId, MempoolEntry>,
    /// Input outpoint -> spending pool transaction.
    pub(crate) spends: HashMap<OutPoint, TxId>,
    /// Direct in-pool parents of each entry.
    pub(crate) parents: HashMap<TxId, BTreeSet<TxId>>,
    /// Direct in-pool children of each entry.
    pub(crate) children: HashMap<TxId, BTreeSet<TxId>>,

    pub(crate) by_descendant_score: BTreeSet<DescendantScoreKey>,
    pub(crate) by_ancestor_score: BTreeSet<AncestorScoreKey>,
    pub(crate) by_entry_time: BTreeSet<EntryTimeKey>,
    pub(crate) by_raw_score: BTreeSet<RawScoreKey>,

    /// Priority deltas, including ones for transactions not in the pool.
    pub(crate) deltas: HashMap<TxId, i64>,

    pub(crate) usage_bytes: u64,
    pub(crate) total_tx_bytes: u64,
    pub(crate) transactions_updated: u64,

    /// Rolling feerate floor in sat/kB; decays while blocks arrive
    /// without further evictions.
    rolling_fee_per_kb: f64,
    last_rolling_fee_update: u64,
    block_since_last_rolling_fee_bump: bool,
}

/// In-pool ancestor package of an admission candidate, computed before
/// any mutation so rejection stays side-effect-free.
pub(crate) struct AncestorInfo {
    /// All in-pool ancestors (candidate excluded).
    pub set: HashSet<TxId>,
    /// Ancestors the candidate spends directly.
    pub direct_parents: BTreeSet<TxId>,
    /// Package size, candidate included.
    pub total_size: u64,
    /// Package modified fees, candidate included.
    pub total_fees: i64,
    /// Package count, candidate included.
    pub total_count: u64,
    /// Package signature-op cost, candidate included.
    pub total_sig_ops: u64,
}

impl PoolInner {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            spends: HashMap::new(),
            parents: HashMap::new(),
            children: HashMap::new(),
            by_descendant_score: BTreeSet::new(),
            by_ancestor_score: BTreeSet::new(),
            by_entry_time: BTreeSet::new(),
            by_raw_score: BTreeSet::new(),
            deltas: HashMap::new(),
            usage_bytes: 0,
            total_tx_bytes: 0,
            transactions_updated: 0,
            rolling_fee_per_kb: 0.0,
            last_rolling_fee_update: 0,
            block_since_last_rolling_fee_bump: false,
        }
    }

    /// Walk the parent adjacency from `direct_parents`, accumulating
    /// the candidate's ancestor package and short-circuiting on the
    /// first exceeded limit.
    ///
    /// Terminates because the pool graph is a DAG: a transaction cannot
    /// spend an output it has not created yet, so no entry is its own
    /// ancestor.
    pub(crate) fn compute_ancestors(
        &self,
        direct_parents: &BTreeSet<TxId>,
        candidate_size: u64,
        candidate_fee: i64,
        candidate_sig_ops: u64,
        config: &MempoolConfig,
    ) -> Result<AncestorInfo, PackageLimitKind> {
        let mut info = AncestorInfo {
            set: HashSet::new(),
            direct_parents: direct_parents.clone(),
            total_size: candidate_size,
            total_fees: candidate_fee,
            total_count: 1,
            total_sig_ops: candidate_sig_ops,
        };

        let mut queue: VecDeque<TxId> = direct_parents.iter().copied().collect();
        while let Some(txid) = queue.pop_front() {
            if !info.set.insert(txid) {
                continue;
            }
            let entry = match self.entries.get(&txid) {
                Some(e) => e,
                None => continue,
            };

            info.total_count += 1;
            info.total_size += entry.size();
            info.total_fees += entry.modified_fee();
            info.total_sig_ops += entry.sig_op_cost();

            if info.total_count > config.ancestor_count_limit {
                return Err(PackageLimitKind::AncestorCount {
                    limit: config.ancestor_count_limit,
                });
            }
            if info.total_size > config.ancestor_size_limit {
                return Err(PackageLimitKind::AncestorSize {
                    size: info.total_size,
                    limit: config.ancestor_size_limit,
                });
            }
            if entry.count_with_descendants() + 1 > config.descendant_count_limit {
                return Err(PackageLimitKind::DescendantCount {
                    ancestor: txid,
                    limit: config.descendant_count_limit,
                });
            }
            if entry.size_with_descendants() + candidate_size > config.descendant_size_limit {
                return Err(PackageLimitKind::DescendantSize {
                    ancestor: txid,
                    limit: config.descendant_size_limit,
                });
            }

            if let Some(parents) = self.parents.get(&txid) {
                queue.extend(parents.iter().copied());
            }
        }

        Ok(info)
    }

    /// All in-pool ancestors of an existing entry, the entry excluded.
    pub(crate) fn calc_ancestors(&self, txid: &TxId) -> HashSet<TxId> {
        self.walk(txid, &self.parents)
    }

    /// All in-pool descendants of an existing entry, the entry excluded.
    pub(crate) fn calc_descendants(&self, txid: &TxId) -> HashSet<TxId> {
        self.walk(txid, &self.children)
    }

    fn walk(&self, start: &TxId, adjacency: &HashMap<TxId, BTreeSet<TxId>>) -> HashSet<TxId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<TxId> = adjacency
            .get(start)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        while let Some(txid) = queue.pop_front() {
            if seen.insert(txid) {
                if let Some(next) = adjacency.get(&txid) {
                    queue.extend(next.iter().copied());
                }
            }
        }
        seen
    }

    /// Seeds plus their full descendant closure.
    pub(crate) fn closure_with_descendants(
        &self,
        seeds: impl IntoIterator<Item = TxId>,
    ) -> HashSet<TxId> {
        let mut stage = HashSet::new();
        for seed in seeds {
            if self.entries.contains_key(&seed) && stage.insert(seed) {
                stage.extend(self.calc_descendants(&seed));
            }
        }
        stage
    }

    fn bump_descendant_aggregates(&mut self, txid: &TxId, count: i64, size: i64, fees: i64) {
        let (old_key, new_key) = {
            let entry = self
                .entries
                .get_mut(txid)
                .expect("aggregate update target present");
            let old = DescendantScoreKey::of(entry);
            entry.count_with_descendants = (entry.count_with_descendants as i64 + count) as u64;
            entry.size_with_descendants = (entry.size_with_descendants as i64 + size) as u64;
            entry.fees_with_descendants += fees;
            (old, DescendantScoreKey::of(entry))
        };
        self.by_descendant_score.remove(&old_key);
        self.by_descendant_score.insert(new_key);
    }

    fn bump_ancestor_aggregates(
        &mut self,
        txid: &TxId,
        count: i64,
        size: i64,
        fees: i64,
        sig_ops: i64,
    ) {
        let (old_key, new_key) = {
            let entry = self
                .entries
                .get_mut(txid)
                .expect("aggregate update target present");
            let old = AncestorScoreKey::of(entry);
            entry.count_with_ancestors = (entry.count_with_ancestors as i64 + count) as u64;
            entry.size_with_ancestors = (entry.size_with_ancestors as i64 + size) as u64;
            entry.fees_with_ancestors += fees;
            entry.sig_ops_with_ancestors = (entry.sig_ops_with_ancestors as i64 + sig_ops) as u64;
            (old, AncestorScoreKey::of(entry))
        };
        self.by_ancestor_score.remove(&old_key);
        self.by_ancestor_score.insert(new_key);
    }

    /// Insert a fully-checked entry and propagate its contribution to
    /// every existing ancestor in a single pass.
    pub(crate) fn insert_entry(&mut self, mut entry: MempoolEntry, ancestors: AncestorInfo) {
        let txid = entry.txid();

        entry.count_with_ancestors = ancestors.total_count;
        entry.size_with_ancestors = ancestors.total_size;
        entry.fees_with_ancestors = ancestors.total_fees;
        entry.sig_ops_with_ancestors = ancestors.total_sig_ops;

        for input in &entry.tx().inputs {
            self.spends.insert(input.prevout, txid);
        }
        for parent in &ancestors.direct_parents {
            self.children.entry(*parent).or_default().insert(txid);
        }
        self.parents.insert(txid, ancestors.direct_parents);

        let size = entry.size() as i64;
        let fee = entry.modified_fee();
        for ancestor in &ancestors.set {
            self.bump_descendant_aggregates(ancestor, 1, size, fee);
        }

        self.by_descendant_score.insert(DescendantScoreKey::of(&entry));
        self.by_ancestor_score.insert(AncestorScoreKey::of(&entry));
        self.by_entry_time.insert(EntryTimeKey::of(&entry));
        self.by_raw_score.insert(RawScoreKey::of(&entry));

        self.usage_bytes += entry.dynamic_usage();
        self.total_tx_bytes += entry.size();
        self.transactions_updated += 1;
        self.entries.insert(txid, entry);
    }

    /// Remove a closed set of entries, fixing up the aggregates of
    /// everything that stays.
    ///
    /// `update_descendants` is set for block-confirmation removals,
    /// where children legitimately survive their removed parent and
    /// must shed its ancestor contribution. Cascade removals pass a
    /// descendant-closed `stage`, so surviving descendants cannot
    /// exist and the pass is skipped.
    pub(crate) fn remove_staged(&mut self, stage: &HashSet<TxId>, update_descendants: bool) {
        if update_descendants {
            for txid in stage {
                let Some(entry) = self.entries.get(txid) else {
                    continue;
                };
                let (size, fee, sig_ops) =
                    (entry.size() as i64, entry.modified_fee(), entry.sig_op_cost() as i64);
                for descendant in self.calc_descendants(txid) {
                    if !stage.contains(&descendant) {
                        self.bump_ancestor_aggregates(&descendant, -1, -size, -fee, -sig_ops);
                    }
                }
            }
        }

        for txid in stage {
            let Some(entry) = self.entries.get(txid) else {
                continue;
            };
            let (size, fee) = (entry.size() as i64, entry.modified_fee());
            for ancestor in self.calc_ancestors(txid) {
                if !stage.contains(&ancestor) {
                    self.bump_descendant_aggregates(&ancestor, -1, -size, -fee);
                }
            }
        }

        for txid in stage {
            self.delete_entry(txid);
        }
    }

    fn delete_entry(&mut self, txid: &TxId) {
        let Some(entry) = self.entries.remove(txid) else {
            return;
        };

        self.by_descendant_score.remove(&DescendantScoreKey::of(&entry));
        self.by_ancestor_score.remove(&AncestorScoreKey::of(&entry));
        self.by_entry_time.remove(&EntryTimeKey::of(&entry));
        self.by_raw_score.remove(&RawScoreKey::of(&entry));

        for input in &entry.tx().inputs {
            self.spends.remove(&input.prevout);
        }
        if let Some(parents) = self.parents.remove(txid) {
            for parent in parents {
                if let Some(children) = self.children.get_mut(&parent) {
                    children.remove(txid);
                }
            }
        }
        if let Some(children) = self.children.remove(txid) {
            for child in children {
                if let Some(parents) = self.parents.get_mut(&child) {
                    parents.remove(txid);
                }
            }
        }

        self.usage_bytes -= entry.dynamic_usage();
        self.total_tx_bytes -= entry.size();
        self.transactions_updated += 1;
    }

    /// Raise the rolling floor after evicting a package at `rate`.
    fn track_package_removed(&mut self, rate: FeeRate, incremental: FeeRate, now: u64) {
        let bumped = (rate.sat_per_kb() + incremental.sat_per_kb()) as f64;
        if bumped > self.rolling_fee_per_kb {
            self.rolling_fee_per_kb = bumped;
            self.block_since_last_rolling_fee_bump = false;
            self.last_rolling_fee_update = now;
        }
    }

    /// Current feerate floor, decaying the rolling component first.
    ///
    /// The rolling floor halves every configured halflife once a block
    /// has arrived since the last bump, and snaps to zero below a
    /// quarter of the incremental step so a quiet pool eventually
    /// accepts minimum-relay traffic again.
    pub(crate) fn min_feerate_at(&mut self, now: u64, config: &MempoolConfig) -> FeeRate {
        if self.rolling_fee_per_kb > 0.0 && self.block_since_last_rolling_fee_bump {
            let elapsed = now.saturating_sub(self.last_rolling_fee_update);
            if elapsed > 0 {
                let halflife = config.rolling_fee_halflife_secs.max(1) as f64;
                self.rolling_fee_per_kb /= 2f64.powf(elapsed as f64 / halflife);
                self.last_rolling_fee_update = now;
                if self.rolling_fee_per_kb
                    < config.incremental_feerate.sat_per_kb() as f64 / 4.0
                {
                    self.rolling_fee_per_kb = 0.0;
                }
            }
        }
        FeeRate::from_sat_per_kb(
            (self.rolling_fee_per_kb as u64).max(config.min_relay_feerate.sat_per_kb()),
        )
    }
}

/// The Kestrel transaction mempool.
///
/// Explicitly constructed and shared by handle; collaborators receive
/// an `Arc<Mempool>` at node startup rather than reaching for a global.
pub struct Mempool {
    pub(crate) inner: RwLock<PoolInner>,
    pub(crate) config: MempoolConfig,
    observer: RwLock<Option<Arc<dyn MempoolObserver>>>,
}

impl Mempool {
    /// Create a pool with the given configuration.
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            inner: RwLock::new(PoolInner::new()),
            config,
            observer: RwLock::new(None),
        }
    }

    /// Create a pool with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MempoolConfig::default())
    }

    /// The active configuration.
    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    /// Attach the fee-estimator notification hook.
    pub fn set_observer(&self, observer: Arc<dyn MempoolObserver>) {
        *self.observer.write() = Some(observer);
    }

    pub(crate) fn notify_removed(&self, txids: &[TxId], reason: RemovalReason) {
        if txids.is_empty() {
            return;
        }
        if let Some(observer) = self.observer.read().clone() {
            match reason {
                RemovalReason::Block => observer.transactions_confirmed(txids),
                _ => {
                    for txid in txids {
                        observer.transaction_removed(txid, reason);
                    }
                }
            }
        }
    }

    /// Whether a transaction is in the pool.
    pub fn contains(&self, txid: &TxId) -> bool {
        self.inner.read().entries.contains_key(txid)
    }

    /// Fetch a pool transaction.
    pub fn get(&self, txid: &TxId) -> Option<Arc<Transaction>> {
        self.inner.read().entries.get(txid).map(|e| e.tx().clone())
    }

    /// Relay-facing info for one pool transaction.
    pub fn info(&self, txid: &TxId) -> Option<TxMempoolInfo> {
        self.inner.read().entries.get(txid).map(|e| TxMempoolInfo {
            tx: e.tx().clone(),
            time: e.entry_time(),
            fee: e.fee(),
            size: e.size(),
            fee_delta: e.fee_delta(),
        })
    }

    /// The transaction spending `outpoint`, if any.
    pub fn spender_of(&self, outpoint: &OutPoint) -> Option<TxId> {
        self.inner.read().spends.get(outpoint).copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Mutation counter; block assemblers compare it against the value
    /// captured in their snapshot to detect staleness.
    pub fn transactions_updated(&self) -> u64 {
        self.inner.read().transactions_updated
    }

    /// Current feerate floor (rolling floor after decay, never below
    /// the static relay minimum).
    pub fn min_feerate(&self) -> FeeRate {
        self.inner.write().min_feerate_at(unix_now(), &self.config)
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> MempoolStats {
        let mut inner = self.inner.write();
        let min_feerate = inner.min_feerate_at(unix_now(), &self.config);
        MempoolStats {
            tx_count: inner.entries.len(),
            total_tx_bytes: inner.total_tx_bytes,
            usage_bytes: inner.usage_bytes,
            min_feerate,
            transactions_updated: inner.transactions_updated,
        }
    }

    /// Adjust a transaction's priority by `delta` satoshis.
    ///
    /// The delta is remembered for absent transactions and applied on
    /// admission; for resident entries it propagates to every ancestor's
    /// descendant fees and every descendant's ancestor fees.
    #[instrument(skip(self, txid), fields(tx_id = %txid))]
    pub fn prioritise(&self, txid: TxId, delta: i64) {
        let mut inner = self.inner.write();

        let accumulated = {
            let slot = inner.deltas.entry(txid).or_insert(0);
            *slot += delta;
            *slot
        };
        if accumulated == 0 {
            inner.deltas.remove(&txid);
        }

        if inner.entries.contains_key(&txid) {
            let (old_desc, old_anc, old_raw, new_desc, new_anc, new_raw) = {
                let entry = inner.entries.get_mut(&txid).unwrap();
                let old = (
                    DescendantScoreKey::of(entry),
                    AncestorScoreKey::of(entry),
                    RawScoreKey::of(entry),
                );
                entry.bump_fee_delta(delta);
                let new = (
                    DescendantScoreKey::of(entry),
                    AncestorScoreKey::of(entry),
                    RawScoreKey::of(entry),
                );
                (old.0, old.1, old.2, new.0, new.1, new.2)
            };
            inner.by_descendant_score.remove(&old_desc);
            inner.by_descendant_score.insert(new_desc);
            inner.by_ancestor_score.remove(&old_anc);
            inner.by_ancestor_score.insert(new_anc);
            inner.by_raw_score.remove(&old_raw);
            inner.by_raw_score.insert(new_raw);

            for ancestor in inner.calc_ancestors(&txid) {
                inner.bump_descendant_aggregates(&ancestor, 0, 0, delta);
            }
            for descendant in inner.calc_descendants(&txid) {
                inner.bump_ancestor_aggregates(&descendant, 0, 0, delta, 0);
            }
            inner.transactions_updated += 1;
        }

        info!(delta, accumulated, "transaction priority adjusted");
    }

    /// Remove everything a newly connected block settles: confirmed
    /// transactions (their children stay, shedding the parent's
    /// ancestor contribution) and whole conflict cascades. Returns the
    /// number of entries removed.
    #[instrument(skip(self, block_txs), fields(txs = block_txs.len()))]
    pub fn remove_for_block(&self, block_txs: &[Arc<Transaction>], height: u32) -> usize {
        let mut confirmed = Vec::new();
        let mut conflicted = Vec::new();
        {
            let mut inner = self.inner.write();
            for tx in block_txs {
                let txid = tx.id();
                if inner.entries.contains_key(&txid) {
                    let stage: HashSet<TxId> = std::iter::once(txid).collect();
                    inner.remove_staged(&stage, true);
                    confirmed.push(txid);
                } else {
                    // Not ours, but it may spend outpoints our entries
                    // also spend; those entries are now conflicted.
                    for input in &tx.inputs {
                        if let Some(&spender) = inner.spends.get(&input.prevout) {
                            conflicted.push(spender);
                        }
                    }
                }
                inner.deltas.remove(&txid);
            }

            let stage = inner.closure_with_descendants(conflicted.clone());
            conflicted = stage.iter().copied().collect();
            inner.remove_staged(&stage, false);

            inner.block_since_last_rolling_fee_bump = true;
        }

        debug!(
            confirmed = confirmed.len(),
            conflicted = conflicted.len(),
            "block processed against mempool"
        );
        self.notify_removed(&confirmed, RemovalReason::Block);
        self.notify_removed(&conflicted, RemovalReason::Conflict);
        confirmed.len() + conflicted.len()
    }

    /// After a reorganization settled on a new (lower or diverged)
    /// tip, drop entries whose cached assumptions no longer hold:
    /// immature coinbase spends, inputs that vanished from both chain
    /// and pool, and stale lock points. Cascades to descendants.
    #[instrument(skip(self, view))]
    pub fn remove_for_reorg(&self, view: &dyn CoinView) -> usize {
        let tip_height = view.active_height();
        let removed: Vec<TxId>;
        {
            let mut inner = self.inner.write();
            let mut violators = Vec::new();
            for (txid, entry) in &inner.entries {
                let lock_time = entry.tx().lock_time;
                let height_locked =
                    lock_time < LOCKTIME_THRESHOLD && tip_height < lock_time;
                if !entry.lock_points().is_valid_at(tip_height) || height_locked {
                    violators.push(*txid);
                    continue;
                }
                for input in &entry.tx().inputs {
                    if inner.entries.contains_key(&input.prevout.txid) {
                        continue;
                    }
                    match view.coin(&input.prevout) {
                        Some(coin) => {
                            if coin.is_coinbase
                                && coin.height + COINBASE_MATURITY > tip_height
                            {
                                violators.push(*txid);
                                break;
                            }
                        }
                        None => {
                            violators.push(*txid);
                            break;
                        }
                    }
                }
            }

            let stage = inner.closure_with_descendants(violators);
            removed = stage.iter().copied().collect();
            inner.remove_staged(&stage, false);
        }

        if !removed.is_empty() {
            warn!(count = removed.len(), "entries invalidated by reorg");
        }
        self.notify_removed(&removed, RemovalReason::Reorg);
        removed.len()
    }

    /// Evict worst-ranked descendant-score cascades until dynamic usage
    /// fits `max_bytes`, bumping the rolling fee floor past each evicted
    /// package. Returns the evicted identities.
    #[instrument(skip(self))]
    pub fn trim_to_size(&self, max_bytes: u64) -> Vec<TxId> {
        let now = unix_now();
        let mut evicted = Vec::new();
        {
            let mut inner = self.inner.write();
            while inner.usage_bytes > max_bytes {
                let Some(worst) = inner.by_descendant_score.iter().next().cloned() else {
                    break;
                };
                let package_rate =
                    FeeRate::from_fee_size(worst.fee.max(0) as u64, worst.size);
                inner.track_package_removed(package_rate, self.config.incremental_feerate, now);

                let stage = inner.closure_with_descendants(std::iter::once(worst.txid));
                evicted.extend(stage.iter().copied());
                inner.remove_staged(&stage, false);
            }
        }

        if !evicted.is_empty() {
            warn!(count = evicted.len(), "evicted low-feerate entries");
        }
        self.notify_removed(&evicted, RemovalReason::SizeLimit);
        evicted
    }

    /// Trim to the configured ceiling.
    pub fn trim(&self) -> Vec<TxId> {
        self.trim_to_size(self.config.max_pool_bytes)
    }

    /// Remove entries admitted before `now - expiry`, cascading to
    /// their descendants. Returns the number removed.
    pub fn expire_at(&self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.config.expiry_secs);
        let removed: Vec<TxId>;
        {
            let mut inner = self.inner.write();
            let seeds: Vec<TxId> = inner
                .by_entry_time
                .iter()
                .take_while(|key| key.entry_time < cutoff)
                .map(|key| key.txid)
                .collect();
            let stage = inner.closure_with_descendants(seeds);
            removed = stage.iter().copied().collect();
            inner.remove_staged(&stage, false);
        }

        if !removed.is_empty() {
            info!(count = removed.len(), "expired stale entries");
        }
        self.notify_removed(&removed, RemovalReason::Expiry);
        removed.len()
    }

    /// Remove entries older than the configured expiry window.
    pub fn expire(&self) -> usize {
        self.expire_at(unix_now())
    }

    /// Capture entries in ancestor-score order for block assembly.
    pub fn snapshot_for_mining(&self) -> MiningSnapshot {
        let inner = self.inner.read();
        let entries = inner
            .by_ancestor_score
            .iter()
            .map(|key| {
                let entry = &inner.entries[&key.txid];
                SnapshotEntry {
                    txid: key.txid,
                    tx: entry.tx().clone(),
                    fee: entry.modified_fee(),
                    size: entry.size(),
                    parents: inner
                        .parents
                        .get(&key.txid)
                        .map(|p| p.iter().copied().collect())
                        .unwrap_or_default(),
                }
            })
            .collect();
        MiningSnapshot {
            entries,
            updates: inner.transactions_updated,
        }
    }

    /// Entries ordered parents-first (ascending ancestor count) for the
    /// persistence dump, so a sequential reload re-admits parents before
    /// the children that spend them.
    pub fn entries_for_dump(&self) -> Vec<(Arc<Transaction>, u64, i64)> {
        let inner = self.inner.read();
        let mut entries: Vec<&MempoolEntry> = inner.entries.values().collect();
        entries.sort_by(|a, b| {
            a.count_with_ancestors()
                .cmp(&b.count_with_ancestors())
                .then_with(|| a.entry_time().cmp(&b.entry_time()))
                .then_with(|| a.txid().cmp(&b.txid()))
        });
        entries
            .into_iter()
            .map(|e| (e.tx().clone(), e.entry_time(), e.fee_delta()))
            .collect()
    }

    /// Priority deltas recorded for transactions currently absent from
    /// the pool; the dump's trailing delta map.
    pub fn orphan_deltas(&self) -> Vec<(TxId, i64)> {
        let inner = self.inner.read();
        let mut deltas: Vec<(TxId, i64)> = inner
            .deltas
            .iter()
            .filter(|(txid, _)| !inner.entries.contains_key(txid))
            .map(|(txid, delta)| (*txid, *delta))
            .collect();
        deltas.sort_by_key(|(txid, _)| *txid);
        deltas
    }

    /// Drop every entry and reset counters. The fee floor survives.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.spends.clear();
        inner.parents.clear();
        inner.children.clear();
        inner.by_descendant_score.clear();
        inner.by_ancestor_score.clear();
        inner.by_entry_time.clear();
        inner.by_raw_score.clear();
        inner.usage_bytes = 0;
        inner.total_tx_bytes = 0;
        inner.transactions_updated += 1;
        info!("mempool cleared");
    }

    /// Recompute every aggregate from the adjacency and compare with
    /// the incrementally-maintained state. Test harness only.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let inner = self.inner.read();
        assert_eq!(inner.by_descendant_score.len(), inner.entries.len());
        assert_eq!(inner.by_ancestor_score.len(), inner.entries.len());
        assert_eq!(inner.by_entry_time.len(), inner.entries.len());
        assert_eq!(inner.by_raw_score.len(), inner.entries.len());

        let mut usage = 0;
        for (txid, entry) in &inner.entries {
            usage += entry.dynamic_usage();

            let ancestors = inner.calc_ancestors(txid);
            let descendants = inner.calc_descendants(txid);
            for a in &ancestors {
                assert!(inner.entries.contains_key(a), "dangling ancestor");
                assert!(!descendants.contains(a), "cycle detected");
            }

            let mut anc_count = 1;
            let mut anc_size = entry.size();
            let mut anc_fees = entry.modified_fee();
            let mut anc_sig_ops = entry.sig_op_cost();
            for a in &ancestors {
                let e = &inner.entries[a];
                anc_count += 1;
                anc_size += e.size();
                anc_fees += e.modified_fee();
                anc_sig_ops += e.sig_op_cost();
            }
            assert_eq!(entry.count_with_ancestors(), anc_count, "{txid} anc count");
            assert_eq!(entry.size_with_ancestors(), anc_size, "{txid} anc size");
            assert_eq!(entry.fees_with_ancestors(), anc_fees, "{txid} anc fees");
            assert_eq!(
                entry.sig_ops_with_ancestors(),
                anc_sig_ops,
                "{txid} anc sigops"
            );

            let mut desc_count = 1;
            let mut desc_size = entry.size();
            let mut desc_fees = entry.modified_fee();
            for d in &descendants {
                let e = &inner.entries[d];
                desc_count += 1;
                desc_size += e.size();
                desc_fees += e.modified_fee();
            }
            assert_eq!(
                entry.count_with_descendants(),
                desc_count,
                "{txid} desc count"
            );
            assert_eq!(entry.size_with_descendants(), desc_size, "{txid} desc size");
            assert_eq!(entry.fees_with_descendants(), desc_fees, "{txid} desc fees");

            for input in &entry.tx().inputs {
                assert_eq!(inner.spends.get(&input.prevout), Some(txid), "spend index");
            }
        }
        assert_eq!(inner.usage_bytes, usage, "usage accumulator");
    }
}

/// Wall-clock seconds since the unix epoch.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionOptions;
    use crate::config::MempoolConfig;
    use crate::testutil::{coin_op, contract_call, funded_view, out_of, transfer};
    use kestrel_state::{Coin, MemoryUtxoView};
    use kestrel_chain_types::BlockId;
    use proptest::prelude::*;

    fn accept(pool: &Mempool, tx: &Transaction, view: &dyn CoinView) -> TxId {
        pool.try_accept(tx.clone(), view, AdmissionOptions::default())
            .expect("admission")
            .txid
    }

    /// Pool with parent P (fee 1000, 250 bytes), child C (fee 2000,
    /// 250 bytes) and standalone S (fee 1250, 250 bytes → 5 sat/B).
    fn cpfp_fixture() -> (Mempool, MemoryUtxoView, TxId, TxId, TxId) {
        let pool = Mempool::with_defaults();
        let view = funded_view(&[(1, 100_000), (2, 100_000)]);

        let base = transfer(&[coin_op(1)], &[99_000], 0).size();
        let pad = (250 - base) as usize;

        let p = transfer(&[coin_op(1)], &[99_000], pad);
        let c = transfer(&[out_of(&p, 0)], &[97_000], pad);
        let s = transfer(&[coin_op(2)], &[98_750], pad);
        assert_eq!(p.size(), 250);
        assert_eq!(c.size(), 250);
        assert_eq!(s.size(), 250);

        let p_id = accept(&pool, &p, &view);
        let c_id = accept(&pool, &c, &view);
        let s_id = accept(&pool, &s, &view);
        (pool, view, p_id, c_id, s_id)
    }

    #[test]
    fn test_descendant_score_lifts_parent_over_standalone() {
        // P alone is 4 sat/B, S is 5 sat/B, but P's package with C is
        // (1000+2000)/(250+250) = 6 sat/B, so eviction drops S first.
        let (pool, _view, p_id, c_id, s_id) = cpfp_fixture();
        let usage = pool.stats().usage_bytes;

        let evicted = pool.trim_to_size(usage - 1);

        assert_eq!(evicted, vec![s_id]);
        assert!(pool.contains(&p_id));
        assert!(pool.contains(&c_id));
        pool.assert_consistent();
    }

    #[test]
    fn test_trim_bound_and_ascending_order() {
        let pool = Mempool::with_defaults();
        let view = funded_view(&[(1, 100_000), (2, 100_000), (3, 100_000)]);
        let cheap = transfer(&[coin_op(1)], &[99_800], 0);
        let mid = transfer(&[coin_op(2)], &[99_000], 0);
        let rich = transfer(&[coin_op(3)], &[95_000], 0);
        let cheap_id = accept(&pool, &cheap, &view);
        let mid_id = accept(&pool, &mid, &view);
        let rich_id = accept(&pool, &rich, &view);

        let usage_per_entry = pool.stats().usage_bytes / 3;
        let evicted = pool.trim_to_size(usage_per_entry + 1);

        // Strictly ascending score: cheapest out first, best survivor.
        assert_eq!(evicted, vec![cheap_id, mid_id]);
        assert!(pool.contains(&rich_id));
        assert!(pool.stats().usage_bytes <= usage_per_entry + 1);
    }

    #[test]
    fn test_trim_raises_rolling_floor() {
        let (pool, _view, _p, _c, s_id) = cpfp_fixture();
        let relay_floor = pool.config().min_relay_feerate;
        assert_eq!(pool.min_feerate(), relay_floor);

        let usage = pool.stats().usage_bytes;
        let evicted = pool.trim_to_size(usage - 1);
        assert_eq!(evicted, vec![s_id]);

        // S's package rate was 5 sat/B = 5000 sat/kB, plus the
        // incremental step.
        assert_eq!(
            pool.min_feerate(),
            FeeRate::from_sat_per_kb(5_000 + pool.config().incremental_feerate.sat_per_kb())
        );
    }

    #[test]
    fn test_rolling_floor_decays_after_blocks() {
        let (pool, _view, _p, _c, _s) = cpfp_fixture();
        let usage = pool.stats().usage_bytes;
        pool.trim_to_size(usage - 1);
        let bumped = pool.min_feerate();
        assert!(bumped > pool.config().min_relay_feerate);

        {
            // A block arrives, then one halflife elapses: the floor
            // halves (down to the relay minimum).
            let mut inner = pool.inner.write();
            inner.block_since_last_rolling_fee_bump = true;
            let now = inner.last_rolling_fee_update + pool.config.rolling_fee_halflife_secs;
            let decayed = inner.min_feerate_at(now, &pool.config);
            assert!(decayed < bumped);

            // Many halflives later it collapses to the relay minimum.
            let much_later = now + 20 * pool.config.rolling_fee_halflife_secs;
            let floor = inner.min_feerate_at(much_later, &pool.config);
            assert_eq!(floor, pool.config.min_relay_feerate);
        }
    }

    #[test]
    fn test_expiry_cascades_to_fresh_descendants() {
        let config = MempoolConfig {
            expiry_secs: 100,
            ..Default::default()
        };
        let pool = Mempool::new(config);
        let view = funded_view(&[(1, 100_000), (2, 100_000)]);

        let old_parent = transfer(&[coin_op(1)], &[95_000], 0);
        let fresh_child = transfer(&[out_of(&old_parent, 0)], &[90_000], 0);
        let fresh_standalone = transfer(&[coin_op(2)], &[95_000], 0);
        let opts = AdmissionOptions::default();
        pool.try_accept_at(old_parent, &view, opts, 1_000).unwrap();
        pool.try_accept_at(fresh_child, &view, opts, 1_090).unwrap();
        let standalone_id = pool
            .try_accept_at(fresh_standalone, &view, opts, 1_090)
            .unwrap()
            .txid;

        // Cutoff 1050: the parent is stale, the child is not but goes
        // down with it.
        assert_eq!(pool.expire_at(1_150), 2);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&standalone_id));
        pool.assert_consistent();
    }

    #[test]
    fn test_block_confirmation_keeps_children() {
        let pool = Mempool::with_defaults();
        let view = funded_view(&[(1, 100_000)]);
        let parent = transfer(&[coin_op(1)], &[95_000], 0);
        let child = transfer(&[out_of(&parent, 0)], &[90_000], 0);
        let parent_id = accept(&pool, &parent, &view);
        let child_id = accept(&pool, &child, &view);

        let removed = pool.remove_for_block(&[Arc::new(parent)], 101);

        assert_eq!(removed, 1);
        assert!(!pool.contains(&parent_id));
        assert!(pool.contains(&child_id));

        // The child is now a root: no in-pool parents, self-only
        // ancestor aggregates.
        let snapshot = pool.snapshot_for_mining();
        let child_entry = snapshot.entries.iter().find(|e| e.txid == child_id).unwrap();
        assert!(child_entry.parents.is_empty());
        pool.assert_consistent();
    }

    #[test]
    fn test_block_conflict_cascades() {
        let pool = Mempool::with_defaults();
        let view = funded_view(&[(1, 100_000)]);
        let ours = transfer(&[coin_op(1)], &[95_000], 0);
        let ours_child = transfer(&[out_of(&ours, 0)], &[90_000], 0);
        let ours_id = accept(&pool, &ours, &view);
        let child_id = accept(&pool, &ours_child, &view);

        // A different transaction spending the same coin confirms.
        let winner = Arc::new(transfer(&[coin_op(1)], &[94_000], 7));
        let removed = pool.remove_for_block(&[winner], 101);

        assert_eq!(removed, 2);
        assert!(!pool.contains(&ours_id));
        assert!(!pool.contains(&child_id));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_block_clears_prioritisation() {
        let pool = Mempool::with_defaults();
        let view = funded_view(&[(1, 100_000)]);
        let tx = transfer(&[coin_op(1)], &[95_000], 0);
        let txid = accept(&pool, &tx, &view);
        pool.prioritise(txid, 500);

        pool.remove_for_block(&[Arc::new(tx)], 101);
        assert!(pool.orphan_deltas().is_empty());
    }

    #[test]
    fn test_cascade_removes_exact_closure() {
        // Diamond: A -> {B, C} -> D. Conflicting B away must take D
        // but leave A and C untouched.
        let pool = Mempool::with_defaults();
        let view = funded_view(&[(1, 1_000_000)]);
        let a = transfer(&[coin_op(1)], &[490_000, 490_000], 0);
        let b = transfer(&[out_of(&a, 0)], &[480_000], 0);
        let c = transfer(&[out_of(&a, 1)], &[480_000], 0);
        let d = transfer(&[out_of(&b, 0), out_of(&c, 0)], &[950_000], 0);
        let a_id = accept(&pool, &a, &view);
        let b_id = accept(&pool, &b, &view);
        let c_id = accept(&pool, &c, &view);
        let d_id = accept(&pool, &d, &view);

        let winner = Arc::new(transfer(&[out_of(&a, 0)], &[470_000], 0));
        pool.remove_for_block(&[winner], 101);

        assert!(pool.contains(&a_id));
        assert!(pool.contains(&c_id));
        assert!(!pool.contains(&b_id));
        assert!(!pool.contains(&d_id));

        // No survivor may still reference a removed identity.
        assert_eq!(pool.spender_of(&out_of(&a, 0)), None);
        assert_eq!(pool.spender_of(&out_of(&c, 0)), None);
        pool.assert_consistent();
    }

    #[test]
    fn test_reorg_removes_immature_coinbase_spends() {
        let pool = Mempool::with_defaults();
        let view = MemoryUtxoView::new();
        view.add_coin(
            coin_op(1),
            Coin {
                value: 100_000,
                height: 90,
                is_coinbase: true,
            },
        );
        view.add_coin(
            coin_op(2),
            Coin {
                value: 100_000,
                height: 1,
                is_coinbase: false,
            },
        );
        view.set_tip(600, BlockId([1; 32]));

        let coinbase_spend = transfer(&[coin_op(1)], &[95_000], 0);
        let plain = transfer(&[coin_op(2)], &[95_000], 0);
        let cb_id = accept(&pool, &coinbase_spend, &view);
        let plain_id = accept(&pool, &plain, &view);

        // Reorg back below the maturity horizon.
        view.set_tip(300, BlockId([2; 32]));
        let removed = pool.remove_for_reorg(&view);

        assert_eq!(removed, 1);
        assert!(!pool.contains(&cb_id));
        assert!(pool.contains(&plain_id));
        pool.assert_consistent();
    }

    #[test]
    fn test_reorg_removes_stale_lock_points() {
        let pool = Mempool::with_defaults();
        let view = MemoryUtxoView::new();
        view.add_coin(
            coin_op(1),
            Coin {
                value: 100_000,
                height: 550,
                is_coinbase: false,
            },
        );
        view.set_tip(600, BlockId([1; 32]));

        let tx = transfer(&[coin_op(1)], &[95_000], 0);
        let txid = accept(&pool, &tx, &view);

        // The reorg rewound below the input's block; the cached lock
        // points can no longer be trusted (and the coin is gone).
        view.spend(&coin_op(1));
        view.set_tip(540, BlockId([2; 32]));
        assert_eq!(pool.remove_for_reorg(&view), 1);
        assert!(!pool.contains(&txid));
    }

    #[test]
    fn test_prioritise_propagates_to_relatives() {
        let pool = Mempool::with_defaults();
        let view = funded_view(&[(1, 100_000)]);
        let parent = transfer(&[coin_op(1)], &[95_000], 0);
        let child = transfer(&[out_of(&parent, 0)], &[90_000], 0);
        let parent_id = accept(&pool, &parent, &view);
        accept(&pool, &child, &view);

        pool.prioritise(parent_id, 7_000);
        pool.assert_consistent();

        pool.prioritise(parent_id, -7_000);
        pool.assert_consistent();
        assert!(pool.orphan_deltas().is_empty());
    }

    #[test]
    fn test_prioritise_changes_eviction_order() {
        let pool = Mempool::with_defaults();
        let view = funded_view(&[(1, 100_000), (2, 100_000)]);
        let weak = transfer(&[coin_op(1)], &[99_500], 0);
        let strong = transfer(&[coin_op(2)], &[95_000], 0);
        let weak_id = accept(&pool, &weak, &view);
        let strong_id = accept(&pool, &strong, &view);

        // Bumped priority keeps the nominally-cheap transaction alive.
        pool.prioritise(weak_id, 50_000);
        let usage = pool.stats().usage_bytes;
        let evicted = pool.trim_to_size(usage - 1);

        assert_eq!(evicted, vec![strong_id]);
        assert!(pool.contains(&weak_id));
    }

    #[test]
    fn test_snapshot_order_and_staleness_counter() {
        let pool = Mempool::with_defaults();
        let view = funded_view(&[(1, 100_000), (2, 100_000), (3, 100_000), (4, 100_000)]);

        let fast = transfer(&[coin_op(1)], &[90_000], 0);
        let slow = transfer(&[coin_op(2)], &[99_500], 0);
        let gas_rich = contract_call(&[coin_op(3)], &[90_000], 900);
        let gas_poor = contract_call(&[coin_op(4)], &[80_000], 50);
        let fast_id = accept(&pool, &fast, &view);
        let slow_id = accept(&pool, &slow, &view);
        let rich_id = accept(&pool, &gas_rich, &view);
        let poor_id = accept(&pool, &gas_poor, &view);

        let snapshot = pool.snapshot_for_mining();
        let order: Vec<TxId> = snapshot.entries.iter().map(|e| e.txid).collect();

        // Plain transfers by feerate first, then contracts by gas
        // price; the cheap-gas call sorts last despite its larger fee.
        assert_eq!(order, vec![fast_id, slow_id, rich_id, poor_id]);

        assert_eq!(snapshot.updates, pool.transactions_updated());
        let extra = transfer(&[out_of(&fast, 0)], &[85_000], 0);
        accept(&pool, &extra, &view);
        assert_ne!(snapshot.updates, pool.transactions_updated());
    }

    #[test]
    fn test_clear_empties_pool() {
        let (pool, _view, _p, _c, _s) = cpfp_fixture();
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.stats().usage_bytes, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Random chains keep every incremental aggregate equal to a
        /// from-scratch recomputation, and trimming always lands under
        /// the bound.
        #[test]
        fn prop_aggregates_consistent_and_trim_bounded(
            chains in prop::collection::vec((2_000u64..20_000, 1usize..4), 1..5),
            bound in 0u64..4_000,
        ) {
            let pool = Mempool::with_defaults();
            let coins: Vec<(u8, u64)> =
                (0..chains.len()).map(|i| (i as u8, 10_000_000)).collect();
            let view = funded_view(&coins);

            for (i, (fee, len)) in chains.iter().enumerate() {
                let mut value = 10_000_000;
                let mut prevout = coin_op(i as u8);
                for _ in 0..*len {
                    value -= fee;
                    let tx = transfer(&[prevout], &[value], 0);
                    prevout = out_of(&tx, 0);
                    pool.try_accept(tx, &view, AdmissionOptions::default()).unwrap();
                }
            }
            pool.assert_consistent();

            pool.trim_to_size(bound);
            pool.assert_consistent();
            prop_assert!(pool.stats().usage_bytes <= bound);
        }
    }
}
