//! UTXO view.

use dashmap::DashMap;
use kestrel_chain_types::{BlockId, OutPoint};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// An unspent transaction output as seen by policy code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coin {
    /// Value in satoshis.
    pub value: u64,
    /// Height of the block that created it.
    pub height: u32,
    /// Whether it was created by a coinbase transaction.
    pub is_coinbase: bool,
}

/// Read access to confirmed chain state.
///
/// All methods answer from materialized state and must not block; the
/// mempool calls them while holding its own lock.
pub trait CoinView: Send + Sync {
    /// Look up an unspent output.
    fn coin(&self, outpoint: &OutPoint) -> Option<Coin>;

    /// Whether the outpoint is absent from the UTXO set.
    fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.coin(outpoint).is_none()
    }

    /// Height of the active chain tip.
    fn active_height(&self) -> u32;

    /// Identity of the active chain tip.
    fn active_tip(&self) -> BlockId;
}

/// In-memory UTXO view.
///
/// Backs unit tests and the simnet wiring. Reads go straight to the
/// concurrent map, so mempool admission never blocks on it.
#[derive(Default)]
pub struct MemoryUtxoView {
    coins: DashMap<OutPoint, Coin>,
    height: AtomicU32,
    tip: RwLock<BlockId>,
}

impl MemoryUtxoView {
    /// Create an empty view at height 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an unspent output.
    pub fn add_coin(&self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }

    /// Remove an output, returning it if present.
    pub fn spend(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.remove(outpoint).map(|(_, coin)| coin)
    }

    /// Advance (or rewind) the tip.
    pub fn set_tip(&self, height: u32, id: BlockId) {
        self.height.store(height, Ordering::SeqCst);
        *self.tip.write() = id;
        debug!(height, tip = %id, "UTXO view tip updated");
    }

    /// Number of unspent outputs in the view.
    pub fn len(&self) -> usize {
        self.coins.len()
    }

    /// Whether the view holds no outputs.
    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

impl CoinView for MemoryUtxoView {
    fn coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(outpoint).map(|c| *c)
    }

    fn active_height(&self) -> u32 {
        self.height.load(Ordering::SeqCst)
    }

    fn active_tip(&self) -> BlockId {
        *self.tip.read()
    }
}
