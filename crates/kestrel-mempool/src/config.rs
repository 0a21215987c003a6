//! Mempool configuration.

use crate::{
    DEFAULT_EXPIRY_SECS, DEFAULT_INCREMENTAL_FEE_PER_KB, DEFAULT_MAX_POOL_BYTES,
    DEFAULT_MAX_REPLACEMENT_EVICTIONS, DEFAULT_MIN_GAS_PRICE, DEFAULT_MIN_RELAY_FEE_PER_KB,
    DEFAULT_PACKAGE_COUNT_LIMIT, DEFAULT_PACKAGE_SIZE_LIMIT, DEFAULT_ROLLING_FEE_HALFLIFE_SECS,
};
use kestrel_chain_types::{FeeRate, MAX_TX_SIZE};
use serde::{Deserialize, Serialize};

/// Mempool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    /// Maximum total dynamic memory usage in bytes.
    pub max_pool_bytes: u64,
    /// Maximum serialized size of a single transaction.
    pub max_tx_bytes: u64,
    /// Entries older than this are swept out.
    pub expiry_secs: u64,
    /// Maximum unconfirmed ancestors a transaction may have (itself
    /// included).
    pub ancestor_count_limit: u64,
    /// Maximum combined size of a transaction plus its unconfirmed
    /// ancestors.
    pub ancestor_size_limit: u64,
    /// Maximum descendants any pool entry may accumulate (itself
    /// included).
    pub descendant_count_limit: u64,
    /// Maximum combined size of an entry plus its descendants.
    pub descendant_size_limit: u64,
    /// Static relay floor; the rolling floor never drops below it.
    pub min_relay_feerate: FeeRate,
    /// Step added to the floor on eviction and required of replacements.
    pub incremental_feerate: FeeRate,
    /// Cap on pool transactions a single replacement may evict.
    pub max_replacement_evictions: usize,
    /// Minimum gas price for contract payloads.
    pub min_gas_price: u64,
    /// Halflife of the rolling fee floor decay.
    pub rolling_fee_halflife_secs: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_pool_bytes: DEFAULT_MAX_POOL_BYTES,
            max_tx_bytes: MAX_TX_SIZE,
            expiry_secs: DEFAULT_EXPIRY_SECS,
            ancestor_count_limit: DEFAULT_PACKAGE_COUNT_LIMIT,
            ancestor_size_limit: DEFAULT_PACKAGE_SIZE_LIMIT,
            descendant_count_limit: DEFAULT_PACKAGE_COUNT_LIMIT,
            descendant_size_limit: DEFAULT_PACKAGE_SIZE_LIMIT,
            min_relay_feerate: FeeRate::from_sat_per_kb(DEFAULT_MIN_RELAY_FEE_PER_KB),
            incremental_feerate: FeeRate::from_sat_per_kb(DEFAULT_INCREMENTAL_FEE_PER_KB),
            max_replacement_evictions: DEFAULT_MAX_REPLACEMENT_EVICTIONS,
            min_gas_price: DEFAULT_MIN_GAS_PRICE,
            rolling_fee_halflife_secs: DEFAULT_ROLLING_FEE_HALFLIFE_SECS,
        }
    }
}
