//! Transaction admission.
//!
//! `try_accept` assumes a syntactically valid, consensus-checked
//! candidate (the validation layer runs first) and applies pool-local
//! policy: dedup, conflict/replacement handling, input resolution
//! against chain state and pool contents, package limits via a trial
//! ancestor computation, and the fee floor. Every rejection leaves the
//! pool byte-for-byte unchanged; all mutation happens after the last
//! check passes.

use crate::entry::{LockPoints, MempoolEntry};
use crate::error::RejectReason;
use crate::pool::{unix_now, Mempool, RemovalReason};
use kestrel_chain_types::{cmp_feerate, Transaction, TxId, COINBASE_MATURITY};
use kestrel_state::CoinView;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Caller-side switches for one admission attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionOptions {
    /// Permit replacing conflicting pool transactions when the
    /// replacement rules hold.
    pub allow_replacement: bool,
    /// Skip the rolling fee floor (explicit priority override; the
    /// static relay minimum still applies through it being part of the
    /// floor only when not bypassed).
    pub bypass_fee_floor: bool,
}

/// Successful admission.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    /// Identity of the admitted transaction.
    pub txid: TxId,
    /// Pool transactions removed to make way for it.
    pub replaced: Vec<TxId>,
}

impl Mempool {
    /// Validate and admit a transaction, stamping it with the current
    /// wall-clock time.
    pub fn try_accept(
        &self,
        tx: Transaction,
        view: &dyn CoinView,
        opts: AdmissionOptions,
    ) -> Result<Accepted, RejectReason> {
        self.try_accept_at(tx, view, opts, unix_now())
    }

    /// Validate and admit a transaction with an explicit entry time
    /// (persistence reload re-admits with the original timestamps).
    #[instrument(skip(self, tx, view, opts), fields(tx_id = %tx.id()))]
    pub fn try_accept_at(
        &self,
        tx: Transaction,
        view: &dyn CoinView,
        opts: AdmissionOptions,
        accept_time: u64,
    ) -> Result<Accepted, RejectReason> {
        let txid = tx.id();
        let size = tx.size();

        check_standard(&tx, self.config.max_tx_bytes, self.config.min_gas_price)?;

        let tip_height = view.active_height();
        let mut inner = self.inner.write();

        if inner.entries.contains_key(&txid) {
            return Err(RejectReason::Duplicate);
        }

        // Conflict discovery: pool transactions already spending any of
        // our inputs.
        let mut conflicts: BTreeSet<TxId> = BTreeSet::new();
        for input in &tx.inputs {
            if let Some(&spender) = inner.spends.get(&input.prevout) {
                conflicts.insert(spender);
            }
        }
        let replacing = !conflicts.is_empty();
        if replacing && !opts.allow_replacement {
            return Err(RejectReason::Conflict {
                txid: *conflicts.iter().next().unwrap(),
            });
        }
        let conflict_closure = if replacing {
            let closure = inner.closure_with_descendants(conflicts.iter().copied());
            if closure.len() > self.config.max_replacement_evictions {
                debug!(
                    conflicts = closure.len(),
                    "replacement would evict too many transactions"
                );
                return Err(RejectReason::Conflict {
                    txid: *conflicts.iter().next().unwrap(),
                });
            }
            closure
        } else {
            HashSet::new()
        };

        // Input resolution: every input is either an unspent confirmed
        // coin or an output of another pool entry.
        let mut input_value: u64 = 0;
        let mut spends_coinbase = false;
        let mut max_input_height: u32 = 0;
        let mut direct_parents: BTreeSet<TxId> = BTreeSet::new();
        for input in &tx.inputs {
            if let Some(parent) = inner.entries.get(&input.prevout.txid) {
                if conflict_closure.contains(&input.prevout.txid) {
                    // Would orphan itself by evicting its own parent.
                    return Err(RejectReason::Conflict {
                        txid: input.prevout.txid,
                    });
                }
                let Some(out) = parent.tx().outputs.get(input.prevout.vout as usize) else {
                    return Err(RejectReason::MissingInputs);
                };
                input_value += out.value;
                direct_parents.insert(input.prevout.txid);
            } else if let Some(coin) = view.coin(&input.prevout) {
                if coin.is_coinbase && coin.height + COINBASE_MATURITY > tip_height + 1 {
                    return Err(RejectReason::NonStandard("immature coinbase spend"));
                }
                spends_coinbase |= coin.is_coinbase;
                max_input_height = max_input_height.max(coin.height);
                input_value += coin.value;
            } else {
                return Err(RejectReason::MissingInputs);
            }
        }

        let value_out = tx.value_out();
        if input_value < value_out {
            return Err(RejectReason::NonStandard("outputs exceed inputs"));
        }
        let fee = input_value - value_out;
        let fee_delta = inner.deltas.get(&txid).copied().unwrap_or(0);
        let modified_fee = fee as i64 + fee_delta;

        if replacing {
            check_replacement(
                &inner,
                &conflicts,
                &conflict_closure,
                &direct_parents,
                modified_fee,
                size,
            )?;
        }

        // Trial package computation; nothing has been mutated yet, so
        // a limit failure rejects cleanly.
        let ancestors = inner
            .compute_ancestors(
                &direct_parents,
                size,
                modified_fee,
                tx.sig_op_cost(),
                &self.config,
            )
            .map_err(RejectReason::PackageLimit)?;

        if !opts.bypass_fee_floor {
            let floor = inner.min_feerate_at(accept_time, &self.config);
            let required = floor.fee_for(size);
            if modified_fee < required as i64 {
                return Err(RejectReason::FeeTooLow {
                    fee: modified_fee,
                    required,
                });
            }
        }

        // All checks passed; mutate.
        let mut replaced: Vec<TxId> = conflict_closure.iter().copied().collect();
        replaced.sort();
        if replacing {
            inner.remove_staged(&conflict_closure, false);
        }

        let lock_points = LockPoints {
            height: tip_height,
            time: accept_time as i64,
            max_input_height,
        };
        let entry = MempoolEntry::new(
            Arc::new(tx),
            fee,
            accept_time,
            tip_height,
            spends_coinbase,
            fee_delta,
            lock_points,
        );
        inner.insert_entry(entry, ancestors);
        let count = inner.entries.len();
        drop(inner);

        debug!(count, replaced = replaced.len(), "transaction admitted");
        self.notify_removed(&replaced, RemovalReason::Replaced);
        Ok(Accepted { txid, replaced })
    }
}

/// Local standardness rules; cheap shape checks the upstream validator
/// does not own.
fn check_standard(
    tx: &Transaction,
    max_tx_bytes: u64,
    min_gas_price: u64,
) -> Result<(), RejectReason> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(RejectReason::NonStandard("empty input or output set"));
    }
    if tx.size() > max_tx_bytes {
        return Err(RejectReason::NonStandard("transaction too large"));
    }
    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prevout) {
            return Err(RejectReason::NonStandard("duplicate input"));
        }
    }
    if tx.has_contract_payload() {
        if tx.gas_limit() == 0 {
            return Err(RejectReason::NonStandard("zero gas limit"));
        }
        if tx.gas_price().unwrap_or(0) < min_gas_price {
            return Err(RejectReason::NonStandard("gas price below minimum"));
        }
    }
    Ok(())
}

/// Replacement rules: the newcomer must pay strictly more in absolute
/// fee than everything it evicts, beat every direct conflict on
/// feerate, and introduce no unconfirmed dependency the conflicts did
/// not already have.
fn check_replacement(
    inner: &crate::pool::PoolInner,
    conflicts: &BTreeSet<TxId>,
    conflict_closure: &HashSet<TxId>,
    direct_parents: &BTreeSet<TxId>,
    modified_fee: i64,
    size: u64,
) -> Result<(), RejectReason> {
    let first = *conflicts.iter().next().unwrap();

    let mut allowed_parents: HashSet<TxId> = HashSet::new();
    for conflict in conflicts {
        if let Some(parents) = inner.parents.get(conflict) {
            allowed_parents.extend(parents.iter().copied());
        }
    }
    for parent in direct_parents {
        if !allowed_parents.contains(parent) {
            debug!(parent = %parent, "replacement introduces new unconfirmed dependency");
            return Err(RejectReason::Conflict { txid: first });
        }
    }

    let mut replaced_fees: i64 = 0;
    for txid in conflict_closure {
        replaced_fees += inner.entries[txid].modified_fee();
    }
    if modified_fee <= replaced_fees {
        debug!(
            offered = modified_fee,
            replaced = replaced_fees,
            "replacement fee does not beat evicted fees"
        );
        return Err(RejectReason::Conflict { txid: first });
    }

    for txid in conflicts {
        let entry = &inner.entries[txid];
        if cmp_feerate(modified_fee, size, entry.modified_fee(), entry.size()) != Ordering::Greater
        {
            debug!(conflict = %txid, "replacement feerate does not beat conflict");
            return Err(RejectReason::Conflict { txid: first });
        }
    }

    Ok(())
}
