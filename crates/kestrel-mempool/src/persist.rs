//! Mempool persistence.
//!
//! Stream format, all integers big-endian:
//!
//! ```text
//! [version: u64][count: u64]
//!   { [tx: u32-length-prefixed bytes][entry_time: i64][fee_delta: i64] }*
//! [delta_count: u64]{ [txid: 32 bytes][delta: i64] }*
//! ```
//!
//! A version mismatch rejects the whole stream (fail closed, start
//! empty) rather than partially applying it. Every loaded transaction
//! re-runs full admission so a stale or corrupted dump can never smuggle
//! state past the pool's invariants. Persistence failures are not
//! fatal to the node: the caller logs and continues with an empty pool.

use crate::admission::AdmissionOptions;
use crate::pool::{unix_now, Mempool};
use kestrel_chain_types::{CodecError, SliceReader, Transaction, TxId};
use kestrel_state::CoinView;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Current dump format version.
pub const DUMP_VERSION: u64 = 1;

/// Persistence errors.
#[derive(Error, Debug)]
pub enum PersistError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Malformed stream.
    #[error("malformed dump: {0}")]
    Codec(#[from] CodecError),

    /// Dump written by an incompatible version.
    #[error("dump version {found} incompatible with {expected}")]
    VersionMismatch { found: u64, expected: u64 },
}

/// Result type for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Outcome of a dump reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Transactions re-admitted.
    pub accepted: usize,
    /// Transactions that failed re-admission (chain state moved on).
    pub failed: usize,
    /// Transactions skipped because their entry time already expired.
    pub expired: usize,
    /// Standalone fee deltas restored.
    pub deltas: usize,
}

/// Serialize the pool to a writer: all entries parents-first, then the
/// standalone fee deltas.
pub fn dump_to_writer<W: Write>(mempool: &Mempool, writer: &mut W) -> PersistResult<()> {
    let entries = mempool.entries_for_dump();
    let deltas = mempool.orphan_deltas();

    let mut buf = Vec::with_capacity(64 * entries.len().max(1));
    buf.extend_from_slice(&DUMP_VERSION.to_be_bytes());
    buf.extend_from_slice(&(entries.len() as u64).to_be_bytes());
    for (tx, entry_time, fee_delta) in &entries {
        let tx_bytes = tx.to_bytes();
        buf.extend_from_slice(&(tx_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(&tx_bytes);
        buf.extend_from_slice(&(*entry_time as i64).to_be_bytes());
        buf.extend_from_slice(&fee_delta.to_be_bytes());
    }
    buf.extend_from_slice(&(deltas.len() as u64).to_be_bytes());
    for (txid, delta) in &deltas {
        buf.extend_from_slice(txid.as_bytes());
        buf.extend_from_slice(&delta.to_be_bytes());
    }

    writer.write_all(&buf)?;
    writer.flush()?;
    debug!(
        entries = entries.len(),
        deltas = deltas.len(),
        "mempool serialized"
    );
    Ok(())
}

/// Reload a dump, feeding every transaction back through admission.
pub fn load_from_reader<R: Read>(
    reader: &mut R,
    mempool: &Mempool,
    view: &dyn CoinView,
) -> PersistResult<LoadSummary> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let mut r = SliceReader::new(&bytes);

    let version = r.read_u64()?;
    if version != DUMP_VERSION {
        return Err(PersistError::VersionMismatch {
            found: version,
            expected: DUMP_VERSION,
        });
    }

    let now = unix_now();
    let expiry = mempool.config().expiry_secs;
    let mut summary = LoadSummary::default();

    let count = r.read_u64()?;
    for _ in 0..count {
        let tx_bytes = r.read_var_bytes()?;
        let entry_time = r.read_i64()?.max(0) as u64;
        let fee_delta = r.read_i64()?;

        let tx = Transaction::from_bytes(&tx_bytes)?;
        if fee_delta != 0 {
            mempool.prioritise(tx.id(), fee_delta);
        }
        if entry_time.saturating_add(expiry) <= now {
            summary.expired += 1;
            continue;
        }
        match mempool.try_accept_at(tx, view, AdmissionOptions::default(), entry_time) {
            Ok(_) => summary.accepted += 1,
            Err(reason) => {
                debug!(%reason, "dumped transaction failed re-admission");
                summary.failed += 1;
            }
        }
    }

    let delta_count = r.read_u64()?;
    for _ in 0..delta_count {
        let txid = TxId(r.read_array::<32>()?);
        let delta = r.read_i64()?;
        mempool.prioritise(txid, delta);
        summary.deltas += 1;
    }
    r.finish()?;

    info!(
        accepted = summary.accepted,
        failed = summary.failed,
        expired = summary.expired,
        deltas = summary.deltas,
        "mempool loaded from dump"
    );
    Ok(summary)
}

/// Dump the pool to `path` atomically: write a sibling `.new` file,
/// sync, then rename over the target.
pub fn dump_to_file<P: AsRef<Path>>(mempool: &Mempool, path: P) -> PersistResult<()> {
    let path = path.as_ref();
    let tmp = path.with_extension("new");

    let mut file = fs::File::create(&tmp)?;
    dump_to_writer(mempool, &mut file)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;

    info!(path = %path.display(), "mempool dumped");
    Ok(())
}

/// Load the pool from `path`. A missing file is a normal first start
/// and yields an empty summary; a malformed one surfaces the error so
/// the caller can log it and continue empty.
pub fn load_from_file<P: AsRef<Path>>(
    path: P,
    mempool: &Mempool,
    view: &dyn CoinView,
) -> PersistResult<LoadSummary> {
    let path = path.as_ref();
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "no mempool dump found, starting empty");
            return Ok(LoadSummary::default());
        }
        Err(err) => return Err(err.into()),
    };
    load_from_reader(&mut file, mempool, view)
}
