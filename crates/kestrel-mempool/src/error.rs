//! Rejection reasons for transaction admission.

use kestrel_chain_types::TxId;
use thiserror::Error;

/// Which package ceiling a candidate's ancestor/descendant computation
/// tripped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageLimitKind {
    /// Too many unconfirmed ancestors.
    #[error("ancestor count would exceed limit of {limit}")]
    AncestorCount { limit: u64 },

    /// Combined ancestor package too large.
    #[error("ancestor package size {size} would exceed limit of {limit}")]
    AncestorSize { size: u64, limit: u64 },

    /// An ancestor would end up with too many descendants.
    #[error("descendant count of {ancestor} would exceed limit of {limit}")]
    DescendantCount { ancestor: TxId, limit: u64 },

    /// An ancestor's descendant package would grow too large.
    #[error("descendant size of {ancestor} would exceed limit of {limit}")]
    DescendantSize { ancestor: TxId, limit: u64 },
}

/// Why a candidate transaction was refused admission.
///
/// Rejection is a value, not a panic; admission leaves the pool
/// untouched whenever one of these is returned. The caller decides
/// whether to cache it, penalize the peer, or drop silently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Identical transaction already in the pool.
    #[error("transaction already in mempool")]
    Duplicate,

    /// Conflicts with a pool transaction and replacement was not
    /// requested or its rules were not met.
    #[error("conflicts with in-pool transaction {txid}")]
    Conflict { txid: TxId },

    /// An input is neither a confirmed coin nor a pool output.
    #[error("inputs missing or already spent")]
    MissingInputs,

    /// Modified fee below the current floor for this size.
    #[error("fee {fee} below required {required}")]
    FeeTooLow { fee: i64, required: u64 },

    /// Ancestor/descendant package ceiling exceeded.
    #[error("package limit exceeded: {0}")]
    PackageLimit(PackageLimitKind),

    /// Violates a local standardness rule.
    #[error("non-standard: {0}")]
    NonStandard(&'static str),
}
