//! Error types for the Pancake ledger core.

use thiserror::Error;

use crate::hash::Digest;
use crate::types::LedgerId;

/// Violations reported by the packet validator and query checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Missing or malformed sections or fields.
    #[error("shape violation: {0}")]
    ShapeViolation(String),

    /// Stored hash does not match the recomputed one. Never repaired.
    #[error("integrity violation: footer hash {expected}, computed {actual}")]
    IntegrityViolation { expected: String, actual: String },

    /// Canonical body exceeds the configured ceiling.
    #[error("size violation: canonical body is {size} bytes, limit is {limit}")]
    SizeViolation { size: usize, limit: usize },

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ValidationError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeViolation(msg.into())
    }

    /// Integrity violations indicate corruption or tampering and are worth
    /// alerting on separately from ordinary bad input.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::IntegrityViolation { .. })
    }
}

/// Why a chain failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainBreak {
    #[error("expected sequence number {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("previous hash does not match the preceding entry")]
    PreviousHashMismatch,

    #[error("previous entry id does not match the preceding entry")]
    PredecessorMismatch,

    #[error("content hash does not match the payload")]
    ContentHashMismatch,

    #[error("entry hash mismatch: stored {stored}, computed {computed}")]
    EntryHashMismatch { stored: Digest, computed: Digest },

    #[error("entry belongs to ledger {found}, expected {expected}")]
    ForeignEntry { expected: LedgerId, found: LedgerId },
}

/// First point at which a chain of entries fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("chain violation at index {index} (sequence {sequence_number}): {reason}")]
pub struct ChainViolation {
    /// 0-based position in the verified slice.
    pub index: usize,
    /// Sequence number carried by the offending entry.
    pub sequence_number: u64,
    pub reason: ChainBreak,
}

/// Errors from ledger state transitions and verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger {0} is archived")]
    Archived(LedgerId),

    #[error(transparent)]
    Chain(#[from] ChainViolation),

    /// Root counters or chain summary disagree with the stored entries.
    #[error("ledger summary mismatch: {0}")]
    SummaryMismatch(String),
}
