//! Error types for the Kernel.

use pancake_ledger_core::{Digest, LedgerError, LedgerId, PacketId, ValidationError};
use pancake_ledger_store::StoreError;
use thiserror::Error;

use crate::geo::CollaboratorError;

/// Errors that can occur during Kernel operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Ledger state or chain error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// An external collaborator (e.g. geocoding) failed.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Packet not found.
    #[error("packet not found: {0}")]
    PacketNotFound(PacketId),

    /// Ledger not found.
    #[error("ledger not found: {0}")]
    LedgerNotFound(LedgerId),

    /// A different packet is already stored under this id.
    #[error("conflict: packet {packet_id} exists with hash {existing}")]
    Conflict { packet_id: PacketId, existing: Digest },

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KernelError {
    /// Corruption or tampering, as opposed to ordinary bad input.
    pub fn is_integrity(&self) -> bool {
        match self {
            Self::Validation(e) => e.is_integrity(),
            Self::Ledger(LedgerError::Chain(_) | LedgerError::SummaryMismatch(_)) => true,
            _ => false,
        }
    }

    /// The caller asked for something malformed.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Self::Validation(ValidationError::BadRequest(_)) | Self::Store(StoreError::BadRequest(_))
        )
    }
}

/// Result type for Kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
